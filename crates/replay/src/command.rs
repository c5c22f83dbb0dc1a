//! Replay commands and the session that executes them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use stockledger_core::{LedgerEntryId, ProductId, UnitId};
use stockledger_infra::{
    EngineConfig, HistoryRange, InMemoryLedgerStore, InMemoryProductRegistry, LedgerEngine, LedgerError,
};
use stockledger_ledger::{EntryUpdate, NewLedgerEntry};

/// One input line, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    RegisterProduct {
        product_id: ProductId,
        name: String,
    },
    RegisterUnit {
        unit_id: UnitId,
        name: String,
    },
    Append {
        entry: NewLedgerEntry,
    },
    Update {
        id: LedgerEntryId,
        update: EntryUpdate,
    },
    Remove {
        id: LedgerEntryId,
    },
    /// Current balance, or the balance as of `at`.
    Balance {
        product_id: ProductId,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    History {
        product_id: ProductId,
        #[serde(default)]
        range: HistoryRange,
    },
    Latest {
        product_id: ProductId,
    },
    Verify {
        product_id: ProductId,
    },
    Rebuild {
        product_id: ProductId,
    },
    Statement {
        product_id: ProductId,
        #[serde(default)]
        range: HistoryRange,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::RegisterProduct { .. } => "register_product",
            Command::RegisterUnit { .. } => "register_unit",
            Command::Append { .. } => "append",
            Command::Update { .. } => "update",
            Command::Remove { .. } => "remove",
            Command::Balance { .. } => "balance",
            Command::History { .. } => "history",
            Command::Latest { .. } => "latest",
            Command::Verify { .. } => "verify",
            Command::Rebuild { .. } => "rebuild",
            Command::Statement { .. } => "statement",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("encoding result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A fresh in-memory engine plus the catalog it consults.
pub struct Session {
    engine: LedgerEngine<InMemoryLedgerStore>,
    registry: Arc<InMemoryProductRegistry>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(InMemoryProductRegistry::new());
        let engine = LedgerEngine::new(InMemoryLedgerStore::new())
            .with_config(config)
            .with_registry(registry.clone());
        Self { engine, registry }
    }

    pub fn engine(&self) -> &LedgerEngine<InMemoryLedgerStore> {
        &self.engine
    }

    pub fn execute(&self, command: Command) -> Result<Value, ReplayError> {
        tracing::debug!(op = command.name(), "executing");

        let value = match command {
            Command::RegisterProduct { product_id, name } => {
                self.registry.register_product(product_id, name);
                Value::Null
            }
            Command::RegisterUnit { unit_id, name } => {
                self.registry.register_unit(unit_id, name);
                Value::Null
            }
            Command::Append { entry } => serde_json::to_value(self.engine.append(entry)?)?,
            Command::Update { id, update } => serde_json::to_value(self.engine.update(id, update)?)?,
            Command::Remove { id } => {
                self.engine.remove(id)?;
                Value::Null
            }
            Command::Balance { product_id, at } => {
                let balance = match at {
                    Some(at) => self.engine.balance_at(product_id, at)?,
                    None => self.engine.current_balance(product_id)?,
                };
                serde_json::to_value(balance)?
            }
            Command::History { product_id, range } => {
                serde_json::to_value(self.engine.history(product_id, range)?)?
            }
            Command::Latest { product_id } => serde_json::to_value(self.engine.latest(product_id)?)?,
            Command::Verify { product_id } => {
                self.engine.verify(product_id)?;
                Value::Bool(true)
            }
            Command::Rebuild { product_id } => Value::from(self.engine.rebuild(product_id)?),
            Command::Statement { product_id, range } => {
                serde_json::to_value(self.engine.statement(product_id, range)?)?
            }
        };

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stockledger_ledger::MovementType;

    fn parse(value: Value) -> Command {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_append_with_defaults() {
        let command = parse(json!({
            "op": "append",
            "entry": { "product_id": 7, "movement_type": "transfer_in", "quantity": "2.5" }
        }));
        match command {
            Command::Append { entry } => {
                assert_eq!(entry.product_id, ProductId::new(7));
                assert_eq!(entry.movement_type, MovementType::TransferIn);
                assert_eq!(entry.quantity.to_string(), "2.5");
                assert!(entry.note.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_queries_with_optional_ranges() {
        assert_eq!(
            parse(json!({ "op": "history", "product_id": 1 })),
            Command::History {
                product_id: ProductId::new(1),
                range: HistoryRange::all(),
            }
        );
        assert_eq!(
            parse(json!({ "op": "balance", "product_id": 1 })),
            Command::Balance {
                product_id: ProductId::new(1),
                at: None,
            }
        );
    }

    #[test]
    fn unknown_ops_and_movements_are_rejected() {
        assert!(serde_json::from_value::<Command>(json!({ "op": "teleport" })).is_err());
        assert!(serde_json::from_value::<Command>(json!({
            "op": "append",
            "entry": { "product_id": 1, "movement_type": "shrinkage", "quantity": 1 }
        }))
        .is_err());
    }

    #[test]
    fn session_runs_a_small_ledger() {
        let session = Session::new(EngineConfig::default());
        let appended = session
            .execute(parse(json!({
                "op": "append",
                "entry": { "product_id": 1, "movement_type": "purchase", "quantity": 100 }
            })))
            .unwrap();
        assert_eq!(appended["balance"], json!("100"));

        let id = appended["id"].as_u64().unwrap();
        session.execute(parse(json!({ "op": "remove", "id": id }))).unwrap();
        assert_eq!(
            session.execute(parse(json!({ "op": "balance", "product_id": 1 }))).unwrap(),
            json!("0")
        );
        assert_eq!(
            session.execute(parse(json!({ "op": "latest", "product_id": 1 }))).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn ledger_failures_surface_as_errors() {
        let session = Session::new(EngineConfig::default());
        let err = session.execute(parse(json!({ "op": "remove", "id": 99 }))).unwrap_err();
        assert!(matches!(err, ReplayError::Ledger(LedgerError::NotFound(_))));
        assert_eq!(err.to_string(), "not found: ledger entry 99");
    }
}
