//! Stock ledger engine (application-level orchestration).
//!
//! The engine owns every write to a product's ledger sequence and keeps the
//! running balance of each entry consistent with the fold of all movements
//! before it in logical time.
//!
//! ## Mutation Flow
//!
//! ```text
//! append / update / remove
//!   ↓
//! 1. Validate input (nothing is written on failure)
//!   ↓
//! 2. Lock every product the mutation touches (ascending id, bounded wait)
//!   ↓
//! 3. Begin a store transaction, re-read the affected rows
//!   ↓
//! 4. Stage the write, then sweep balances forward from the mutation point
//!   ↓
//! 5. Commit write + sweep as one unit (optimistic version check)
//! ```
//!
//! A failed attempt commits nothing. Conflicts (lock timeout, a commit
//! superseded by another writer, a row that moved product while we waited)
//! are retried up to `EngineConfig::max_conflict_retries` times and then
//! surfaced as [`LedgerError::ConcurrencyConflict`].
//!
//! Queries take no product lock; they read committed state, which the store
//! swaps atomically per commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use stockledger_core::{DomainError, LedgerEntryId, ProductId};
use stockledger_ledger::{EntryUpdate, LedgerEntry, NewLedgerEntry, checked_apply_movement, sweep};

use crate::config::EngineConfig;
use crate::ledger_store::{HistoryRange, LedgerStore, LedgerStoreError, LedgerTransaction};
use crate::locks::{LockTimeout, ProductLocks};
use crate::registry::ProductRegistry;

/// Failure of a ledger operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Referenced entry or product does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unknown movement type, or a quantity that makes no sense for it.
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    /// Safe to retry: nothing was committed.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[source] LedgerStoreError),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict(_))
    }
}

impl From<LedgerStoreError> for LedgerError {
    fn from(value: LedgerStoreError) -> Self {
        match value {
            LedgerStoreError::Conflict(msg) => LedgerError::ConcurrencyConflict(msg),
            LedgerStoreError::MissingEntry(id) => LedgerError::NotFound(format!("ledger entry {id}")),
            other => LedgerError::PersistenceFailure(other),
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidMovement(msg) | DomainError::InvalidId(msg) => {
                LedgerError::InvalidMovement(msg)
            }
            DomainError::Conflict(msg) => LedgerError::ConcurrencyConflict(msg),
            DomainError::InvariantViolation(msg) => {
                LedgerError::PersistenceFailure(LedgerStoreError::Corrupt(msg))
            }
        }
    }
}

impl From<LockTimeout> for LedgerError {
    fn from(value: LockTimeout) -> Self {
        LedgerError::ConcurrencyConflict(format!(
            "product {} stayed locked for {:?}",
            value.product_id, value.waited
        ))
    }
}

/// One history line annotated with catalog names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementLine {
    pub unit_name: Option<String>,
    pub entry: LedgerEntry,
}

/// A product's movements over a time window, with the balances bracketing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatement {
    pub product_id: ProductId,
    pub product_name: Option<String>,
    /// Balance carried into the window.
    pub opening_balance: Decimal,
    /// Balance after the last line (or the opening balance when empty).
    pub closing_balance: Decimal,
    pub lines: Vec<StatementLine>,
}

/// Balance-maintaining engine over a [`LedgerStore`].
pub struct LedgerEngine<S> {
    store: S,
    locks: ProductLocks,
    registry: Option<Arc<dyn ProductRegistry>>,
    config: EngineConfig,
}

impl<S> core::fmt::Debug for LedgerEngine<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("config", &self.config)
            .field("registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        let config = EngineConfig::default();
        Self {
            store,
            locks: ProductLocks::new(config.lock_timeout),
            registry: None,
            config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.locks = ProductLocks::new(config.lock_timeout);
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn ProductRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// In strict mode every product must be known to the registry; strict mode
    /// without a registry knows no products at all.
    fn ensure_known(&self, product_id: ProductId) -> Result<(), LedgerError> {
        if !self.config.strict_products {
            return Ok(());
        }
        match &self.registry {
            Some(registry) if registry.contains(product_id) => Ok(()),
            _ => Err(LedgerError::NotFound(format!("product {product_id}"))),
        }
    }

    fn with_retries<T>(
        &self,
        op: &'static str,
        mut attempt: impl FnMut() -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut retries = 0u32;
        loop {
            match attempt() {
                Err(LedgerError::ConcurrencyConflict(reason))
                    if retries < self.config.max_conflict_retries =>
                {
                    retries += 1;
                    warn!(op, retries, %reason, "retrying ledger mutation after conflict");
                }
                other => return other,
            }
        }
    }
}

impl<S> LedgerEngine<S>
where
    S: LedgerStore,
{
    /// Record a new movement.
    ///
    /// The common case lands at the tail of the product's sequence and costs
    /// one tail read plus one insert. A backdated movement (earlier
    /// `created_at` than the current tail) is slotted into place and the
    /// entries after it are swept.
    #[instrument(
        skip_all,
        fields(product_id = %entry.product_id, movement = %entry.movement_type),
        err
    )]
    pub fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, LedgerError> {
        entry.validate()?;
        self.ensure_known(entry.product_id)?;

        let product_id = entry.product_id;
        let created = self.with_retries("append", || {
            self.locks.run(&[product_id], || self.try_append(entry.clone()))
        })?;

        info!(entry_id = %created.id, balance = %created.balance, "ledger entry appended");
        Ok(created)
    }

    fn try_append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, LedgerError> {
        let mut tx = self.store.begin()?;
        let tail = tx.latest_by_product(entry.product_id)?;

        // Ties go after the tail: the new id is larger.
        let at_tail = tail.as_ref().is_none_or(|t| entry.created_at >= t.created_at);
        if at_tail {
            let previous = tail.map_or(Decimal::ZERO, |t| t.balance);
            let balance = checked_apply_movement(previous, entry.quantity, entry.movement_type)
                .ok_or_else(|| {
                    LedgerError::InvalidMovement(format!(
                        "balance overflow appending to product {}",
                        entry.product_id
                    ))
                })?;
            let created = tx.insert(entry, balance)?;
            tx.commit()?;
            return Ok(created);
        }

        let product_id = entry.product_id;
        let provisional = tx.insert(entry, Decimal::ZERO)?;
        let mut rows = tx.fetch_ordered_by_product(product_id)?;
        let start = locate(&rows, provisional.id)?;
        let rewritten = write_sweep(&mut tx, &mut rows, start)?;
        let created = rows[start].clone();
        tx.commit()?;

        debug!(entry_id = %created.id, rewritten, "backdated entry swept into place");
        Ok(created)
    }

    /// Correct an existing entry.
    ///
    /// `created_at` is immutable, so the entry keeps its place in logical
    /// time. Moving it to another product sweeps both sequences.
    #[instrument(skip_all, fields(entry_id = %id), err)]
    pub fn update(&self, id: LedgerEntryId, update: EntryUpdate) -> Result<LedgerEntry, LedgerError> {
        update.validate()?;

        let updated = self.with_retries("update", || {
            let seen = self.store.find(id)?.ok_or_else(|| entry_not_found(id))?;
            if update.product_id != seen.product_id {
                self.ensure_known(update.product_id)?;
            }
            self.locks.run(&[seen.product_id, update.product_id], || {
                self.try_update(&seen, update.clone())
            })
        })?;

        info!(product_id = %updated.product_id, balance = %updated.balance, "ledger entry updated");
        Ok(updated)
    }

    fn try_update(&self, seen: &LedgerEntry, update: EntryUpdate) -> Result<LedgerEntry, LedgerError> {
        let mut tx = self.store.begin()?;
        let mut entry = tx.find(seen.id)?.ok_or_else(|| entry_not_found(seen.id))?;
        ensure_same_product(seen, &entry)?;

        let old_product = entry.product_id;
        entry.apply_update(update);
        tx.replace(&entry)?;

        let mut rewritten = 0;
        if entry.product_id != old_product {
            let mut rows = tx.fetch_ordered_by_product(old_product)?;
            let start = sweep::position_after(&rows, entry.logical_time());
            rewritten += write_sweep(&mut tx, &mut rows, start)?;
        }

        let mut rows = tx.fetch_ordered_by_product(entry.product_id)?;
        let start = locate(&rows, entry.id)?;
        rewritten += write_sweep(&mut tx, &mut rows, start)?;
        let updated = rows[start].clone();
        tx.commit()?;

        debug!(rewritten, "update swept");
        Ok(updated)
    }

    /// Delete an entry and close the gap it leaves in the running balance.
    #[instrument(skip_all, fields(entry_id = %id), err)]
    pub fn remove(&self, id: LedgerEntryId) -> Result<(), LedgerError> {
        let product_id = self.with_retries("remove", || {
            let seen = self.store.find(id)?.ok_or_else(|| entry_not_found(id))?;
            self.locks.run(&[seen.product_id], || self.try_remove(&seen))
        })?;

        info!(%product_id, "ledger entry removed");
        Ok(())
    }

    fn try_remove(&self, seen: &LedgerEntry) -> Result<ProductId, LedgerError> {
        let mut tx = self.store.begin()?;
        let entry = tx.find(seen.id)?.ok_or_else(|| entry_not_found(seen.id))?;
        ensure_same_product(seen, &entry)?;

        tx.delete(entry.id)?;
        let mut rows = tx.fetch_ordered_by_product(entry.product_id)?;
        let start = sweep::position_after(&rows, entry.logical_time());
        let rewritten = write_sweep(&mut tx, &mut rows, start)?;
        tx.commit()?;

        debug!(rewritten, "removal swept");
        Ok(entry.product_id)
    }

    /// Balance of the logically-latest entry, or zero for an empty ledger.
    pub fn current_balance(&self, product_id: ProductId) -> Result<Decimal, LedgerError> {
        Ok(self
            .store
            .latest_by_product(product_id)?
            .map_or(Decimal::ZERO, |e| e.balance))
    }

    pub fn latest(&self, product_id: ProductId) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.store.latest_by_product(product_id)?)
    }

    /// Entries in ascending logical time, re-read from storage on every call.
    pub fn history(&self, product_id: ProductId, range: HistoryRange) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.fetch_ordered_by_product_and_range(product_id, &range)?)
    }

    /// Stock level as of `at`: balance of the last entry created at or before it.
    pub fn balance_at(&self, product_id: ProductId, at: DateTime<Utc>) -> Result<Decimal, LedgerError> {
        let rows = self
            .store
            .fetch_ordered_by_product_and_range(product_id, &HistoryRange::until(at))?;
        Ok(rows.last().map_or(Decimal::ZERO, |e| e.balance))
    }

    /// Check stored balances against the fold. Read-only; see [`Self::rebuild`].
    pub fn verify(&self, product_id: ProductId) -> Result<(), LedgerError> {
        let rows = self.store.fetch_ordered_by_product(product_id)?;
        sweep::verify_running_balances(&rows)?;
        Ok(())
    }

    /// Re-derive every balance of a product from scratch and write back the
    /// ones that drifted. Returns the number of rows rewritten.
    #[instrument(skip_all, fields(%product_id), err)]
    pub fn rebuild(&self, product_id: ProductId) -> Result<usize, LedgerError> {
        let rewritten = self.with_retries("rebuild", || {
            self.locks.run(&[product_id], || {
                let mut tx = self.store.begin()?;
                let mut rows = tx.fetch_ordered_by_product(product_id)?;
                let rewritten = write_sweep(&mut tx, &mut rows, 0)?;
                tx.commit()?;
                Ok(rewritten)
            })
        })?;

        if rewritten > 0 {
            warn!(rewritten, "rebuild repaired drifted balances");
        }
        Ok(rewritten)
    }

    /// History over `range` annotated with registry names.
    pub fn statement(&self, product_id: ProductId, range: HistoryRange) -> Result<LedgerStatement, LedgerError> {
        let rows = self.store.fetch_ordered_by_product(product_id)?;

        let opening_balance = match range.from {
            Some(from) => rows
                .iter()
                .take_while(|e| e.created_at < from)
                .last()
                .map_or(Decimal::ZERO, |e| e.balance),
            None => Decimal::ZERO,
        };

        let lines: Vec<StatementLine> = rows
            .into_iter()
            .filter(|e| range.contains(e.created_at))
            .map(|entry| StatementLine {
                unit_name: entry
                    .unit_id
                    .and_then(|unit| self.registry.as_ref()?.unit_name(unit)),
                entry,
            })
            .collect();
        let closing_balance = lines.last().map_or(opening_balance, |l| l.entry.balance);

        Ok(LedgerStatement {
            product_id,
            product_name: self
                .registry
                .as_ref()
                .and_then(|r| r.product_name(product_id)),
            opening_balance,
            closing_balance,
            lines,
        })
    }
}

fn entry_not_found(id: LedgerEntryId) -> LedgerError {
    LedgerError::NotFound(format!("ledger entry {id}"))
}

fn ensure_same_product(seen: &LedgerEntry, current: &LedgerEntry) -> Result<(), LedgerError> {
    if seen.product_id != current.product_id {
        return Err(LedgerError::ConcurrencyConflict(format!(
            "entry {} moved from product {} to {} while waiting for its lock",
            seen.id, seen.product_id, current.product_id
        )));
    }
    Ok(())
}

fn locate(rows: &[LedgerEntry], id: LedgerEntryId) -> Result<usize, LedgerError> {
    sweep::position_of(rows, id).ok_or_else(|| {
        LedgerError::PersistenceFailure(LedgerStoreError::Corrupt(format!(
            "entry {id} missing from its own product sequence"
        )))
    })
}

/// Sweep `rows` from `start` and stage every rewritten balance.
fn write_sweep<T>(tx: &mut T, rows: &mut [LedgerEntry], start: usize) -> Result<usize, LedgerError>
where
    T: LedgerTransaction,
{
    let rewritten = sweep::sweep_from(rows, start)?;
    for row in &rewritten {
        tx.replace(row)?;
    }
    Ok(rewritten.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use stockledger_core::UnitId;
    use stockledger_ledger::MovementType;

    use crate::ledger_store::InMemoryLedgerStore;
    use crate::registry::InMemoryProductRegistry;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn engine() -> LedgerEngine<InMemoryLedgerStore> {
        LedgerEngine::new(InMemoryLedgerStore::new())
    }

    fn mv(product: i64, movement: MovementType, qty: Decimal, minute: i64) -> NewLedgerEntry {
        NewLedgerEntry::new(ProductId::new(product), movement, qty).at(t(minute))
    }

    fn balances(engine: &LedgerEngine<InMemoryLedgerStore>, product: i64) -> Vec<Decimal> {
        engine
            .history(ProductId::new(product), HistoryRange::all())
            .unwrap()
            .iter()
            .map(|e| e.balance)
            .collect()
    }

    #[test]
    fn empty_product_has_zero_balance() {
        let engine = engine();
        assert_eq!(engine.current_balance(ProductId::new(1)).unwrap(), Decimal::ZERO);
        assert!(engine.latest(ProductId::new(1)).unwrap().is_none());
        assert!(engine.history(ProductId::new(1), HistoryRange::all()).unwrap().is_empty());
    }

    #[test]
    fn backdated_append_sweeps_later_entries() {
        let engine = engine();
        engine.append(mv(1, MovementType::Purchase, dec!(100), 0)).unwrap();
        engine.append(mv(1, MovementType::Sale, dec!(30), 10)).unwrap();

        let late = engine.append(mv(1, MovementType::Waste, dec!(5), 5)).unwrap();

        assert_eq!(late.balance, dec!(95));
        assert_eq!(balances(&engine, 1), vec![dec!(100), dec!(95), dec!(65)]);
        assert_eq!(engine.current_balance(ProductId::new(1)).unwrap(), dec!(65));
    }

    #[test]
    fn backdated_before_everything_starts_from_zero() {
        let engine = engine();
        engine.append(mv(1, MovementType::Sale, dec!(3), 10)).unwrap();
        let first = engine.append(mv(1, MovementType::Opening, dec!(50), 0)).unwrap();

        assert_eq!(first.balance, dec!(50));
        assert_eq!(balances(&engine, 1), vec![dec!(50), dec!(47)]);
    }

    #[test]
    fn same_timestamp_appends_in_insertion_order() {
        let engine = engine();
        engine.append(mv(1, MovementType::Purchase, dec!(10), 0)).unwrap();
        engine.append(mv(1, MovementType::Opening, dec!(4), 0)).unwrap();
        engine.append(mv(1, MovementType::Purchase, dec!(1), 0)).unwrap();
        assert_eq!(balances(&engine, 1), vec![dec!(10), dec!(4), dec!(5)]);
    }

    #[test]
    fn invalid_movement_writes_nothing() {
        let engine = engine();
        let err = engine.append(mv(1, MovementType::Closing, dec!(-1), 0)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidMovement(_)));
        assert!(engine.latest(ProductId::new(1)).unwrap().is_none());
    }

    #[test]
    fn invalid_update_keeps_previous_state() {
        let engine = engine();
        let e = engine.append(mv(1, MovementType::Purchase, dec!(10), 0)).unwrap();

        let mut update = EntryUpdate::from(&e);
        update.movement_type = MovementType::Opening;
        update.quantity = dec!(-10);
        assert!(matches!(engine.update(e.id, update), Err(LedgerError::InvalidMovement(_))));
        assert_eq!(engine.store().find(e.id).unwrap().unwrap(), e);
    }

    #[test]
    fn unknown_entry_is_not_found() {
        let engine = engine();
        let ghost = LedgerEntryId::new(404);
        assert!(matches!(engine.remove(ghost), Err(LedgerError::NotFound(_))));

        let update = EntryUpdate {
            product_id: ProductId::new(1),
            unit_id: None,
            movement_type: MovementType::Purchase,
            quantity: dec!(1),
            location: None,
            reference_type: None,
            reference_id: None,
            note: None,
        };
        assert!(matches!(engine.update(ghost, update), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn moving_an_entry_to_another_product_sweeps_both() {
        let engine = engine();
        engine.append(mv(1, MovementType::Purchase, dec!(100), 0)).unwrap();
        let moved = engine.append(mv(1, MovementType::Sale, dec!(30), 1)).unwrap();
        engine.append(mv(1, MovementType::Sale, dec!(10), 2)).unwrap();
        engine.append(mv(2, MovementType::Purchase, dec!(5), 0)).unwrap();
        engine.append(mv(2, MovementType::Purchase, dec!(5), 3)).unwrap();

        let mut update = EntryUpdate::from(&moved);
        update.product_id = ProductId::new(2);
        let updated = engine.update(moved.id, update).unwrap();

        assert_eq!(updated.product_id, ProductId::new(2));
        assert_eq!(updated.balance, dec!(-25));
        assert_eq!(balances(&engine, 1), vec![dec!(100), dec!(90)]);
        assert_eq!(balances(&engine, 2), vec![dec!(5), dec!(-25), dec!(-20)]);
        engine.verify(ProductId::new(1)).unwrap();
        engine.verify(ProductId::new(2)).unwrap();
    }

    #[test]
    fn balance_at_reads_the_past() {
        let engine = engine();
        engine.append(mv(1, MovementType::Purchase, dec!(100), 0)).unwrap();
        engine.append(mv(1, MovementType::Sale, dec!(30), 10)).unwrap();

        let p = ProductId::new(1);
        assert_eq!(engine.balance_at(p, t(-1)).unwrap(), Decimal::ZERO);
        assert_eq!(engine.balance_at(p, t(0)).unwrap(), dec!(100));
        assert_eq!(engine.balance_at(p, t(9)).unwrap(), dec!(100));
        assert_eq!(engine.balance_at(p, t(10)).unwrap(), dec!(70));
    }

    #[test]
    fn history_range_is_a_window_on_the_same_balances() {
        let engine = engine();
        for (minute, qty) in [(0, dec!(1)), (10, dec!(2)), (20, dec!(3))] {
            engine.append(mv(1, MovementType::Purchase, qty, minute)).unwrap();
        }
        let window = engine
            .history(ProductId::new(1), HistoryRange::between(t(5), t(20)))
            .unwrap();
        let got: Vec<Decimal> = window.iter().map(|e| e.balance).collect();
        assert_eq!(got, vec![dec!(3), dec!(6)]);
    }

    #[test]
    fn verify_detects_and_rebuild_repairs_drift() {
        let engine = engine();
        engine.append(mv(1, MovementType::Purchase, dec!(100), 0)).unwrap();
        let sale = engine.append(mv(1, MovementType::Sale, dec!(30), 1)).unwrap();
        engine.append(mv(1, MovementType::Adjustment, dec!(-5), 2)).unwrap();

        engine.store().tamper_balance(sale.id, dec!(1)).unwrap();
        match engine.verify(ProductId::new(1)) {
            Err(LedgerError::PersistenceFailure(LedgerStoreError::Corrupt(msg))) => {
                assert!(msg.contains(&sale.id.to_string()));
            }
            other => panic!("expected corrupt ledger, got {other:?}"),
        }
        // Reads return what is stored; no silent repair.
        assert_eq!(balances(&engine, 1), vec![dec!(100), dec!(1), dec!(65)]);

        assert_eq!(engine.rebuild(ProductId::new(1)).unwrap(), 1);
        engine.verify(ProductId::new(1)).unwrap();
        assert_eq!(engine.rebuild(ProductId::new(1)).unwrap(), 0);
    }

    #[test]
    fn strict_mode_rejects_unknown_products() {
        let registry = Arc::new(InMemoryProductRegistry::new());
        registry.register_product(ProductId::new(1), "Espresso cups");
        let engine = engine()
            .with_config(EngineConfig {
                strict_products: true,
                ..EngineConfig::default()
            })
            .with_registry(registry);

        let e = engine.append(mv(1, MovementType::Purchase, dec!(6), 0)).unwrap();
        assert!(matches!(
            engine.append(mv(2, MovementType::Purchase, dec!(6), 0)),
            Err(LedgerError::NotFound(what)) if what == "product 2"
        ));

        let mut update = EntryUpdate::from(&e);
        update.product_id = ProductId::new(2);
        assert!(matches!(engine.update(e.id, update), Err(LedgerError::NotFound(_))));
        assert_eq!(engine.current_balance(ProductId::new(1)).unwrap(), dec!(6));
    }

    #[test]
    fn strict_mode_without_registry_knows_nothing() {
        let engine = engine().with_config(EngineConfig {
            strict_products: true,
            ..EngineConfig::default()
        });
        assert!(matches!(
            engine.append(mv(1, MovementType::Purchase, dec!(1), 0)),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn statement_carries_names_and_brackets_the_window() {
        let registry = Arc::new(InMemoryProductRegistry::new());
        registry.register_product(ProductId::new(1), "Oat milk 1L");
        registry.register_unit(UnitId::new(3), "carton");
        let engine = engine().with_registry(registry);

        engine.append(mv(1, MovementType::Purchase, dec!(24), 0).unit(UnitId::new(3))).unwrap();
        engine.append(mv(1, MovementType::Sale, dec!(4), 10)).unwrap();
        engine.append(mv(1, MovementType::Sale, dec!(2), 20)).unwrap();

        let statement = engine
            .statement(ProductId::new(1), HistoryRange::since(t(5)))
            .unwrap();
        assert_eq!(statement.product_name.as_deref(), Some("Oat milk 1L"));
        assert_eq!(statement.opening_balance, dec!(24));
        assert_eq!(statement.closing_balance, dec!(18));
        assert_eq!(statement.lines.len(), 2);
        assert!(statement.lines[0].unit_name.is_none());

        let full = engine.statement(ProductId::new(1), HistoryRange::all()).unwrap();
        assert_eq!(full.lines[0].unit_name.as_deref(), Some("carton"));
        assert_eq!(full.opening_balance, Decimal::ZERO);

        let empty = engine
            .statement(ProductId::new(1), HistoryRange::since(t(30)))
            .unwrap();
        assert!(empty.lines.is_empty());
        assert_eq!(empty.closing_balance, dec!(18));
    }

    #[test]
    fn tail_append_overflow_is_rejected_without_writing() {
        let engine = engine();
        engine.append(mv(1, MovementType::Purchase, Decimal::MAX, 0)).unwrap();

        let err = engine.append(mv(1, MovementType::Purchase, dec!(1), 1)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidMovement(msg) if msg.contains("overflow")));
        assert_eq!(balances(&engine, 1), vec![Decimal::MAX]);

        // Outbound movements still fit.
        let sale = engine.append(mv(1, MovementType::Sale, dec!(1), 2)).unwrap();
        assert_eq!(sale.balance, Decimal::MAX - dec!(1));
    }

    #[test]
    fn backdated_overflow_rolls_back_the_whole_sweep() {
        let engine = engine();
        engine.append(mv(1, MovementType::Opening, dec!(10), 0)).unwrap();
        engine.append(mv(1, MovementType::Purchase, Decimal::MAX - dec!(20), 10)).unwrap();
        let before = engine.history(ProductId::new(1), HistoryRange::all()).unwrap();

        // Fits where it lands, overflows the later purchase.
        let err = engine
            .append(mv(1, MovementType::Purchase, dec!(15), 5))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidMovement(msg) if msg.starts_with("balance overflow at entry")));
        assert_eq!(engine.history(ProductId::new(1), HistoryRange::all()).unwrap(), before);

        // Same through an update of the opening count.
        let mut update = EntryUpdate::from(&before[0]);
        update.quantity = dec!(30);
        assert!(matches!(
            engine.update(before[0].id, update),
            Err(LedgerError::InvalidMovement(_))
        ));
        assert_eq!(engine.history(ProductId::new(1), HistoryRange::all()).unwrap(), before);
        engine.verify(ProductId::new(1)).unwrap();
    }

    #[test]
    fn store_errors_map_to_ledger_kinds() {
        assert!(LedgerError::from(LedgerStoreError::Conflict("x".into())).is_retryable());
        assert!(matches!(
            LedgerError::from(LedgerStoreError::MissingEntry(LedgerEntryId::new(1))),
            LedgerError::NotFound(_)
        ));
        assert!(matches!(
            LedgerError::from(LedgerStoreError::Timeout("slow".into())),
            LedgerError::PersistenceFailure(LedgerStoreError::Timeout(_))
        ));
    }
}
