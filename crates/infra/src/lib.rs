//! Infrastructure layer: storage port and in-memory backend, per-product
//! locking, configuration, and the ledger engine that ties them together.

pub mod config;
pub mod engine;
pub mod ledger_store;
pub mod locks;
pub mod registry;


pub use config::EngineConfig;
pub use engine::{LedgerEngine, LedgerError, LedgerStatement, StatementLine};
pub use ledger_store::{
    HistoryRange, InMemoryLedgerStore, LedgerStore, LedgerStoreError, LedgerTransaction,
};
pub use registry::{InMemoryProductRegistry, ProductRegistry};
