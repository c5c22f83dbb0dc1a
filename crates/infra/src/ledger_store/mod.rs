//! Ledger row storage boundary.
//!
//! The engine talks to storage only through [`LedgerStore`] and the
//! transactions it hands out, so any backend with atomic multi-row commits can
//! sit behind it.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryLedgerStore, InMemoryTransaction};
pub use r#trait::{HistoryRange, LedgerStore, LedgerStoreError, LedgerTransaction};
