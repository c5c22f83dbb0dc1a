//! Stock ledger domain module.
//!
//! This crate contains the business rules of the stock ledger, implemented
//! purely as deterministic domain logic (no IO, no locking, no storage):
//! movement semantics, the entry record, and the running-balance sweep.

pub mod entry;
pub mod movement;
pub mod sweep;

pub use entry::{EntryUpdate, LedgerEntry, LogicalTime, NewLedgerEntry};
pub use movement::{MovementType, apply_movement, checked_apply_movement};
pub use sweep::{balance_before, fold_balance, position_after, position_of, sweep_from, verify_running_balances};
