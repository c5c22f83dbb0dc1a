//! Running-balance recomputation over a product's ordered entries.
//!
//! Every function here expects `entries` to hold one product's entries sorted
//! ascending by [`LogicalTime`].

use rust_decimal::Decimal;

use stockledger_core::{DomainError, DomainResult, LedgerEntryId};

use crate::entry::{LedgerEntry, LogicalTime};
use crate::movement::{apply_movement, checked_apply_movement};

/// Index of the first entry sorting strictly after `time`.
///
/// After deleting (or moving away) an entry at `time`, this is where the
/// sweep has to resume.
pub fn position_after(entries: &[LedgerEntry], time: LogicalTime) -> usize {
    entries.partition_point(|e| e.logical_time() <= time)
}

pub fn position_of(entries: &[LedgerEntry], id: LedgerEntryId) -> Option<usize> {
    entries.iter().position(|e| e.id == id)
}

/// Balance carried into `entries[index]`: the previous entry's balance, or zero.
pub fn balance_before(entries: &[LedgerEntry], index: usize) -> Decimal {
    match index.min(entries.len()).checked_sub(1) {
        Some(prev) => entries[prev].balance,
        None => Decimal::ZERO,
    }
}

/// Recompute balances from `entries[start]` to the end, chaining forward from
/// the balance before `start`.
///
/// Returns the entries whose stored balance changed, in logical-time order.
/// Entries already holding the right balance are not returned, so callers
/// write back only what drifted. A balance leaving `Decimal`'s range is an
/// `InvalidMovement` naming the entry; `entries` may be partly rewritten by
/// then and must be discarded.
pub fn sweep_from(entries: &mut [LedgerEntry], start: usize) -> DomainResult<Vec<LedgerEntry>> {
    debug_assert!(
        entries.windows(2).all(|w| w[0].logical_time() < w[1].logical_time()),
        "entries must be sorted by logical time"
    );

    let mut running = balance_before(entries, start);
    let mut rewritten = Vec::new();

    for entry in entries.iter_mut().skip(start) {
        let balance = checked_apply_movement(running, entry.quantity, entry.movement_type)
            .ok_or_else(|| DomainError::invalid_movement(format!("balance overflow at entry {}", entry.id)))?;
        if entry.balance != balance {
            entry.balance = balance;
            rewritten.push(entry.clone());
        }
        running = balance;
    }

    Ok(rewritten)
}

/// Balance after folding every movement from zero, ignoring stored balances.
pub fn fold_balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Decimal {
    entries
        .into_iter()
        .fold(Decimal::ZERO, |acc, e| apply_movement(acc, e.quantity, e.movement_type))
}

/// Check that every stored balance equals the fold up to and including it.
///
/// Reports the first entry out of step; does not repair anything.
pub fn verify_running_balances(entries: &[LedgerEntry]) -> DomainResult<()> {
    let mut running = Decimal::ZERO;
    for entry in entries {
        running = apply_movement(running, entry.quantity, entry.movement_type);
        if entry.balance != running {
            return Err(DomainError::invariant(format!(
                "entry {} stores balance {} but the running total is {}",
                entry.id, entry.balance, running
            )));
        }
    }
    Ok(())
}
