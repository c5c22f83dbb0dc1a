use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{LedgerEntryId, ProductId};
use stockledger_ledger::{LedgerEntry, NewLedgerEntry};
use std::sync::Arc;

/// Inclusive time window over `created_at` for history reads.
///
/// Both bounds are optional; `HistoryRange::all()` is unbounded.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRange {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl HistoryRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn since(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn until(to: DateTime<Utc>) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }

    /// True when `from` is after `to`; such a range matches nothing.
    pub fn is_inverted(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }
}

/// Ledger store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerStoreError {
    /// A product sequence read by the transaction was committed to by someone else.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("ledger entry {0} does not exist")]
    MissingEntry(LedgerEntryId),

    #[error("storage timed out: {0}")]
    Timeout(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored rows are unreadable or inconsistent.
    #[error("corrupt ledger data: {0}")]
    Corrupt(String),
}

/// Durable storage of ledger rows keyed by product.
///
/// Reads outside a transaction see committed state only. All writes go
/// through a [`LedgerTransaction`], which commits atomically: readers observe
/// a whole recomputation sweep or none of it.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - assign entry ids from a monotonically increasing sequence
/// - return per-product sequences sorted by `(created_at, id)`
/// - reject a commit (`LedgerStoreError::Conflict`) when a product the
///   transaction read or wrote was committed to after it was first read
/// - leave committed state untouched when a transaction is dropped uncommitted
pub trait LedgerStore: Send + Sync {
    type Transaction<'a>: LedgerTransaction
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Transaction<'_>, LedgerStoreError>;

    fn find(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerStoreError>;

    /// Logically-last entry of a product.
    fn latest_by_product(&self, product_id: ProductId) -> Result<Option<LedgerEntry>, LedgerStoreError>;

    fn fetch_ordered_by_product(&self, product_id: ProductId) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    fn fetch_ordered_by_product_and_range(
        &self,
        product_id: ProductId,
        range: &HistoryRange,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError>;
}

/// A unit of work over the ledger.
///
/// Reads observe the transaction's own staged writes. Dropping the value
/// without calling `commit` rolls everything back.
pub trait LedgerTransaction {
    fn find(&mut self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerStoreError>;

    fn latest_by_product(&mut self, product_id: ProductId) -> Result<Option<LedgerEntry>, LedgerStoreError>;

    fn fetch_ordered_by_product(&mut self, product_id: ProductId) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// Stage a new row; the store assigns its id.
    fn insert(&mut self, entry: NewLedgerEntry, balance: Decimal) -> Result<LedgerEntry, LedgerStoreError>;

    /// Stage a full overwrite of an existing row (matched by id).
    fn replace(&mut self, entry: &LedgerEntry) -> Result<(), LedgerStoreError>;

    fn delete(&mut self, id: LedgerEntryId) -> Result<(), LedgerStoreError>;

    fn commit(self) -> Result<(), LedgerStoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore,
{
    type Transaction<'a>
        = S::Transaction<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Transaction<'_>, LedgerStoreError> {
        (**self).begin()
    }

    fn find(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerStoreError> {
        (**self).find(id)
    }

    fn latest_by_product(&self, product_id: ProductId) -> Result<Option<LedgerEntry>, LedgerStoreError> {
        (**self).latest_by_product(product_id)
    }

    fn fetch_ordered_by_product(&self, product_id: ProductId) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).fetch_ordered_by_product(product_id)
    }

    fn fetch_ordered_by_product_and_range(
        &self,
        product_id: ProductId,
        range: &HistoryRange,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).fetch_ordered_by_product_and_range(product_id, range)
    }
}
