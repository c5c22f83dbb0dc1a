use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;

use stockledger_core::{ExpectedVersion, LedgerEntryId, ProductId};
use stockledger_ledger::{LedgerEntry, LogicalTime, NewLedgerEntry};

use super::r#trait::{HistoryRange, LedgerStore, LedgerStoreError, LedgerTransaction};

#[derive(Debug, Default)]
struct State {
    rows: HashMap<LedgerEntryId, LedgerEntry>,
    /// Per-product index in logical-time order.
    by_product: HashMap<ProductId, BTreeMap<LogicalTime, LedgerEntryId>>,
    /// Bumped once per commit that writes to the product.
    versions: HashMap<ProductId, u64>,
}

impl State {
    fn version(&self, product_id: ProductId) -> u64 {
        self.versions.get(&product_id).copied().unwrap_or(0)
    }

    fn ordered(&self, product_id: ProductId) -> impl DoubleEndedIterator<Item = &LedgerEntry> {
        self.by_product
            .get(&product_id)
            .into_iter()
            .flat_map(|index| index.values())
            .filter_map(|id| self.rows.get(id))
    }

    fn remove_row(&mut self, id: LedgerEntryId) -> Option<LedgerEntry> {
        let row = self.rows.remove(&id)?;
        if let Some(index) = self.by_product.get_mut(&row.product_id) {
            index.remove(&row.logical_time());
            if index.is_empty() {
                self.by_product.remove(&row.product_id);
            }
        }
        Some(row)
    }

    fn put_row(&mut self, row: LedgerEntry) {
        self.remove_row(row.id);
        self.by_product
            .entry(row.product_id)
            .or_default()
            .insert(row.logical_time(), row.id);
        self.rows.insert(row.id, row);
    }
}

/// In-memory ledger store.
///
/// Intended for tests, dev and the replay tool. Commits apply under a single
/// write lock, so readers never see half of a sweep.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
    next_id: AtomicU64,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Committed-write version of a product's sequence (0 if never written).
    pub fn product_version(&self, product_id: ProductId) -> Result<u64, LedgerStoreError> {
        Ok(self.read()?.version(product_id))
    }

    /// Overwrite a stored balance without any recomputation.
    ///
    /// Simulates direct manipulation of the backing table; only useful for
    /// exercising audit and rebuild paths.
    pub fn tamper_balance(&self, id: LedgerEntryId, balance: Decimal) -> Result<(), LedgerStoreError> {
        let mut state = self.write()?;
        let row = state.rows.get_mut(&id).ok_or(LedgerStoreError::MissingEntry(id))?;
        row.balance = balance;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, LedgerStoreError> {
        self.state
            .read()
            .map_err(|_| LedgerStoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, LedgerStoreError> {
        self.state
            .write()
            .map_err(|_| LedgerStoreError::Unavailable("lock poisoned".to_string()))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    type Transaction<'a> = InMemoryTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, LedgerStoreError> {
        Ok(InMemoryTransaction {
            store: self,
            staged: BTreeMap::new(),
            read_versions: HashMap::new(),
            written: HashSet::new(),
        })
    }

    fn find(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerStoreError> {
        Ok(self.read()?.rows.get(&id).cloned())
    }

    fn latest_by_product(&self, product_id: ProductId) -> Result<Option<LedgerEntry>, LedgerStoreError> {
        Ok(self.read()?.ordered(product_id).next_back().cloned())
    }

    fn fetch_ordered_by_product(&self, product_id: ProductId) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        Ok(self.read()?.ordered(product_id).cloned().collect())
    }

    fn fetch_ordered_by_product_and_range(
        &self,
        product_id: ProductId,
        range: &HistoryRange,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        if range.is_inverted() {
            return Ok(vec![]);
        }

        let lower = match range.from {
            Some(created_at) => Bound::Included(LogicalTime {
                created_at,
                id: LedgerEntryId::new(0),
            }),
            None => Bound::Unbounded,
        };
        let upper = match range.to {
            Some(created_at) => Bound::Included(LogicalTime {
                created_at,
                id: LedgerEntryId::new(u64::MAX),
            }),
            None => Bound::Unbounded,
        };

        let state = self.read()?;
        let Some(index) = state.by_product.get(&product_id) else {
            return Ok(vec![]);
        };

        Ok(index
            .range((lower, upper))
            .filter_map(|(_, id)| state.rows.get(id).cloned())
            .collect())
    }
}

/// Staged unit of work over an [`InMemoryLedgerStore`].
#[derive(Debug)]
pub struct InMemoryTransaction<'a> {
    store: &'a InMemoryLedgerStore,
    /// `None` marks a staged delete.
    staged: BTreeMap<LedgerEntryId, Option<LedgerEntry>>,
    /// Version of each product when this transaction first looked at it.
    read_versions: HashMap<ProductId, u64>,
    written: HashSet<ProductId>,
}

impl InMemoryTransaction<'_> {
    fn observe(&mut self, state: &State, product_id: ProductId) {
        self.read_versions
            .entry(product_id)
            .or_insert_with(|| state.version(product_id));
    }

    fn staged_for(&self, product_id: ProductId) -> impl Iterator<Item = &LedgerEntry> {
        self.staged
            .values()
            .flatten()
            .filter(move |e| e.product_id == product_id)
    }

    fn require(&mut self, id: LedgerEntryId) -> Result<LedgerEntry, LedgerStoreError> {
        self.find(id)?.ok_or(LedgerStoreError::MissingEntry(id))
    }
}

impl LedgerTransaction for InMemoryTransaction<'_> {
    fn find(&mut self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerStoreError> {
        if let Some(staged) = self.staged.get(&id) {
            return Ok(staged.clone());
        }

        let store = self.store;
        let state = store.read()?;
        let row = state.rows.get(&id).cloned();
        if let Some(row) = &row {
            self.observe(&state, row.product_id);
        }
        Ok(row)
    }

    fn latest_by_product(&mut self, product_id: ProductId) -> Result<Option<LedgerEntry>, LedgerStoreError> {
        let store = self.store;
        let state = store.read()?;
        self.observe(&state, product_id);

        let committed = state
            .ordered(product_id)
            .rev()
            .find(|e| !self.staged.contains_key(&e.id))
            .cloned();
        let staged = self.staged_for(product_id).max_by_key(|e| e.logical_time()).cloned();

        Ok(match (committed, staged) {
            (Some(c), Some(s)) => Some(if s.logical_time() > c.logical_time() { s } else { c }),
            (c, s) => c.or(s),
        })
    }

    fn fetch_ordered_by_product(&mut self, product_id: ProductId) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let store = self.store;
        let state = store.read()?;
        self.observe(&state, product_id);

        let mut rows: Vec<LedgerEntry> = state
            .ordered(product_id)
            .filter(|e| !self.staged.contains_key(&e.id))
            .cloned()
            .collect();
        rows.extend(self.staged_for(product_id).cloned());
        rows.sort_by_key(LedgerEntry::logical_time);
        Ok(rows)
    }

    fn insert(&mut self, entry: NewLedgerEntry, balance: Decimal) -> Result<LedgerEntry, LedgerStoreError> {
        let store = self.store;
        {
            let state = store.read()?;
            self.observe(&state, entry.product_id);
        }

        let id = LedgerEntryId::new(store.next_id.fetch_add(1, Ordering::SeqCst));
        let row = LedgerEntry::from_new(id, entry, balance);
        self.written.insert(row.product_id);
        self.staged.insert(id, Some(row.clone()));
        Ok(row)
    }

    fn replace(&mut self, entry: &LedgerEntry) -> Result<(), LedgerStoreError> {
        let existing = self.require(entry.id)?;
        if existing.product_id != entry.product_id {
            let store = self.store;
            let state = store.read()?;
            self.observe(&state, entry.product_id);
        }

        self.written.insert(existing.product_id);
        self.written.insert(entry.product_id);
        self.staged.insert(entry.id, Some(entry.clone()));
        Ok(())
    }

    fn delete(&mut self, id: LedgerEntryId) -> Result<(), LedgerStoreError> {
        let existing = self.require(id)?;
        self.written.insert(existing.product_id);
        self.staged.insert(id, None);
        Ok(())
    }

    fn commit(self) -> Result<(), LedgerStoreError> {
        if self.staged.is_empty() {
            return Ok(());
        }

        let store = self.store;
        let mut state = store.write()?;

        for (product_id, seen) in &self.read_versions {
            ExpectedVersion(*seen)
                .check(state.version(*product_id))
                .map_err(|e| LedgerStoreError::Conflict(format!("product {product_id}: {e}")))?;
        }

        for (id, row) in self.staged {
            match row {
                Some(row) => state.put_row(row),
                None => {
                    state.remove_row(id);
                }
            }
        }

        for product_id in self.written {
            *state.versions.entry(product_id).or_insert(0) += 1;
        }

        Ok(())
    }
}
