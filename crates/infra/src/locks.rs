//! Per-product critical sections for ledger mutations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use stockledger_core::ProductId;

/// Registry of one mutex per product.
///
/// Mutations on the same product serialize; different products never contend
/// beyond the brief registry lookup. A product's entry lives only while some
/// caller holds or waits for its lock, so the map stays as small as the set
/// of products being mutated right now.
#[derive(Debug)]
pub struct ProductLocks {
    locks: Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
    timeout: Duration,
}

/// A product lock could not be acquired within the configured timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeout {
    pub product_id: ProductId,
    pub waited: Duration,
}

impl ProductLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn handle(&self, product_id: ProductId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(product_id).or_default().clone()
    }

    /// Run `f` while holding the locks of every product in `products`.
    ///
    /// Locks are taken in ascending product order so two callers locking the
    /// same pair can never deadlock. All locks are released when `f` returns.
    pub fn run<T, E>(
        &self,
        products: &[ProductId],
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<LockTimeout>,
    {
        let mut ids = products.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let handles: Vec<Arc<Mutex<()>>> = ids.iter().map(|p| self.handle(*p)).collect();
        let mut guards = Vec::with_capacity(handles.len());
        let mut timed_out = None;
        for (product_id, handle) in ids.iter().zip(&handles) {
            match handle.try_lock_for(self.timeout) {
                Some(guard) => guards.push(guard),
                None => {
                    timed_out = Some(LockTimeout {
                        product_id: *product_id,
                        waited: self.timeout,
                    });
                    break;
                }
            }
        }

        let out = match timed_out {
            Some(timeout) => Err(timeout.into()),
            None => f(),
        };
        drop(guards);
        self.release(&ids, handles);
        out
    }

    /// Forget handles nobody else holds. Clones are only made under the map
    /// lock, so a count of one here means no caller can still reach it.
    fn release(&self, ids: &[ProductId], handles: Vec<Arc<Mutex<()>>>) {
        drop(handles);
        let mut locks = self.locks.lock();
        for product_id in ids {
            if locks.get(product_id).is_some_and(|h| Arc::strong_count(h) == 1) {
                locks.remove(product_id);
            }
        }
    }
}
