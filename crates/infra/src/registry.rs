//! Product/unit catalog as seen by the ledger: existence checks and display
//! names. The catalog itself is owned elsewhere.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use stockledger_core::{ProductId, UnitId};

pub trait ProductRegistry: Send + Sync {
    fn contains(&self, product_id: ProductId) -> bool;
    fn product_name(&self, product_id: ProductId) -> Option<String>;
    fn unit_name(&self, unit_id: UnitId) -> Option<String>;
}

impl<S> ProductRegistry for Arc<S>
where
    S: ProductRegistry + ?Sized,
{
    fn contains(&self, product_id: ProductId) -> bool {
        (**self).contains(product_id)
    }

    fn product_name(&self, product_id: ProductId) -> Option<String> {
        (**self).product_name(product_id)
    }

    fn unit_name(&self, unit_id: UnitId) -> Option<String> {
        (**self).unit_name(unit_id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryProductRegistry {
    products: RwLock<HashMap<ProductId, String>>,
    units: RwLock<HashMap<UnitId, String>>,
}

impl InMemoryProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_product(&self, product_id: ProductId, name: impl Into<String>) {
        self.products.write().insert(product_id, name.into());
    }

    pub fn register_unit(&self, unit_id: UnitId, name: impl Into<String>) {
        self.units.write().insert(unit_id, name.into());
    }
}

impl ProductRegistry for InMemoryProductRegistry {
    fn contains(&self, product_id: ProductId) -> bool {
        self.products.read().contains_key(&product_id)
    }

    fn product_name(&self, product_id: ProductId) -> Option<String> {
        self.products.read().get(&product_id).cloned()
    }

    fn unit_name(&self, unit_id: UnitId) -> Option<String> {
        self.units.read().get(&unit_id).cloned()
    }
}
