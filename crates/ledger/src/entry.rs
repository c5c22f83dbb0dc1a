use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainResult, LedgerEntryId, ProductId, UnitId};

use crate::movement::MovementType;

/// Ordering key of the ledger's logical time axis.
///
/// Entries sort by `created_at`; entries sharing a timestamp sort by id, which
/// follows insertion order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalTime {
    pub created_at: DateTime<Utc>,
    pub id: LedgerEntryId,
}

/// One recorded stock movement for a product, with its running balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub product_id: ProductId,
    pub unit_id: Option<UnitId>,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    /// Stock level of `product_id` right after this entry, in logical time.
    pub balance: Decimal,
    pub location: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Materialize a new entry once the store has assigned its id.
    pub fn from_new(id: LedgerEntryId, new: NewLedgerEntry, balance: Decimal) -> Self {
        Self {
            id,
            product_id: new.product_id,
            unit_id: new.unit_id,
            movement_type: new.movement_type,
            quantity: new.quantity,
            balance,
            location: new.location,
            reference_type: new.reference_type,
            reference_id: new.reference_id,
            note: new.note,
            created_at: new.created_at,
        }
    }

    pub fn logical_time(&self) -> LogicalTime {
        LogicalTime {
            created_at: self.created_at,
            id: self.id,
        }
    }

    /// Overwrite the caller-controlled fields. `id`, `created_at` and
    /// `balance` are left alone; the balance is re-derived by the sweep.
    pub fn apply_update(&mut self, update: EntryUpdate) {
        self.product_id = update.product_id;
        self.unit_id = update.unit_id;
        self.movement_type = update.movement_type;
        self.quantity = update.quantity;
        self.location = update.location;
        self.reference_type = update.reference_type;
        self.reference_id = update.reference_id;
        self.note = update.note;
    }
}

/// Input for recording a new movement: everything but `id` and `balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub product_id: ProductId,
    #[serde(default)]
    pub unit_id: Option<UnitId>,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl NewLedgerEntry {
    /// A movement stamped with the current time and no metadata.
    pub fn new(product_id: ProductId, movement_type: MovementType, quantity: Decimal) -> Self {
        Self {
            product_id,
            unit_id: None,
            movement_type,
            quantity,
            location: None,
            reference_type: None,
            reference_id: None,
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn unit(mut self, unit_id: UnitId) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Link the movement to the document that caused it (e.g. `"sale_order"`, `"SO-1042"`).
    pub fn reference(mut self, reference_type: impl Into<String>, reference_id: impl Into<String>) -> Self {
        self.reference_type = Some(reference_type.into());
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.movement_type.validate(self.quantity)
    }
}

/// Replacement fields for correcting an existing entry.
///
/// This is a full replacement; start from `EntryUpdate::from(&entry)` to
/// change only a few fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub product_id: ProductId,
    #[serde(default)]
    pub unit_id: Option<UnitId>,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl EntryUpdate {
    pub fn validate(&self) -> DomainResult<()> {
        self.movement_type.validate(self.quantity)
    }
}

impl From<&LedgerEntry> for EntryUpdate {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            product_id: entry.product_id,
            unit_id: entry.unit_id,
            movement_type: entry.movement_type,
            quantity: entry.quantity,
            location: entry.location.clone(),
            reference_type: entry.reference_type.clone(),
            reference_id: entry.reference_id.clone(),
            note: entry.note.clone(),
        }
    }
}
