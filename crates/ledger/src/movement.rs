//! Movement types and their effect on a running balance.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use stockledger_core::{DomainError, DomainResult};

/// Kind of stock movement recorded by a ledger entry.
///
/// The set is closed: `apply_movement` matches exhaustively, so a new variant
/// does not compile until its balance effect is spelled out.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Sale,
    /// Signed correction; the quantity may be negative.
    Adjustment,
    TransferIn,
    TransferOut,
    Return,
    /// Like-for-like replacement. Logged for audit, never moves the balance.
    Replace,
    Waste,
    /// Absolute reset to the entry's quantity.
    Opening,
    /// Absolute reset to the entry's quantity.
    Closing,
}

impl MovementType {
    pub const ALL: [MovementType; 10] = [
        MovementType::Purchase,
        MovementType::Sale,
        MovementType::Adjustment,
        MovementType::TransferIn,
        MovementType::TransferOut,
        MovementType::Return,
        MovementType::Replace,
        MovementType::Waste,
        MovementType::Opening,
        MovementType::Closing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::Sale => "sale",
            MovementType::Adjustment => "adjustment",
            MovementType::TransferIn => "transfer_in",
            MovementType::TransferOut => "transfer_out",
            MovementType::Return => "return",
            MovementType::Replace => "replace",
            MovementType::Waste => "waste",
            MovementType::Opening => "opening",
            MovementType::Closing => "closing",
        }
    }

    /// True for movements that overwrite the running balance instead of
    /// adjusting it.
    pub fn resets_balance(self) -> bool {
        matches!(self, MovementType::Opening | MovementType::Closing)
    }

    /// Reject quantities that make no sense for this movement.
    ///
    /// Only the absolute resets are constrained: a stock level cannot be set
    /// to a negative count. Running balances themselves may still go negative
    /// through ordinary movements.
    pub fn validate(self, quantity: Decimal) -> DomainResult<()> {
        if self.resets_balance() && quantity < Decimal::ZERO {
            return Err(DomainError::invalid_movement(format!(
                "{} quantity cannot be negative (got {quantity})",
                self.as_str()
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    /// Accepts `transfer_in`, `TransferIn`, `transfer-in` and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        let movement = match normalized.as_str() {
            "purchase" => MovementType::Purchase,
            "sale" => MovementType::Sale,
            "adjustment" => MovementType::Adjustment,
            "transferin" => MovementType::TransferIn,
            "transferout" => MovementType::TransferOut,
            "return" => MovementType::Return,
            "replace" => MovementType::Replace,
            "waste" => MovementType::Waste,
            "opening" => MovementType::Opening,
            "closing" => MovementType::Closing,
            _ => {
                return Err(DomainError::invalid_movement(format!(
                    "unknown movement type '{s}'"
                )));
            }
        };
        Ok(movement)
    }
}

impl<'de> Deserialize<'de> for MovementType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Apply one movement to a running balance.
///
/// Total and deterministic; every balance in the ledger is produced by folding
/// this function over entries in logical-time order. A result outside
/// `Decimal`'s range saturates at `Decimal::MAX` / `Decimal::MIN`; writers use
/// [`checked_apply_movement`] and reject such movements instead.
pub fn apply_movement(current: Decimal, quantity: Decimal, movement: MovementType) -> Decimal {
    match movement {
        MovementType::Purchase | MovementType::TransferIn | MovementType::Return => {
            current.saturating_add(quantity)
        }
        MovementType::Sale | MovementType::TransferOut | MovementType::Waste => {
            current.saturating_sub(quantity)
        }
        MovementType::Adjustment => current.saturating_add(quantity),
        MovementType::Replace => current,
        MovementType::Opening | MovementType::Closing => quantity,
    }
}

/// [`apply_movement`] that returns `None` when the balance would leave
/// `Decimal`'s range.
pub fn checked_apply_movement(current: Decimal, quantity: Decimal, movement: MovementType) -> Option<Decimal> {
    match movement {
        MovementType::Purchase | MovementType::TransferIn | MovementType::Return => {
            current.checked_add(quantity)
        }
        MovementType::Sale | MovementType::TransferOut | MovementType::Waste => {
            current.checked_sub(quantity)
        }
        MovementType::Adjustment => current.checked_add(quantity),
        MovementType::Replace => Some(current),
        MovementType::Opening | MovementType::Closing => Some(quantity),
    }
}
