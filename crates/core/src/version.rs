//! Optimistic concurrency expectations for per-product ledger sequences.

use crate::error::{DomainError, DomainResult};

/// The version a writer saw when it read a product's ledger sequence.
///
/// Every committed mutation bumps the version of each product it touched, so a
/// writer that read version `n` can detect that someone else committed since.
/// There is no wildcard: every commit is checked.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExpectedVersion(pub u64);

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        self.0 == actual
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {}, actual: {actual})",
                self.0
            )))
        }
    }
}
