//! Engine configuration loading and representation.

use std::str::FromStr;
use std::time::Duration;

/// Tunables of [`crate::engine::LedgerEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Reject movements for products the registry does not know.
    pub strict_products: bool,
    /// Upper bound on waiting for a product's critical section.
    pub lock_timeout: Duration,
    /// Extra attempts after a store-level optimistic conflict.
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_products: false,
            lock_timeout: Duration::from_secs(5),
            max_conflict_retries: 3,
        }
    }
}

impl EngineConfig {
    pub const STRICT_PRODUCTS: &'static str = "STOCKLEDGER_STRICT_PRODUCTS";
    pub const LOCK_TIMEOUT_MS: &'static str = "STOCKLEDGER_LOCK_TIMEOUT_MS";
    pub const MAX_CONFLICT_RETRIES: &'static str = "STOCKLEDGER_MAX_CONFLICT_RETRIES";

    /// Load from process environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their default and
    /// malformed values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let strict_products = lookup(Self::STRICT_PRODUCTS)
            .and_then(|raw| parse_flag(Self::STRICT_PRODUCTS, &raw))
            .unwrap_or(defaults.strict_products);

        let lock_timeout = lookup(Self::LOCK_TIMEOUT_MS)
            .and_then(|raw| parse_or_warn::<u64>(Self::LOCK_TIMEOUT_MS, &raw))
            .map(Duration::from_millis)
            .unwrap_or(defaults.lock_timeout);

        let max_conflict_retries = lookup(Self::MAX_CONFLICT_RETRIES)
            .and_then(|raw| parse_or_warn::<u32>(Self::MAX_CONFLICT_RETRIES, &raw))
            .unwrap_or(defaults.max_conflict_retries);

        Self {
            strict_products,
            lock_timeout,
            max_conflict_retries,
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = raw, "ignoring malformed setting; using default");
            None
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = raw, "ignoring malformed flag; using default");
            None
        }
    }
}
