//! Configuration for a ledger process.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! [store]
//! lock_timeout_ms = 5000
//!
//! [retry]
//! max_attempts = 3
//!
//! [rate_limit]
//! window_ms = 60000
//! max_per_window = 60
//!
//! [settlement]
//! currency = "usd"
//!
//! [log]
//! filter = "info,curator_ingress=debug"
//! json = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result, constants};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub store: StoreConfig,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub settlement: SettlementConfig,
    pub credentials: CredentialConfig,
    pub log: LogConfig,
}

impl LedgerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| LedgerError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Reject values that would make the ledger unusable.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(LedgerError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.store.lock_timeout_ms == 0 {
            return Err(LedgerError::Configuration(
                "store.lock_timeout_ms must be positive".into(),
            ));
        }
        if self.rate_limit.max_per_window == 0 || self.rate_limit.window_ms == 0 {
            return Err(LedgerError::Configuration(
                "rate_limit window and allowance must be positive".into(),
            ));
        }
        if self.credentials.ref_code_length < constants::MIN_REF_CODE_LEN {
            return Err(LedgerError::Configuration(format!(
                "credentials.ref_code_length must be at least {}",
                constants::MIN_REF_CODE_LEN
            )));
        }
        if self.settlement.currency.trim().is_empty() {
            return Err(LedgerError::Configuration(
                "settlement.currency must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Longest wait for a campaign row lock.
    pub lock_timeout_ms: u64,
}

impl StoreConfig {
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: constants::DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

/// Bounded retry for whole operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RETRY_ATTEMPTS,
            backoff_ms: constants::DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

/// Conversion-intake throttle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_per_window: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: constants::DEFAULT_RATE_LIMIT_WINDOW_MS,
            max_per_window: constants::DEFAULT_RATE_LIMIT_PER_WINDOW,
        }
    }
}

/// Payout settlement settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub currency: String,
    pub transfer_timeout_ms: u64,
    pub sweep_batch_size: usize,
}

impl SettlementConfig {
    #[must_use]
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            currency: constants::DEFAULT_CURRENCY.to_owned(),
            transfer_timeout_ms: constants::DEFAULT_TRANSFER_TIMEOUT_MS,
            sweep_batch_size: constants::DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

/// API key and ref code generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub api_key_prefix: String,
    pub ref_code_length: usize,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            api_key_prefix: constants::DEFAULT_API_KEY_PREFIX.to_owned(),
            ref_code_length: constants::DEFAULT_REF_CODE_LENGTH,
        }
    }
}

/// Tracing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: constants::DEFAULT_LOG_FILTER.to_owned(),
            json: false,
        }
    }
}
