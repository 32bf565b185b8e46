//! System-wide constants for the settlement ledger.

/// Alphabet for referral codes. Omits `0`, `1`, `l`, and `o`.
pub const REF_CODE_ALPHABET: &[u8] = b"23456789abcdefghijkmnpqrstuvwxyz";

/// Default referral code length.
pub const DEFAULT_REF_CODE_LENGTH: usize = 10;

/// Shortest ref code accepted on conversion submission.
pub const MIN_REF_CODE_LEN: usize = 4;

/// Longest external user id accepted on conversion submission.
pub const MAX_EXTERNAL_USER_ID_LEN: usize = 200;

/// Longest idempotency key accepted on conversion submission.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 200;

/// Default prefix of generated conversion API keys (`sm_<random>`).
pub const DEFAULT_API_KEY_PREFIX: &str = "sm";

/// Random bytes in a generated API key.
pub const API_KEY_RANDOM_BYTES: usize = 24;

/// Default attempts for the bounded retry helper.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default pause between retry attempts (milliseconds).
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 25;

/// Default wait for a campaign row lock before giving up (milliseconds).
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Default conversion-intake rate limit window (milliseconds).
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;

/// Default conversion submissions per client within the window.
pub const DEFAULT_RATE_LIMIT_PER_WINDOW: usize = 60;

/// Default bound on one external transfer request (milliseconds).
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 10_000;

/// Default number of due payouts settled per sweep.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 100;

/// Settlement currency.
pub const DEFAULT_CURRENCY: &str = "usd";

/// Default tracing filter.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name used in logs.
pub const SERVICE_NAME: &str = "curator-ledger";
