//! Domain-level constants shared by every crate.

/// Maximum length of a partition key (account / document number).
pub const MAX_PARTITION_KEY_LENGTH: usize = 20;

/// Maximum length of a serialized record payload.
pub const MAX_PAYLOAD_LENGTH: usize = 1000;

/// Maximum length of a persisted error message; longer messages are truncated.
pub const MAX_ERROR_LENGTH: usize = 1000;

/// Sentinel dispatch id reported for every failed dispatch.
pub const FAILED_DISPATCH_ID: i64 = -1;

/// Status code reported when a failure carries no classified status.
pub const INTERNAL_ERROR_STATUS: u16 = 500;

/// Prefix of token cache keys; the partition key is appended.
pub const TOKEN_CACHE_KEY_PREFIX: &str = "token_hub_";

/// Authorization scheme used for hub credentials.
pub const BEARER_SCHEME: &str = "Bearer";

/// Header carrying the application token on every hub request.
pub const APP_TOKEN_HEADER: &str = "App-Token";
