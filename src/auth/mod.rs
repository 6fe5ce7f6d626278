//! Core credential-lifecycle engine: password hashing, policy resolution,
//! token minting, session state machines, and verification flows.
//!
//! Everything here is transport-agnostic; HTTP handlers in `api` call into
//! these managers, and all persistence goes through the `store` capability.

pub mod error;
pub mod password;
pub mod policy;
pub mod sessions;
pub mod token;
pub mod verification;

pub use error::AuthError;
pub use password::Credentials;
pub use sessions::{Identity, SessionManager};
pub use verification::VerificationManager;

const DEFAULT_OPERATOR_SESSION_TTL_SECONDS: i64 = 2 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_VERIFY_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_HASH_TIMEOUT_SECONDS: u64 = 10;

/// Service-wide knobs for the credential engine.
///
/// Per-project policy (access/refresh TTLs, single-session) lives on the
/// project record; this covers everything that is not tenant-scoped.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    operator_session_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    verify_token_ttl_seconds: i64,
    hash_timeout_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            operator_session_ttl_seconds: DEFAULT_OPERATOR_SESSION_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            verify_token_ttl_seconds: DEFAULT_VERIFY_TOKEN_TTL_SECONDS,
            hash_timeout_seconds: DEFAULT_HASH_TIMEOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_operator_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.operator_session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verify_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verify_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_hash_timeout_seconds(mut self, seconds: u64) -> Self {
        self.hash_timeout_seconds = seconds;
        self
    }

    /// Base URL used when building links for outbound email.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn operator_session_ttl_seconds(&self) -> i64 {
        self.operator_session_ttl_seconds
    }

    #[must_use]
    pub fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    #[must_use]
    pub fn verify_token_ttl_seconds(&self) -> i64 {
        self.verify_token_ttl_seconds
    }

    #[must_use]
    pub fn hash_timeout_seconds(&self) -> u64 {
        self.hash_timeout_seconds
    }
}
