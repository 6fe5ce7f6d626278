//! Secret hashing and verification (Argon2id).
//!
//! Both operations are CPU-bound and run on the blocking pool behind a
//! timeout; a saturated pool degrades into a retryable `Upstream` failure
//! instead of stalling request dispatch.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::warn;

use super::error::AuthError;

/// Handle for hashing and verifying account secrets.
#[derive(Clone, Debug)]
pub struct Credentials {
    timeout: Duration,
}

impl Credentials {
    #[must_use]
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    /// Hash a secret with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns `Upstream` if the blocking pool times out or the hash itself
    /// fails; well-formed input never produces a validation error here.
    pub async fn hash(&self, secret: SecretString) -> Result<String, AuthError> {
        self.offload(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(secret.expose_secret().as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|err| AuthError::Upstream(format!("password hashing failed: {err}")))
        })
        .await
    }

    /// Verify a secret against a stored hash.
    ///
    /// A malformed stored hash is a store-invariant violation: it is logged
    /// and verifies as `false`, never as an error.
    pub async fn verify(&self, secret: SecretString, hash: String) -> Result<bool, AuthError> {
        self.offload(move || {
            let parsed = match PasswordHash::new(&hash) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("malformed secret hash in store: {err}");
                    return Ok(false);
                }
            };
            Ok(Argon2::default()
                .verify_password(secret.expose_secret().as_bytes(), &parsed)
                .is_ok())
        })
        .await
    }

    async fn offload<T, F>(&self, work: F) -> Result<T, AuthError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(AuthError::Upstream(format!("hashing task failed: {join}"))),
            Err(_) => Err(AuthError::Upstream(
                "hashing timed out; retry later".to_string(),
            )),
        }
    }
}
