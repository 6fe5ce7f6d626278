//! Route handlers for the credential service.
//!
//! Handlers stay thin: input normalization and status mapping here, all
//! lifecycle rules in the `auth` managers, all persistence behind the
//! `store` capability.

pub mod gate;
pub mod health;
pub mod operators;
pub mod project_auth;
pub mod project_users;
pub mod projects;
pub mod root;
pub mod types;

use std::sync::Arc;

use crate::api::email::EmailSender;
use crate::auth::{AuthConfig, Credentials, SessionManager, VerificationManager};
use crate::store::Store;

/// Shared state handed to every handler through an `Extension`.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: SessionManager,
    pub verification: VerificationManager,
    pub credentials: Credentials,
    pub config: AuthConfig,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn EmailSender>, config: AuthConfig) -> Self {
        let credentials = Credentials::new(config.hash_timeout_seconds());
        let sessions = SessionManager::new(store.clone(), credentials.clone(), config.clone());
        let verification = VerificationManager::new(
            store.clone(),
            mailer,
            credentials.clone(),
            config.clone(),
        );
        Self {
            store,
            sessions,
            verification,
            credentials,
            config,
        }
    }
}
