//! Session and token lifecycle orchestration.
//!
//! End-user sessions move `ISSUED -> LIVE -> {EXPIRED | REVOKED}`. Expiry is
//! derived from stored timestamps at validation time rather than written as a
//! state, which avoids clock-skew write races. Operator sessions only ever
//! move `LIVE -> EXPIRED` and are deleted explicitly on logout.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::store::{Account, NewOperatorSession, NewUserSession, Project, Store, UserSession};

use super::{error::AuthError, password::Credentials, policy, token, AuthConfig};

/// Artifacts returned from a successful sign-in. The refresh token appears
/// here and nowhere else; it is never re-exposed on reads.
#[derive(Debug)]
pub struct SignedIn {
    pub project_user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expiration: DateTime<Utc>,
    pub refresh_expiration: DateTime<Utc>,
}

/// Result of a token refresh: a new access token only. The refresh token and
/// its expiration are intentionally left untouched.
#[derive(Debug)]
pub struct Refreshed {
    pub access_token: String,
    pub access_expiration: DateTime<Utc>,
}

/// Resolved subject attached to the request context by the gate.
#[derive(Clone, Debug)]
pub struct Identity {
    pub project_user_id: Uuid,
    pub project_id: Uuid,
    pub email: String,
}

/// Operator login result; the raw token is returned exactly once.
#[derive(Debug)]
pub struct OperatorSignedIn {
    pub token: String,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn Store>,
    credentials: Credentials,
    config: AuthConfig,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, credentials: Credentials, config: AuthConfig) -> Self {
        Self {
            store,
            credentials,
            config,
        }
    }

    /// Sign a project user in, enforcing the project's policy.
    ///
    /// Credential failures are undifferentiated: an unknown email and a wrong
    /// password produce the same `Unauthorized`.
    pub async fn sign_in(
        &self,
        project: &Project,
        email: &str,
        password: SecretString,
        device_info: Option<String>,
    ) -> Result<SignedIn, AuthError> {
        let user = self
            .store
            .find_project_user_by_email(project.id, email)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if !self
            .credentials
            .verify(password, user.secret_hash.clone())
            .await?
        {
            return Err(AuthError::Unauthorized);
        }
        if !user.enabled {
            return Err(AuthError::Forbidden);
        }

        let policy = policy::resolve(project);
        let access_token = token::opaque().map_err(|err| AuthError::Upstream(err.to_string()))?;
        let refresh_token = token::opaque().map_err(|err| AuthError::Upstream(err.to_string()))?;
        let now = Utc::now();
        let session = self
            .store
            .create_user_session(
                NewUserSession {
                    project_user_id: user.id,
                    access_token_hash: token::digest(&access_token),
                    refresh_token_hash: token::digest(&refresh_token),
                    access_expiration: token::expiry_from(now, policy.access_ttl),
                    refresh_expiration: token::expiry_from(now, policy.refresh_ttl),
                    device_info,
                },
                policy.single_session,
            )
            .await?;
        debug!(project_id = %project.id, "user session issued");
        Ok(SignedIn {
            project_user_id: user.id,
            access_token,
            refresh_token,
            access_expiration: session.access_expiration,
            refresh_expiration: session.refresh_expiration,
        })
    }

    /// Mint a new access token against a live refresh token. The refresh
    /// token itself is not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Refreshed, AuthError> {
        let refresh_hash = token::digest(refresh_token);
        let now = Utc::now();
        let session = self
            .store
            .find_user_session_by_refresh(&refresh_hash)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if session.revoked_at.is_some() || session.refresh_expiration <= now {
            return Err(AuthError::Unauthorized);
        }
        let project = self.project_for(&session).await?;
        let policy = policy::resolve(&project);

        let access_token = token::opaque().map_err(|err| AuthError::Upstream(err.to_string()))?;
        // Near the end of the refresh window a full access TTL would outlive
        // the refresh expiration; cap it so the access side never does.
        let access_expiration =
            token::expiry_from(now, policy.access_ttl).min(session.refresh_expiration);
        // The store re-checks liveness; the lookup above only exists to
        // resolve the project policy.
        let updated = self
            .store
            .refresh_user_session(
                &refresh_hash,
                &token::digest(&access_token),
                access_expiration,
                now,
            )
            .await?
            .ok_or(AuthError::Unauthorized)?;
        Ok(Refreshed {
            access_token,
            access_expiration: updated.access_expiration,
        })
    }

    /// Remove the session behind an access token. Idempotent: an unknown
    /// token means the session is already gone.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let removed = self
            .store
            .delete_user_session_by_access(&token::digest(access_token))
            .await?;
        if !removed {
            debug!("sign-out for unknown access token; treating as signed out");
        }
        Ok(())
    }

    /// Validate a bearer access token and resolve the subject behind it.
    ///
    /// Success requires: session found, access token unexpired, session not
    /// revoked, and the owning account enabled. All failures except the
    /// disabled-account case collapse to `Unauthorized`.
    pub async fn validate(&self, access_token: &str) -> Result<Identity, AuthError> {
        let session = self
            .store
            .find_user_session_by_access(&token::digest(access_token))
            .await?
            .ok_or(AuthError::Unauthorized)?;
        let now = Utc::now();
        if session.revoked_at.is_some() || session.access_expiration <= now {
            return Err(AuthError::Unauthorized);
        }
        let user = self
            .store
            .find_project_user(session.project_user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if !user.enabled {
            return Err(AuthError::Forbidden);
        }
        Ok(Identity {
            project_user_id: user.id,
            project_id: user.project_id,
            email: user.email,
        })
    }

    /// Operator login: verify the account secret and mint a coarse-grained
    /// session token with a fixed TTL.
    pub async fn login(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<OperatorSignedIn, AuthError> {
        let account = self
            .store
            .find_account_by_email(email)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if !self
            .credentials
            .verify(password, account.secret_hash.clone())
            .await?
        {
            return Err(AuthError::Unauthorized);
        }
        let session_token =
            token::opaque().map_err(|err| AuthError::Upstream(err.to_string()))?;
        let now = Utc::now();
        let session = self
            .store
            .create_operator_session(NewOperatorSession {
                account_id: account.id,
                token_hash: token::digest(&session_token),
                metadata: json!({ "login_time": now.to_rfc3339() }),
                expires_at: token::expiry_from(
                    now,
                    chrono::Duration::seconds(self.config.operator_session_ttl_seconds()),
                ),
            })
            .await?;
        Ok(OperatorSignedIn {
            token: session_token,
            account_id: account.id,
            expires_at: session.expires_at,
        })
    }

    /// Delete an operator session. Idempotent, like user sign-out.
    pub async fn logout(&self, session_token: &str) -> Result<(), AuthError> {
        self.store
            .delete_operator_session(&token::digest(session_token))
            .await?;
        Ok(())
    }

    /// Validate an operator bearer token: session found and unexpired.
    pub async fn validate_operator(&self, session_token: &str) -> Result<Account, AuthError> {
        let session = self
            .store
            .find_operator_session(&token::digest(session_token))
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if session.expires_at <= Utc::now() {
            return Err(AuthError::Unauthorized);
        }
        self.store
            .find_account(session.account_id)
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    async fn project_for(&self, session: &UserSession) -> Result<Project, AuthError> {
        let user = self
            .store
            .find_project_user(session.project_user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        self.store
            .find_project(user.project_id)
            .await?
            .ok_or(AuthError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewAccount, NewProject, NewProjectUser, Platform};

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        manager: SessionManager,
        project: Project,
    }

    async fn fixture(single_session: bool) -> Result<Fixture, AuthError> {
        let store = Arc::new(MemoryStore::new());
        let credentials = Credentials::new(30);
        let config = AuthConfig::new("https://gatehouse.test".to_string());
        let manager =
            SessionManager::new(store.clone() as Arc<dyn Store>, credentials.clone(), config);

        let owner = store
            .create_account(NewAccount {
                email: "operator@example.com".to_string(),
                secret_hash: credentials.hash(secret("operator pass")).await?,
                metadata: json!({}),
            })
            .await?;
        let project = store
            .create_project(NewProject {
                name: "demo".to_string(),
                description: None,
                platform: Platform::All,
                access_ttl_seconds: Some(900),
                refresh_ttl_seconds: Some(43_200),
                single_session: Some(single_session),
                owner_account_id: owner.id,
            })
            .await?;
        store
            .create_project_user(NewProjectUser {
                project_id: project.id,
                email: "user@example.com".to_string(),
                secret_hash: credentials.hash(secret("user password")).await?,
                metadata: json!({}),
            })
            .await?;
        Ok(Fixture {
            store,
            manager,
            project,
        })
    }

    #[tokio::test]
    async fn sign_in_then_validate() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let signed_in = fx
            .manager
            .sign_in(&fx.project, "user@example.com", secret("user password"), None)
            .await?;
        let identity = fx.manager.validate(&signed_in.access_token).await?;
        assert_eq!(identity.project_user_id, signed_in.project_user_id);
        assert_eq!(identity.project_id, fx.project.id);
        assert!(signed_in.access_expiration < signed_in.refresh_expiration);
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_failures_are_undifferentiated() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let unknown = fx
            .manager
            .sign_in(&fx.project, "ghost@example.com", secret("whatever"), None)
            .await;
        let wrong = fx
            .manager
            .sign_in(&fx.project, "user@example.com", secret("wrong"), None)
            .await;
        assert!(matches!(unknown, Err(AuthError::Unauthorized)));
        assert!(matches!(wrong, Err(AuthError::Unauthorized)));
        Ok(())
    }

    #[tokio::test]
    async fn single_session_revokes_prior_sessions() -> Result<(), AuthError> {
        let fx = fixture(true).await?;
        let mut tokens = Vec::new();
        for _ in 0..3 {
            let signed_in = fx
                .manager
                .sign_in(&fx.project, "user@example.com", secret("user password"), None)
                .await?;
            tokens.push(signed_in);
        }
        // Only the most recent session validates.
        for stale in &tokens[..2] {
            assert!(matches!(
                fx.manager.validate(&stale.access_token).await,
                Err(AuthError::Unauthorized)
            ));
        }
        assert!(fx.manager.validate(&tokens[2].access_token).await.is_ok());

        let sessions = fx
            .store
            .list_user_sessions(tokens[2].project_user_id)
            .await
            .map_err(AuthError::from)?;
        let revoked = sessions
            .iter()
            .filter(|session| session.revoked_at.is_some())
            .count();
        assert_eq!(sessions.len(), 3);
        assert_eq!(revoked, 2);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_changes_only_the_access_side() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let signed_in = fx
            .manager
            .sign_in(&fx.project, "user@example.com", secret("user password"), None)
            .await?;
        let before = fx
            .store
            .find_user_session_by_refresh(&token::digest(&signed_in.refresh_token))
            .await
            .map_err(AuthError::from)?
            .expect("session");

        let refreshed = fx.manager.refresh(&signed_in.refresh_token).await?;
        assert_ne!(refreshed.access_token, signed_in.access_token);

        let after = fx
            .store
            .find_user_session_by_refresh(&token::digest(&signed_in.refresh_token))
            .await
            .map_err(AuthError::from)?
            .expect("session");
        assert_eq!(before.refresh_token_hash, after.refresh_token_hash);
        assert_eq!(before.refresh_expiration, after.refresh_expiration);
        assert_ne!(before.access_token_hash, after.access_token_hash);

        // The old access token no longer resolves; the new one does.
        assert!(matches!(
            fx.manager.validate(&signed_in.access_token).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(fx.manager.validate(&refreshed.access_token).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_keeps_expiry_order_for_inverted_ttl_records() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let credentials = Credentials::new(30);
        // Written straight to the store, bypassing the API validation that
        // would reject an access window reaching past the refresh window.
        let project = fx
            .store
            .create_project(NewProject {
                name: "inverted".to_string(),
                description: None,
                platform: Platform::All,
                access_ttl_seconds: Some(50_000),
                refresh_ttl_seconds: Some(900),
                single_session: None,
                owner_account_id: fx.project.owner_account_id,
            })
            .await
            .map_err(AuthError::from)?;
        fx.store
            .create_project_user(NewProjectUser {
                project_id: project.id,
                email: "edge@example.com".to_string(),
                secret_hash: credentials.hash(secret("edge password")).await?,
                metadata: json!({}),
            })
            .await
            .map_err(AuthError::from)?;

        let signed_in = fx
            .manager
            .sign_in(&project, "edge@example.com", secret("edge password"), None)
            .await?;
        assert!(signed_in.access_expiration < signed_in.refresh_expiration);
        Ok(())
    }

    #[tokio::test]
    async fn refreshed_access_never_outlives_the_refresh_window() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let user = fx
            .store
            .find_project_user_by_email(fx.project.id, "user@example.com")
            .await
            .map_err(AuthError::from)?
            .expect("user");
        // A session whose refresh window closes well before a full access TTL
        // (900 s under this project's policy) could elapse.
        let now = Utc::now();
        let refresh_expiration = now + chrono::Duration::seconds(30);
        fx.store
            .create_user_session(
                NewUserSession {
                    project_user_id: user.id,
                    access_token_hash: token::digest("closing-access"),
                    refresh_token_hash: token::digest("closing-refresh"),
                    access_expiration: now + chrono::Duration::seconds(10),
                    refresh_expiration,
                    device_info: None,
                },
                false,
            )
            .await
            .map_err(AuthError::from)?;

        let refreshed = fx.manager.refresh("closing-refresh").await?;
        assert!(refreshed.access_expiration <= refresh_expiration);

        let session = fx
            .store
            .find_user_session_by_refresh(&token::digest("closing-refresh"))
            .await
            .map_err(AuthError::from)?
            .expect("session");
        assert!(session.access_expiration <= session.refresh_expiration);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rejects_expired_refresh_token() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let user = fx
            .store
            .find_project_user_by_email(fx.project.id, "user@example.com")
            .await
            .map_err(AuthError::from)?
            .expect("user");
        let now = Utc::now();
        fx.store
            .create_user_session(
                NewUserSession {
                    project_user_id: user.id,
                    access_token_hash: token::digest("stale-access"),
                    refresh_token_hash: token::digest("stale-refresh"),
                    access_expiration: now - chrono::Duration::minutes(30),
                    refresh_expiration: now - chrono::Duration::minutes(1),
                    device_info: None,
                },
                false,
            )
            .await
            .map_err(AuthError::from)?;
        assert!(matches!(
            fx.manager.refresh("stale-refresh").await,
            Err(AuthError::Unauthorized)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn validate_rejects_expired_access_and_disabled_account() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let user = fx
            .store
            .find_project_user_by_email(fx.project.id, "user@example.com")
            .await
            .map_err(AuthError::from)?
            .expect("user");
        let now = Utc::now();
        fx.store
            .create_user_session(
                NewUserSession {
                    project_user_id: user.id,
                    access_token_hash: token::digest("expired-access"),
                    refresh_token_hash: token::digest("expired-refresh"),
                    access_expiration: now - chrono::Duration::seconds(1),
                    refresh_expiration: now + chrono::Duration::hours(1),
                    device_info: None,
                },
                false,
            )
            .await
            .map_err(AuthError::from)?;
        assert!(matches!(
            fx.manager.validate("expired-access").await,
            Err(AuthError::Unauthorized)
        ));

        let signed_in = fx
            .manager
            .sign_in(&fx.project, "user@example.com", secret("user password"), None)
            .await?;
        fx.store
            .set_project_user_enabled(user.id, false)
            .await
            .map_err(AuthError::from)?;
        assert!(matches!(
            fx.manager.validate(&signed_in.access_token).await,
            Err(AuthError::Forbidden)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn sign_out_is_idempotent() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let signed_in = fx
            .manager
            .sign_in(&fx.project, "user@example.com", secret("user password"), None)
            .await?;
        fx.manager.sign_out(&signed_in.access_token).await?;
        // Second invocation is not an error.
        fx.manager.sign_out(&signed_in.access_token).await?;
        assert!(matches!(
            fx.manager.validate(&signed_in.access_token).await,
            Err(AuthError::Unauthorized)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn operator_login_logout_cycle() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let signed_in = fx
            .manager
            .login("operator@example.com", secret("operator pass"))
            .await?;
        let account = fx.manager.validate_operator(&signed_in.token).await?;
        assert_eq!(account.id, signed_in.account_id);

        fx.manager.logout(&signed_in.token).await?;
        assert!(matches!(
            fx.manager.validate_operator(&signed_in.token).await,
            Err(AuthError::Unauthorized)
        ));
        // Idempotent.
        fx.manager.logout(&signed_in.token).await?;
        Ok(())
    }

    #[tokio::test]
    async fn operator_session_expiry_is_enforced() -> Result<(), AuthError> {
        let store = Arc::new(MemoryStore::new());
        let credentials = Credentials::new(30);
        let config = AuthConfig::new("https://gatehouse.test".to_string())
            .with_operator_session_ttl_seconds(-1);
        let manager =
            SessionManager::new(store.clone() as Arc<dyn Store>, credentials.clone(), config);
        store
            .create_account(NewAccount {
                email: "op@example.com".to_string(),
                secret_hash: credentials.hash(secret("pass")).await?,
                metadata: json!({}),
            })
            .await
            .map_err(AuthError::from)?;
        let signed_in = manager.login("op@example.com", secret("pass")).await?;
        assert!(matches!(
            manager.validate_operator(&signed_in.token).await,
            Err(AuthError::Unauthorized)
        ));
        Ok(())
    }
}
