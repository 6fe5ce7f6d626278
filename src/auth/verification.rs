//! Password-reset and email-verification token flows.
//!
//! Request paths are enumeration-safe: asking for a token against an unknown
//! subject succeeds without writing or sending anything, so the response
//! never reveals whether an email is registered. Consumption is exactly-once
//! and paired atomically with its side effect in the store.

use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::api::email::{EmailMessage, EmailSender};
use crate::store::{EmailVerifyOutcome, NewVerificationToken, Store, TokenKind};

use super::{error::AuthError, password::Credentials, token, AuthConfig};

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone)]
pub struct VerificationManager {
    store: Arc<dyn Store>,
    mailer: Arc<dyn EmailSender>,
    credentials: Credentials,
    config: AuthConfig,
}

impl VerificationManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn EmailSender>,
        credentials: Credentials,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            credentials,
            config,
        }
    }

    /// Issue a password-reset token for an operator account or a project
    /// user and mail the link. Unknown subjects succeed silently.
    pub async fn request_password_reset(
        &self,
        email: &str,
        project_id: Option<Uuid>,
    ) -> Result<(), AuthError> {
        if !self.subject_exists(email, project_id).await? {
            debug!("password reset requested for unknown subject; no token issued");
            return Ok(());
        }
        let raw = self.issue(email, project_id, TokenKind::PasswordReset).await?;
        let link = format!("{}/reset-password?token={raw}", self.config.base_url());
        self.deliver(EmailMessage {
            to_email: email.to_string(),
            subject: "Reset your password".to_string(),
            body: format!("Use this link to reset your password: {link}"),
        })
    }

    /// Issue an email-verification token for an operator account and mail
    /// the link. Unknown subjects succeed silently.
    pub async fn request_email_verification(&self, email: &str) -> Result<(), AuthError> {
        if !self.subject_exists(email, None).await? {
            debug!("verification requested for unknown subject; no token issued");
            return Ok(());
        }
        let raw = self.issue(email, None, TokenKind::EmailVerify).await?;
        let link = format!("{}/verify-email?token={raw}", self.config.base_url());
        self.deliver(EmailMessage {
            to_email: email.to_string(),
            subject: "Verify your email address".to_string(),
            body: format!("Use this link to verify your email address: {link}"),
        })
    }

    /// Consume a reset token and install the new secret.
    ///
    /// Input validation runs before any write, so a mismatched confirmation
    /// or a short password leaves the token consumable. An unknown, expired,
    /// used, or wrong-kind token reports the same validation failure.
    pub async fn consume_password_reset(
        &self,
        raw_token: &str,
        new_password: SecretString,
        confirm_password: SecretString,
    ) -> Result<(), AuthError> {
        if new_password.expose_secret() != confirm_password.expose_secret() {
            return Err(AuthError::Validation("Passwords do not match".to_string()));
        }
        if new_password.expose_secret().len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        let secret_hash = self.credentials.hash(new_password).await?;
        let consumed = self
            .store
            .consume_password_reset(&token::digest(raw_token), Utc::now(), &secret_hash)
            .await?;
        if !consumed {
            return Err(AuthError::Validation(
                "Invalid or expired token".to_string(),
            ));
        }
        Ok(())
    }

    /// Consume an email-verification token. Verifying an already-verified
    /// account still consumes the token and succeeds.
    pub async fn consume_email_verification(
        &self,
        raw_token: &str,
    ) -> Result<EmailVerifyOutcome, AuthError> {
        let outcome = self
            .store
            .consume_email_verification(&token::digest(raw_token), Utc::now())
            .await?;
        if outcome == EmailVerifyOutcome::Invalid {
            return Err(AuthError::Validation(
                "Invalid or expired token".to_string(),
            ));
        }
        Ok(outcome)
    }

    async fn subject_exists(
        &self,
        email: &str,
        project_id: Option<Uuid>,
    ) -> Result<bool, AuthError> {
        match project_id {
            Some(project_id) => Ok(self
                .store
                .find_project_user_by_email(project_id, email)
                .await?
                .is_some()),
            None => Ok(self.store.find_account_by_email(email).await?.is_some()),
        }
    }

    async fn issue(
        &self,
        email: &str,
        project_id: Option<Uuid>,
        kind: TokenKind,
    ) -> Result<String, AuthError> {
        let ttl = match kind {
            TokenKind::PasswordReset => self.config.reset_token_ttl_seconds(),
            TokenKind::EmailVerify => self.config.verify_token_ttl_seconds(),
        };
        let raw = token::opaque().map_err(|err| AuthError::Upstream(err.to_string()))?;
        self.store
            .create_verification_token(NewVerificationToken {
                subject_email: email.to_string(),
                project_id,
                token_hash: token::digest(&raw),
                kind,
                expires_at: token::expiry_from(Utc::now(), Duration::seconds(ttl)),
            })
            .await?;
        Ok(raw)
    }

    // Token persistence precedes delivery, so a mail failure is retryable
    // without reissuing.
    fn deliver(&self, message: EmailMessage) -> Result<(), AuthError> {
        self.mailer
            .send(&message)
            .map_err(|err| AuthError::Upstream(format!("email delivery failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewAccount, NewProject, NewProjectUser, Platform};
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::Mutex;

    struct CaptureSender {
        sent: Mutex<Vec<EmailMessage>>,
        fail: bool,
    }

    impl CaptureSender {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn count(&self) -> usize {
            self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
        }

        fn token_from_last(&self) -> Option<String> {
            let sent = self.sent.lock().ok()?;
            let body = &sent.last()?.body;
            body.split("token=").nth(1).map(ToString::to_string)
        }
    }

    impl EmailSender for CaptureSender {
        fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(message.clone());
            }
            if self.fail {
                return Err(anyhow!("smtp unreachable"));
            }
            Ok(())
        }
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        mailer: Arc<CaptureSender>,
        manager: VerificationManager,
        credentials: Credentials,
    }

    async fn fixture(fail_mail: bool) -> Result<Fixture, AuthError> {
        fixture_with(
            fail_mail,
            AuthConfig::new("https://gatehouse.test".to_string()),
        )
        .await
    }

    async fn fixture_with(fail_mail: bool, config: AuthConfig) -> Result<Fixture, AuthError> {
        let store = Arc::new(MemoryStore::new());
        let mailer = CaptureSender::new(fail_mail);
        let credentials = Credentials::new(30);
        let manager = VerificationManager::new(
            store.clone() as Arc<dyn Store>,
            mailer.clone() as Arc<dyn EmailSender>,
            credentials.clone(),
            config,
        );
        store
            .create_account(NewAccount {
                email: "operator@example.com".to_string(),
                secret_hash: credentials.hash(secret("original pass")).await?,
                metadata: json!({}),
            })
            .await?;
        Ok(Fixture {
            store,
            mailer,
            manager,
            credentials,
        })
    }

    #[tokio::test]
    async fn unknown_subject_gets_no_token_and_no_mail() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        fx.manager
            .request_password_reset("nobody@example.com", None)
            .await?;
        assert_eq!(fx.mailer.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn reset_round_trip_replaces_the_secret() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        fx.manager
            .request_password_reset("operator@example.com", None)
            .await?;
        let raw = fx.mailer.token_from_last().expect("mailed token");

        fx.manager
            .consume_password_reset(&raw, secret("fresh password"), secret("fresh password"))
            .await?;
        let account = fx
            .store
            .find_account_by_email("operator@example.com")
            .await
            .map_err(AuthError::from)?
            .expect("account");
        assert!(
            fx.credentials
                .verify(secret("fresh password"), account.secret_hash.clone())
                .await?
        );
        assert!(
            !fx.credentials
                .verify(secret("original pass"), account.secret_hash)
                .await?
        );

        // Second consumption of the same token fails.
        let again = fx
            .manager
            .consume_password_reset(&raw, secret("other password"), secret("other password"))
            .await;
        assert!(matches!(again, Err(AuthError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn validation_failures_leave_the_token_consumable() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        fx.manager
            .request_password_reset("operator@example.com", None)
            .await?;
        let raw = fx.mailer.token_from_last().expect("mailed token");

        let mismatch = fx
            .manager
            .consume_password_reset(&raw, secret("one password"), secret("another password"))
            .await;
        assert!(matches!(mismatch, Err(AuthError::Validation(_))));
        let short = fx
            .manager
            .consume_password_reset(&raw, secret("tiny"), secret("tiny"))
            .await;
        assert!(matches!(short, Err(AuthError::Validation(_))));

        // Still consumable after both rejections.
        fx.manager
            .consume_password_reset(&raw, secret("valid password"), secret("valid password"))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn mail_failure_surfaces_but_token_persists() -> Result<(), AuthError> {
        let fx = fixture(true).await?;
        let result = fx
            .manager
            .request_password_reset("operator@example.com", None)
            .await;
        assert!(matches!(result, Err(AuthError::Upstream(_))));

        // The token row was written before delivery was attempted.
        let raw = fx.mailer.token_from_last().expect("attempted token");
        fx.manager
            .consume_password_reset(&raw, secret("new password"), secret("new password"))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected_and_leaves_the_secret() -> Result<(), AuthError> {
        let config = AuthConfig::new("https://gatehouse.test".to_string())
            .with_reset_token_ttl_seconds(-1);
        let fx = fixture_with(false, config).await?;
        fx.manager
            .request_password_reset("operator@example.com", None)
            .await?;
        let raw = fx.mailer.token_from_last().expect("mailed token");

        let stale = fx
            .manager
            .consume_password_reset(&raw, secret("new password"), secret("new password"))
            .await;
        assert!(matches!(stale, Err(AuthError::Validation(_))));

        // The old secret is untouched.
        let account = fx
            .store
            .find_account_by_email("operator@example.com")
            .await
            .map_err(AuthError::from)?
            .expect("account");
        assert!(
            fx.credentials
                .verify(secret("original pass"), account.secret_hash)
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_verification_token_is_rejected() -> Result<(), AuthError> {
        let config = AuthConfig::new("https://gatehouse.test".to_string())
            .with_verify_token_ttl_seconds(-1);
        let fx = fixture_with(false, config).await?;
        fx.manager
            .request_email_verification("operator@example.com")
            .await?;
        let raw = fx.mailer.token_from_last().expect("mailed token");

        assert!(matches!(
            fx.manager.consume_email_verification(&raw).await,
            Err(AuthError::Validation(_))
        ));
        let account = fx
            .store
            .find_account_by_email("operator@example.com")
            .await
            .map_err(AuthError::from)?
            .expect("account");
        assert!(!account.email_verified);
        Ok(())
    }

    #[tokio::test]
    async fn email_verification_round_trip() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        fx.manager
            .request_email_verification("operator@example.com")
            .await?;
        let raw = fx.mailer.token_from_last().expect("mailed token");

        let outcome = fx.manager.consume_email_verification(&raw).await?;
        assert_eq!(outcome, EmailVerifyOutcome::Verified);
        let account = fx
            .store
            .find_account_by_email("operator@example.com")
            .await
            .map_err(AuthError::from)?
            .expect("account");
        assert!(account.email_verified);

        // A second token for the same account reports AlreadyVerified.
        fx.manager
            .request_email_verification("operator@example.com")
            .await?;
        let second = fx.mailer.token_from_last().expect("mailed token");
        let outcome = fx.manager.consume_email_verification(&second).await?;
        assert_eq!(outcome, EmailVerifyOutcome::AlreadyVerified);

        // Reusing the first token is invalid.
        assert!(matches!(
            fx.manager.consume_email_verification(&raw).await,
            Err(AuthError::Validation(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn reset_scoped_to_a_project_user() -> Result<(), AuthError> {
        let fx = fixture(false).await?;
        let owner = fx
            .store
            .find_account_by_email("operator@example.com")
            .await
            .map_err(AuthError::from)?
            .expect("account");
        let project = fx
            .store
            .create_project(NewProject {
                name: "demo".to_string(),
                description: None,
                platform: Platform::All,
                access_ttl_seconds: None,
                refresh_ttl_seconds: None,
                single_session: None,
                owner_account_id: owner.id,
            })
            .await
            .map_err(AuthError::from)?;
        let user = fx
            .store
            .create_project_user(NewProjectUser {
                project_id: project.id,
                email: "user@example.com".to_string(),
                secret_hash: fx.credentials.hash(secret("old password")).await?,
                metadata: json!({}),
            })
            .await
            .map_err(AuthError::from)?;

        fx.manager
            .request_password_reset("user@example.com", Some(project.id))
            .await?;
        let raw = fx.mailer.token_from_last().expect("mailed token");
        fx.manager
            .consume_password_reset(&raw, secret("new password"), secret("new password"))
            .await?;

        let updated = fx
            .store
            .find_project_user(user.id)
            .await
            .map_err(AuthError::from)?
            .expect("user");
        assert!(
            fx.credentials
                .verify(secret("new password"), updated.secret_hash)
                .await?
        );
        Ok(())
    }
}
