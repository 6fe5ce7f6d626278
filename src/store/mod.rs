//! Store capability: arena-style tables keyed by id, with explicit foreign
//! keys and all traversal going through this trait.
//!
//! The engine never does read-then-write without a guard; every coordination
//! invariant (token uniqueness, single-session enforcement, exactly-once
//! consumption) is expressed as one atomic operation here so concurrent
//! requests cannot race it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A declared unique constraint fired; the payload names the field.
    #[error("unique constraint violated: {0}")]
    Conflict(&'static str),
    #[error("store backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Closed set of platforms a project targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "platform", rename_all = "lowercase")]
pub enum Platform {
    Web,
    Mobile,
    Desktop,
    All,
}

/// Discriminant for the shared verification-token table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "verification_kind", rename_all = "snake_case")]
pub enum TokenKind {
    PasswordReset,
    EmailVerify,
}

/// Operator-scope account.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub secret_hash: String,
    pub metadata: serde_json::Value,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub secret_hash: String,
    pub metadata: serde_json::Value,
}

/// Tenant record. TTL and single-session fields are optional; the policy
/// resolver supplies defaults when they are omitted.
#[derive(Clone, Debug)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub platform: Platform,
    pub access_ttl_seconds: Option<i64>,
    pub refresh_ttl_seconds: Option<i64>,
    pub single_session: Option<bool>,
    pub owner_account_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub platform: Platform,
    pub access_ttl_seconds: Option<i64>,
    pub refresh_ttl_seconds: Option<i64>,
    pub single_session: Option<bool>,
    pub owner_account_id: Uuid,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub platform: Option<Platform>,
    pub access_ttl_seconds: Option<i64>,
    pub refresh_ttl_seconds: Option<i64>,
    pub single_session: Option<bool>,
}

/// End-user account scoped to exactly one project; email unique per project.
#[derive(Clone, Debug)]
pub struct ProjectUser {
    pub id: Uuid,
    pub project_id: Uuid,
    pub email: String,
    pub secret_hash: String,
    pub metadata: serde_json::Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewProjectUser {
    pub project_id: Uuid,
    pub email: String,
    pub secret_hash: String,
    pub metadata: serde_json::Value,
}

/// Coarse-grained admin session: simple expiry, no refresh, deleted on
/// logout.
#[derive(Clone, Debug)]
pub struct OperatorSession {
    pub id: Uuid,
    pub account_id: Uuid,
    pub token_hash: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewOperatorSession {
    pub account_id: Uuid,
    pub token_hash: String,
    pub metadata: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

/// End-user session. Expiry is derived from the stored timestamps at
/// validation time; a non-null `revoked_at` makes it permanently inert.
#[derive(Clone, Debug)]
pub struct UserSession {
    pub id: Uuid,
    pub project_user_id: Uuid,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub access_expiration: DateTime<Utc>,
    pub refresh_expiration: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub device_info: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserSession {
    /// Live means neither revoked nor past either expiration.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.access_expiration && now < self.refresh_expiration
    }
}

#[derive(Clone, Debug)]
pub struct NewUserSession {
    pub project_user_id: Uuid,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub access_expiration: DateTime<Utc>,
    pub refresh_expiration: DateTime<Utc>,
    pub device_info: Option<String>,
}

/// Single-use token for password reset and email verification. Keyed by
/// subject email, not a user foreign key, so the record stays resolvable
/// without revealing whether the subject exists.
#[derive(Clone, Debug)]
pub struct VerificationToken {
    pub id: Uuid,
    pub subject_email: String,
    /// `None` targets an operator account, `Some` a project user.
    pub project_id: Option<Uuid>,
    pub token_hash: String,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewVerificationToken {
    pub subject_email: String,
    pub project_id: Option<Uuid>,
    pub token_hash: String,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of consuming an email-verification token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailVerifyOutcome {
    Verified,
    /// The token was valid but the subject was already verified; consuming
    /// again is a success, not an error.
    AlreadyVerified,
    Invalid,
}

/// Storage capability for the credential engine.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    // -- operator accounts
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError>;
    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
    /// Replaces the whole metadata document and returns the updated account.
    async fn update_account_metadata(
        &self,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<Option<Account>, StoreError>;
    async fn update_account_secret(&self, id: Uuid, secret_hash: &str)
        -> Result<bool, StoreError>;

    // -- projects
    async fn create_project(&self, new: NewProject) -> Result<Project, StoreError>;
    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;
    async fn list_projects(&self, owner_account_id: Uuid) -> Result<Vec<Project>, StoreError>;
    async fn update_project(
        &self,
        id: Uuid,
        update: ProjectUpdate,
    ) -> Result<Option<Project>, StoreError>;
    /// Deletes the project and cascade-deletes its users and their sessions.
    async fn delete_project(&self, id: Uuid) -> Result<bool, StoreError>;

    // -- project users
    async fn create_project_user(&self, new: NewProjectUser) -> Result<ProjectUser, StoreError>;
    async fn find_project_user(&self, id: Uuid) -> Result<Option<ProjectUser>, StoreError>;
    async fn find_project_user_by_email(
        &self,
        project_id: Uuid,
        email: &str,
    ) -> Result<Option<ProjectUser>, StoreError>;
    async fn list_project_users(&self, project_id: Uuid) -> Result<Vec<ProjectUser>, StoreError>;
    async fn set_project_user_enabled(&self, id: Uuid, enabled: bool) -> Result<bool, StoreError>;
    async fn update_project_user_secret(
        &self,
        id: Uuid,
        secret_hash: &str,
    ) -> Result<bool, StoreError>;
    /// Deletes the user and cascade-deletes their sessions.
    async fn delete_project_user(&self, id: Uuid) -> Result<bool, StoreError>;

    // -- operator sessions
    async fn create_operator_session(
        &self,
        new: NewOperatorSession,
    ) -> Result<OperatorSession, StoreError>;
    async fn find_operator_session(
        &self,
        token_hash: &str,
    ) -> Result<Option<OperatorSession>, StoreError>;
    async fn delete_operator_session(&self, token_hash: &str) -> Result<bool, StoreError>;

    // -- user sessions
    /// Create a session; when `revoke_existing` is set, all currently-live
    /// sessions for the same user are revoked first, atomically, so two
    /// sessions are never simultaneously live under a single-session policy.
    async fn create_user_session(
        &self,
        new: NewUserSession,
        revoke_existing: bool,
    ) -> Result<UserSession, StoreError>;
    async fn find_user_session_by_access(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserSession>, StoreError>;
    async fn find_user_session_by_refresh(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserSession>, StoreError>;
    async fn list_user_sessions(
        &self,
        project_user_id: Uuid,
    ) -> Result<Vec<UserSession>, StoreError>;
    /// Swap in a new access token iff the refresh token is still live at
    /// `now`; the guard is re-evaluated inside the store so concurrent
    /// refreshes cannot resurrect a revoked or expired session.
    async fn refresh_user_session(
        &self,
        refresh_token_hash: &str,
        new_access_token_hash: &str,
        new_access_expiration: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSession>, StoreError>;
    async fn delete_user_session_by_access(&self, token_hash: &str) -> Result<bool, StoreError>;

    // -- verification tokens
    async fn create_verification_token(
        &self,
        new: NewVerificationToken,
    ) -> Result<VerificationToken, StoreError>;
    /// Exactly-once consumption paired atomically with the secret update:
    /// either the token flips to used *and* the subject's secret changes, or
    /// neither is observed. Returns `false` for unknown, wrong-kind, used, or
    /// expired tokens, and for tokens whose subject no longer exists.
    async fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        new_secret_hash: &str,
    ) -> Result<bool, StoreError>;
    /// Exactly-once consumption; flips the subject's `email_verified` flag.
    /// Re-verification of an already-verified subject still consumes the
    /// token and reports `AlreadyVerified`.
    async fn consume_email_verification(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<EmailVerifyOutcome, StoreError>;
}
