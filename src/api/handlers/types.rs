//! Request/response types shared across handlers, plus input normalization.

use chrono::{DateTime, Utc};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::{Account, Platform, Project, ProjectUser};

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(crate) const MIN_PASSWORD_LENGTH: usize = 8;

/// Minimum-length check applied before any hashing work is queued.
pub(crate) fn valid_password(password: &SecretString) -> bool {
    password.expose_secret().len() >= MIN_PASSWORD_LENGTH
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
    pub metadata: Option<serde_json::Value>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            email_verified: account.email_verified,
            metadata: account.metadata,
            created_at: account.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OperatorSessionResponse {
    pub token: String,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub platform: Platform,
    pub access_ttl_seconds: Option<i64>,
    pub refresh_ttl_seconds: Option<i64>,
    pub single_session: Option<bool>,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub platform: Option<Platform>,
    pub access_ttl_seconds: Option<i64>,
    pub refresh_ttl_seconds: Option<i64>,
    pub single_session: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProjectResponse {
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

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            name: project.name,
            description: project.description,
            platform: project.platform,
            access_ttl_seconds: project.access_ttl_seconds,
            refresh_ttl_seconds: project.refresh_ttl_seconds,
            single_session: project.single_session,
            owner_account_id: project.owner_account_id,
            created_at: project.created_at,
        }
    }
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct CreateProjectUserRequest {
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
    pub metadata: Option<serde_json::Value>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProjectUserResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub email: String,
    pub metadata: serde_json::Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ProjectUser> for ProjectUserResponse {
    fn from(user: ProjectUser) -> Self {
        Self {
            id: user.id,
            project_id: user.project_id,
            email: user.email,
            metadata: user.metadata,
            enabled: user.enabled,
            created_at: user.created_at,
        }
    }
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct SignInRequest {
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
    pub device_info: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignInResponse {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expiration: DateTime<Utc>,
    pub refresh_expiration: DateTime<Utc>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
    pub access_expiration: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct IdentityResponse {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[schema(value_type = String)]
    pub new_password: SecretString,
    #[schema(value_type = String)]
    pub confirm_password: SecretString,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    #[schema(value_type = String)]
    pub old_password: SecretString,
    #[schema(value_type = String)]
    pub new_password: SecretString,
    #[schema(value_type = String)]
    pub confirm_password: SecretString,
}

/// Full replacement of the account's metadata document.
#[derive(ToSchema, Deserialize, Debug)]
pub struct UpdateProfileRequest {
    pub metadata: serde_json::Value,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct SendVerificationRequest {
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_password_enforces_minimum_length() {
        assert!(!valid_password(&SecretString::from("seven77".to_string())));
        assert!(valid_password(&SecretString::from("eight888".to_string())));
    }

    #[test]
    fn sign_in_request_deserializes_secret() {
        let request: SignInRequest = serde_json::from_value(serde_json::json!({
            "email": "a@example.com",
            "password": "hunter2hunter2"
        }))
        .expect("deserialize");
        assert_eq!(request.email, "a@example.com");
        assert!(request.device_info.is_none());
    }
}
