//! Request authentication gate.
//!
//! Three tiers of access run through here: operator bearer tokens, tenant
//! resolution via the `x-project-id` header, and end-user bearer tokens.
//! Failures collapse to `Unauthorized` wherever differentiation would leak
//! whether a credential or tenant exists.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use uuid::Uuid;

use crate::auth::{AuthError, Identity};
use crate::store::{Account, Project};

use super::AppState;

pub const PROJECT_HEADER: &str = "x-project-id";

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::Unauthorized)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthorized)?;
    Ok(token)
}

/// Resolve and validate an operator session from the request headers.
pub async fn require_operator(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Account, AuthError> {
    let token = bearer_token(headers)?;
    state.sessions.validate_operator(token).await
}

/// Resolve the tenant named by the `x-project-id` header. A missing header,
/// a malformed id, and an unknown project all read the same.
pub async fn require_project(state: &AppState, headers: &HeaderMap) -> Result<Project, AuthError> {
    let id = headers
        .get(PROJECT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or(AuthError::Unauthorized)?;
    state
        .store
        .find_project(id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::Unauthorized)
}

/// Resolve and validate an end-user session scoped to the request's tenant.
/// A token minted under a different project does not cross over.
pub async fn require_project_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Identity, AuthError> {
    let project = require_project(state, headers).await?;
    let token = bearer_token(headers)?;
    let identity = state.sessions.validate(token).await?;
    if identity.project_id != project.id {
        return Err(AuthError::Unauthorized);
    }
    Ok(identity)
}
