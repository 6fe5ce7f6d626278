//! End-user authentication endpoints, scoped by the `x-project-id` header.
//!
//! Sign-in failures and reset requests are enumeration-safe, and tokens
//! minted under one project never validate under another.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use secrecy::ExposeSecret;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::auth::AuthError;
use crate::store::NewProjectUser;

use super::{
    gate,
    types::{
        normalize_email, valid_email, valid_password, ChangePasswordRequest,
        ForgotPasswordRequest, IdentityResponse, ProjectUserResponse, RefreshRequest,
        RefreshResponse, RegisterRequest, ResetPasswordRequest, SignInRequest, SignInResponse,
        MIN_PASSWORD_LENGTH,
    },
    AppState,
};

#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = RegisterRequest,
    responses (
        (status = 201, description = "User created", body = ProjectUserResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 401, description = "Missing or unknown x-project-id header"),
        (status = 409, description = "Email already registered in this project")
    ),
    tag = "auth"
)]
pub async fn signup(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let project = gate::require_project(&state, &headers).await?;
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::Validation("Invalid email address".to_string()));
    }
    if !valid_password(&request.password) {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    let secret_hash = state.credentials.hash(request.password).await?;
    let user = state
        .store
        .create_project_user(NewProjectUser {
            project_id: project.id,
            email,
            secret_hash,
            metadata: request.metadata.unwrap_or_else(|| json!({})),
        })
        .await?;
    info!(project_id = %project.id, user_id = %user.id, "user signed up");
    Ok((StatusCode::CREATED, Json(ProjectUserResponse::from(user))))
}

#[utoipa::path(
    post,
    path = "/auth/signin",
    request_body = SignInRequest,
    responses (
        (status = 200, description = "Tokens issued under the project policy", body = SignInResponse),
        (status = 401, description = "Unknown email, wrong password, or unknown project"),
        (status = 403, description = "Account disabled")
    ),
    tag = "auth"
)]
pub async fn signin(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SignInRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let project = gate::require_project(&state, &headers).await?;
    let email = normalize_email(&request.email);
    let signed_in = state
        .sessions
        .sign_in(&project, &email, request.password, request.device_info)
        .await?;
    Ok(Json(SignInResponse {
        user_id: signed_in.project_user_id,
        access_token: signed_in.access_token,
        refresh_token: signed_in.refresh_token,
        access_expiration: signed_in.access_expiration,
        refresh_expiration: signed_in.refresh_expiration,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/signout",
    responses (
        (status = 204, description = "Session removed, or was already gone"),
        (status = 401, description = "Missing bearer token or unknown project")
    ),
    security (("bearer" = [])),
    tag = "auth"
)]
pub async fn signout(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    gate::require_project(&state, &headers).await?;
    let token = gate::bearer_token(&headers)?;
    state.sessions.sign_out(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses (
        (status = 200, description = "New access token; the refresh token is unchanged", body = RefreshResponse),
        (status = 401, description = "Unknown, expired, or revoked refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AuthError> {
    gate::require_project(&state, &headers).await?;
    let refreshed = state.sessions.refresh(&request.refresh_token).await?;
    Ok(Json(RefreshResponse {
        access_token: refreshed.access_token,
        access_expiration: refreshed.access_expiration,
    }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses (
        (status = 200, description = "Subject behind the access token", body = IdentityResponse),
        (status = 401, description = "Missing, invalid, or cross-project token"),
        (status = 403, description = "Account disabled")
    ),
    security (("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let identity = gate::require_project_user(&state, &headers).await?;
    Ok(Json(IdentityResponse {
        user_id: identity.project_user_id,
        project_id: identity.project_id,
        email: identity.email,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses (
        (status = 204, description = "Reset link sent when the email is registered"),
        (status = 401, description = "Missing or unknown x-project-id header")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let project = gate::require_project(&state, &headers).await?;
    let email = normalize_email(&request.email);
    state
        .verification
        .request_password_reset(&email, Some(project.id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/reset-forgotten-password",
    request_body = ResetPasswordRequest,
    responses (
        (status = 204, description = "Password replaced and token consumed"),
        (status = 400, description = "Invalid token or rejected password"),
        (status = 401, description = "Missing or unknown x-project-id header")
    ),
    tag = "auth"
)]
pub async fn reset_forgotten_password(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    gate::require_project(&state, &headers).await?;
    state
        .verification
        .consume_password_reset(&request.token, request.new_password, request.confirm_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses (
        (status = 204, description = "Password replaced"),
        (status = 400, description = "Rejected new password"),
        (status = 401, description = "Missing token or wrong current password"),
        (status = 403, description = "Account disabled")
    ),
    security (("bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let identity = gate::require_project_user(&state, &headers).await?;
    if request.new_password.expose_secret() != request.confirm_password.expose_secret() {
        return Err(AuthError::Validation("Passwords do not match".to_string()));
    }
    if !valid_password(&request.new_password) {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    let user = state
        .store
        .find_project_user(identity.project_user_id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::Unauthorized)?;
    if !state
        .credentials
        .verify(request.old_password, user.secret_hash)
        .await?
    {
        return Err(AuthError::Unauthorized);
    }
    let secret_hash = state.credentials.hash(request.new_password).await?;
    if !state
        .store
        .update_project_user_secret(user.id, &secret_hash)
        .await?
    {
        return Err(AuthError::Unauthorized);
    }
    info!(user_id = %user.id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}
