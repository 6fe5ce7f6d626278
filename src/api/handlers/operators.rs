//! Operator account and session endpoints.
//!
//! Forgot-password and send-verification reply `204` whether or not the
//! email is registered, so the endpoints cannot be used to enumerate
//! accounts.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::auth::AuthError;
use crate::store::{EmailVerifyOutcome, NewAccount};

use secrecy::ExposeSecret;

use super::{
    gate,
    types::{
        normalize_email, valid_email, valid_password, AccountResponse, ChangePasswordRequest,
        ForgotPasswordRequest, LoginRequest, OperatorSessionResponse, RegisterRequest,
        ResetPasswordRequest, SendVerificationRequest, UpdateProfileRequest, VerifyEmailRequest,
        VerifyEmailResponse, MIN_PASSWORD_LENGTH,
    },
    AppState,
};

#[utoipa::path(
    post,
    path = "/operators/register",
    request_body = RegisterRequest,
    responses (
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "Email already registered")
    ),
    tag = "operators"
)]
pub async fn register(
    state: Extension<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
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
    let account = state
        .store
        .create_account(NewAccount {
            email,
            secret_hash,
            metadata: request.metadata.unwrap_or_else(|| json!({})),
        })
        .await?;
    info!(account_id = %account.id, "operator account created");
    Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
}

#[utoipa::path(
    post,
    path = "/operators/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Session token issued", body = OperatorSessionResponse),
        (status = 401, description = "Unknown email or wrong password")
    ),
    tag = "operators"
)]
pub async fn login(
    state: Extension<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = normalize_email(&request.email);
    let signed_in = state.sessions.login(&email, request.password).await?;
    Ok(Json(OperatorSessionResponse {
        token: signed_in.token,
        account_id: signed_in.account_id,
        expires_at: signed_in.expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/operators/logout",
    responses (
        (status = 204, description = "Session removed, or was already gone"),
        (status = 401, description = "Missing bearer token")
    ),
    security (("bearer" = [])),
    tag = "operators"
)]
pub async fn logout(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let token = gate::bearer_token(&headers)?;
    state.sessions.logout(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/operators/me",
    responses (
        (status = 200, description = "Account behind the session token", body = AccountResponse),
        (status = 401, description = "Missing, invalid, or expired session token")
    ),
    security (("bearer" = [])),
    tag = "operators"
)]
pub async fn me(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    Ok(Json(AccountResponse::from(account)))
}

#[utoipa::path(
    put,
    path = "/operators/profile",
    request_body = UpdateProfileRequest,
    responses (
        (status = 200, description = "Updated account", body = AccountResponse),
        (status = 400, description = "Metadata is not a JSON object"),
        (status = 401, description = "Missing, invalid, or expired session token")
    ),
    security (("bearer" = [])),
    tag = "operators"
)]
pub async fn update_profile(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    if !request.metadata.is_object() {
        return Err(AuthError::Validation(
            "Metadata must be a JSON object".to_string(),
        ));
    }
    let account = state
        .store
        .update_account_metadata(account.id, request.metadata)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    info!(account_id = %account.id, "operator profile updated");
    Ok(Json(AccountResponse::from(account)))
}

#[utoipa::path(
    post,
    path = "/operators/change-password",
    request_body = ChangePasswordRequest,
    responses (
        (status = 204, description = "Password replaced"),
        (status = 400, description = "Rejected new password"),
        (status = 401, description = "Missing token or wrong current password")
    ),
    security (("bearer" = [])),
    tag = "operators"
)]
pub async fn change_password(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    if request.new_password.expose_secret() != request.confirm_password.expose_secret() {
        return Err(AuthError::Validation("Passwords do not match".to_string()));
    }
    if !valid_password(&request.new_password) {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if !state
        .credentials
        .verify(request.old_password, account.secret_hash.clone())
        .await?
    {
        return Err(AuthError::Unauthorized);
    }
    let secret_hash = state.credentials.hash(request.new_password).await?;
    if !state
        .store
        .update_account_secret(account.id, &secret_hash)
        .await?
    {
        return Err(AuthError::Unauthorized);
    }
    info!(account_id = %account.id, "operator password changed");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/operators/forgot-password",
    request_body = ForgotPasswordRequest,
    responses (
        (status = 204, description = "Reset link sent when the email is registered")
    ),
    tag = "operators"
)]
pub async fn forgot_password(
    state: Extension<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = normalize_email(&request.email);
    state.verification.request_password_reset(&email, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/operators/reset-password",
    request_body = ResetPasswordRequest,
    responses (
        (status = 204, description = "Password replaced and token consumed"),
        (status = 400, description = "Invalid token or rejected password")
    ),
    tag = "operators"
)]
pub async fn reset_password(
    state: Extension<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .verification
        .consume_password_reset(&request.token, request.new_password, request.confirm_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/operators/send-verification",
    request_body = SendVerificationRequest,
    responses (
        (status = 204, description = "Verification link sent when the email is registered")
    ),
    tag = "operators"
)]
pub async fn send_verification(
    state: Extension<Arc<AppState>>,
    Json(request): Json<SendVerificationRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = normalize_email(&request.email);
    state.verification.request_email_verification(&email).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/operators/verify-email",
    request_body = VerifyEmailRequest,
    responses (
        (status = 200, description = "Token consumed", body = VerifyEmailResponse),
        (status = 400, description = "Invalid or expired token")
    ),
    tag = "operators"
)]
pub async fn verify_email(
    state: Extension<Arc<AppState>>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let outcome = state
        .verification
        .consume_email_verification(&request.token)
        .await?;
    let status = match outcome {
        EmailVerifyOutcome::AlreadyVerified => "already_verified",
        _ => "verified",
    };
    Ok(Json(VerifyEmailResponse {
        status: status.to_string(),
    }))
}
