//! End-user administration within a project, operator-gated.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::store::{NewProjectUser, ProjectUser};

use super::{
    gate,
    types::{
        normalize_email, valid_email, valid_password, CreateProjectUserRequest,
        ProjectUserResponse, SetEnabledRequest, MIN_PASSWORD_LENGTH,
    },
    projects::owned_project,
    AppState,
};

async fn scoped_user(
    state: &AppState,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<ProjectUser, AuthError> {
    let user = state
        .store
        .find_project_user(user_id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::NotFound)?;
    if user.project_id != project_id {
        return Err(AuthError::NotFound);
    }
    Ok(user)
}

#[utoipa::path(
    post,
    path = "/projects/{id}/users",
    params (("id" = Uuid, Path, description = "Project id")),
    request_body = CreateProjectUserRequest,
    responses (
        (status = 201, description = "User created", body = ProjectUserResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 401, description = "Missing or invalid operator session"),
        (status = 404, description = "Unknown project or owned by someone else"),
        (status = 409, description = "Email already registered in this project")
    ),
    security (("bearer" = [])),
    tag = "project-users"
)]
pub async fn create(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateProjectUserRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    let project = owned_project(&state, &account, id).await?;
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
    info!(project_id = %project.id, user_id = %user.id, "project user created");
    Ok((StatusCode::CREATED, Json(ProjectUserResponse::from(user))))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/users",
    params (("id" = Uuid, Path, description = "Project id")),
    responses (
        (status = 200, description = "Users in the project", body = [ProjectUserResponse]),
        (status = 401, description = "Missing or invalid operator session"),
        (status = 404, description = "Unknown project or owned by someone else")
    ),
    security (("bearer" = [])),
    tag = "project-users"
)]
pub async fn list(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    let project = owned_project(&state, &account, id).await?;
    let users = state.store.list_project_users(project.id).await?;
    let users: Vec<ProjectUserResponse> =
        users.into_iter().map(ProjectUserResponse::from).collect();
    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/users/{user_id}",
    params (
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "User id")
    ),
    responses (
        (status = 200, description = "User detail", body = ProjectUserResponse),
        (status = 401, description = "Missing or invalid operator session"),
        (status = 404, description = "Unknown project or user")
    ),
    security (("bearer" = [])),
    tag = "project-users"
)]
pub async fn get(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    let project = owned_project(&state, &account, id).await?;
    let user = scoped_user(&state, project.id, user_id).await?;
    Ok(Json(ProjectUserResponse::from(user)))
}

#[utoipa::path(
    patch,
    path = "/projects/{id}/users/{user_id}/enabled",
    params (
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "User id")
    ),
    request_body = SetEnabledRequest,
    responses (
        (status = 200, description = "Flag updated", body = ProjectUserResponse),
        (status = 401, description = "Missing or invalid operator session"),
        (status = 404, description = "Unknown project or user")
    ),
    security (("bearer" = [])),
    tag = "project-users"
)]
pub async fn set_enabled(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<SetEnabledRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    let project = owned_project(&state, &account, id).await?;
    scoped_user(&state, project.id, user_id).await?;
    if !state
        .store
        .set_project_user_enabled(user_id, request.enabled)
        .await?
    {
        return Err(AuthError::NotFound);
    }
    // Disabling does not delete sessions; the gate rejects them on use.
    let user = scoped_user(&state, project.id, user_id).await?;
    info!(user_id = %user.id, enabled = user.enabled, "project user flag updated");
    Ok(Json(ProjectUserResponse::from(user)))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/users/{user_id}",
    params (
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "User id")
    ),
    responses (
        (status = 204, description = "User and their sessions deleted"),
        (status = 401, description = "Missing or invalid operator session"),
        (status = 404, description = "Unknown project or user")
    ),
    security (("bearer" = [])),
    tag = "project-users"
)]
pub async fn delete(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    let project = owned_project(&state, &account, id).await?;
    scoped_user(&state, project.id, user_id).await?;
    if !state.store.delete_project_user(user_id).await? {
        return Err(AuthError::NotFound);
    }
    info!(user_id = %user_id, "project user deleted");
    Ok(StatusCode::NO_CONTENT)
}
