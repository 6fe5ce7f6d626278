//! Tenant (project) CRUD, operator-gated.
//!
//! Every route resolves the caller's operator session first and only ever
//! touches projects that caller owns; a foreign project id reads as `404`.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{policy, AuthError};
use crate::store::{Account, NewProject, Project, ProjectUpdate};

use super::{
    gate,
    types::{CreateProjectRequest, ProjectResponse, UpdateProjectRequest},
    AppState,
};

fn check_ttl(name: &str, value: Option<i64>) -> Result<(), AuthError> {
    match value {
        Some(ttl) if ttl <= 0 => Err(AuthError::Validation(format!(
            "{name} must be a positive number of seconds"
        ))),
        _ => Ok(()),
    }
}

// Sessions must never carry an access window that reaches its refresh
// window; omitted fields are compared at their default values.
fn check_ttl_order(access: Option<i64>, refresh: Option<i64>) -> Result<(), AuthError> {
    let access = access.unwrap_or(policy::DEFAULT_ACCESS_TTL_SECONDS);
    let refresh = refresh.unwrap_or(policy::DEFAULT_REFRESH_TTL_SECONDS);
    if access >= refresh {
        return Err(AuthError::Validation(
            "access_ttl_seconds must be shorter than refresh_ttl_seconds".to_string(),
        ));
    }
    Ok(())
}

pub(super) async fn owned_project(
    state: &AppState,
    account: &Account,
    id: Uuid,
) -> Result<Project, AuthError> {
    let project = state
        .store
        .find_project(id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::NotFound)?;
    // Foreign projects read the same as missing ones.
    if project.owner_account_id != account.id {
        return Err(AuthError::NotFound);
    }
    Ok(project)
}

#[utoipa::path(
    post,
    path = "/projects",
    request_body = CreateProjectRequest,
    responses (
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Invalid name or policy fields"),
        (status = 401, description = "Missing or invalid operator session")
    ),
    security (("bearer" = [])),
    tag = "projects"
)]
pub async fn create(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AuthError::Validation(
            "Project name must not be empty".to_string(),
        ));
    }
    check_ttl("access_ttl_seconds", request.access_ttl_seconds)?;
    check_ttl("refresh_ttl_seconds", request.refresh_ttl_seconds)?;
    check_ttl_order(request.access_ttl_seconds, request.refresh_ttl_seconds)?;
    let project = state
        .store
        .create_project(NewProject {
            name,
            description: request.description,
            platform: request.platform,
            access_ttl_seconds: request.access_ttl_seconds,
            refresh_ttl_seconds: request.refresh_ttl_seconds,
            single_session: request.single_session,
            owner_account_id: account.id,
        })
        .await?;
    info!(project_id = %project.id, "project created");
    Ok((StatusCode::CREATED, Json(ProjectResponse::from(project))))
}

#[utoipa::path(
    get,
    path = "/projects",
    responses (
        (status = 200, description = "Projects owned by the caller", body = [ProjectResponse]),
        (status = 401, description = "Missing or invalid operator session")
    ),
    security (("bearer" = [])),
    tag = "projects"
)]
pub async fn list(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    let projects = state.store.list_projects(account.id).await?;
    let projects: Vec<ProjectResponse> = projects.into_iter().map(ProjectResponse::from).collect();
    Ok(Json(projects))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    params (("id" = Uuid, Path, description = "Project id")),
    responses (
        (status = 200, description = "Project detail", body = ProjectResponse),
        (status = 401, description = "Missing or invalid operator session"),
        (status = 404, description = "Unknown project or owned by someone else")
    ),
    security (("bearer" = [])),
    tag = "projects"
)]
pub async fn get(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    let project = owned_project(&state, &account, id).await?;
    Ok(Json(ProjectResponse::from(project)))
}

#[utoipa::path(
    patch,
    path = "/projects/{id}",
    params (("id" = Uuid, Path, description = "Project id")),
    request_body = UpdateProjectRequest,
    responses (
        (status = 200, description = "Project updated", body = ProjectResponse),
        (status = 400, description = "Invalid policy fields"),
        (status = 401, description = "Missing or invalid operator session"),
        (status = 404, description = "Unknown project or owned by someone else")
    ),
    security (("bearer" = [])),
    tag = "projects"
)]
pub async fn update(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    let current = owned_project(&state, &account, id).await?;
    check_ttl("access_ttl_seconds", request.access_ttl_seconds)?;
    check_ttl("refresh_ttl_seconds", request.refresh_ttl_seconds)?;
    // A partial update is checked against the values it leaves in place.
    check_ttl_order(
        request.access_ttl_seconds.or(current.access_ttl_seconds),
        request.refresh_ttl_seconds.or(current.refresh_ttl_seconds),
    )?;
    if let Some(name) = &request.name {
        if name.trim().is_empty() {
            return Err(AuthError::Validation(
                "Project name must not be empty".to_string(),
            ));
        }
    }
    let project = state
        .store
        .update_project(
            id,
            ProjectUpdate {
                name: request.name.map(|name| name.trim().to_string()),
                description: request.description,
                platform: request.platform,
                access_ttl_seconds: request.access_ttl_seconds,
                refresh_ttl_seconds: request.refresh_ttl_seconds,
                single_session: request.single_session,
            },
        )
        .await?
        .ok_or(AuthError::NotFound)?;
    Ok(Json(ProjectResponse::from(project)))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    params (("id" = Uuid, Path, description = "Project id")),
    responses (
        (status = 204, description = "Project and all dependent records deleted"),
        (status = 401, description = "Missing or invalid operator session"),
        (status = 404, description = "Unknown project or owned by someone else")
    ),
    security (("bearer" = [])),
    tag = "projects"
)]
pub async fn delete(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    let account = gate::require_operator(&state, &headers).await?;
    owned_project(&state, &account, id).await?;
    // Cascades to project users, their sessions, and pending tokens.
    if !state.store.delete_project(id).await? {
        return Err(AuthError::NotFound);
    }
    info!(project_id = %id, "project deleted");
    Ok(StatusCode::NO_CONTENT)
}
