use super::handlers::{health, operators, project_auth, project_users, projects};
use utoipa::openapi::{InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec.
/// Routes added outside (like `/` or `OPTIONS /health`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(operators::register))
        .routes(routes!(operators::login))
        .routes(routes!(operators::logout))
        .routes(routes!(operators::me))
        .routes(routes!(operators::update_profile))
        .routes(routes!(operators::change_password))
        .routes(routes!(operators::forgot_password))
        .routes(routes!(operators::reset_password))
        .routes(routes!(operators::send_verification))
        .routes(routes!(operators::verify_email))
        .routes(routes!(projects::create, projects::list))
        .routes(routes!(
            projects::get,
            projects::update,
            projects::delete
        ))
        .routes(routes!(project_users::create, project_users::list))
        .routes(routes!(project_users::get, project_users::delete))
        .routes(routes!(project_users::set_enabled))
        .routes(routes!(project_auth::signup))
        .routes(routes!(project_auth::signin))
        .routes(routes!(project_auth::signout))
        .routes(routes!(project_auth::refresh))
        .routes(routes!(project_auth::me))
        .routes(routes!(project_auth::forgot_password))
        .routes(routes!(project_auth::reset_forgotten_password))
        .routes(routes!(project_auth::change_password))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.license = cargo_license();

    OpenApiBuilder::new().info(info).tags(Some(api_tags())).build()
}

fn api_tags() -> Vec<Tag> {
    let mut operators_tag = Tag::new("operators");
    operators_tag.description = Some("Operator accounts and admin sessions".to_string());

    let mut projects_tag = Tag::new("projects");
    projects_tag.description = Some("Tenant management".to_string());

    let mut project_users_tag = Tag::new("project-users");
    project_users_tag.description = Some("End-user administration within a tenant".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("End-user authentication, scoped by x-project-id".to_string());

    vec![operators_tag, projects_tag, project_users_tag, auth_tag]
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
