use axum::response::IntoResponse;

/// Undocumented root route; useful as a cheap liveness probe behind proxies.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
