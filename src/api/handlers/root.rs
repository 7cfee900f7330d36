use axum::response::IntoResponse;

// undocumented liveness probe, returns the service banner
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
