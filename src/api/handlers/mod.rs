use axum::{http::StatusCode, response::IntoResponse};
use tracing::error;

use crate::api::regions::Region;

pub mod auth;
pub mod billing;
pub mod coupons;
pub mod health;
pub mod members;
pub mod panel_users;
pub mod plans;
pub mod referrals;
pub mod root;
pub mod status;

/// Storage-layer failures mapped onto stable HTTP responses.
///
/// Database errors are logged server-side and surfaced as `500` without
/// leaking details to clients.
#[derive(Debug)]
pub(crate) enum StoreError {
    BadRequest(&'static str),
    NotFound,
    Conflict(&'static str),
    Database(sqlx::Error),
}

/// Clamp a caller-supplied page size into the allowed window.
pub(crate) fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 100)
}

pub(crate) fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Parse a `{region}` path segment, mapping unknown values to `400`.
pub(crate) fn parse_region(value: &str) -> Result<Region, axum::response::Response> {
    Region::parse(value)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Unknown region.").into_response())
}

impl IntoResponse for StoreError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Conflict(message) => (StatusCode::CONFLICT, message).into_response(),
            Self::Database(err) => {
                error!("Database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
