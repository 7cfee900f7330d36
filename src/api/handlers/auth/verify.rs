//! OTP verification and session minting.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::api::regions::RegionPools;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::session_cookie;
use super::state::AuthState;
use super::storage::{consume_otp, insert_session, lookup_active_panel_user, lookup_session};
use super::types::{SessionResponse, VerifyOtpRequest};
use super::utils::{
    extract_client_ip, hash_session_token, normalize_email, valid_email, valid_otp_shape,
};

/// Verify a login code and mint the session cookie.
///
/// The code is consumed in the same statement that matches it, so a replayed
/// code fails with 401 even when racing a concurrent verify.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Session created; cookie set", body = SessionResponse),
        (status = 400, description = "Missing or malformed payload", body = String),
        (status = 401, description = "Unknown email or invalid/expired code", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let request: VerifyOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || !valid_otp_shape(&request.otp) {
        return (StatusCode::BAD_REQUEST, "Malformed payload".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyOtp)
        == RateLimitDecision::Limited
    {
        // Rate limits are enforced before any database work to slow guessing.
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }
    if auth_state
        .rate_limiter()
        .check_email(&email, RateLimitAction::VerifyOtp)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let user = match lookup_active_panel_user(pools.panel(), &email).await {
        Ok(Some(user)) => user,
        // Unknown email and wrong code are indistinguishable to the caller.
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "Invalid code".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to lookup panel user for verify: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    match consume_otp(pools.panel(), user.id, &request.otp).await {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::UNAUTHORIZED, "Invalid code".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to consume otp: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    }

    let ttl_seconds = auth_state.config().session_ttl_seconds();
    let token = match insert_session(pools.panel(), user.id, ttl_seconds).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to insert session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    // Read the profile back through the session row so the response matches
    // exactly what GET /v1/auth/session will report.
    let record = match lookup_session(pools.panel(), &hash_session_token(&token)).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            error!("Freshly minted session did not resolve");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to resolve new session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(&auth_state, &token) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    }

    let response = SessionResponse {
        user_id: record.user_id.to_string(),
        email: record.email,
        display_name: record.display_name,
        role: record.role,
    };

    (StatusCode::OK, response_headers, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::super::state::{AuthConfig, AuthState};
    use super::{verify_otp, VerifyOtpRequest};
    use crate::api::regions::RegionPools;
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::Json;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn lazy_pools() -> Result<RegionPools> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        Ok(RegionPools::new(pool.clone(), pool.clone(), pool))
    }

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Arc::new(AuthState::new(config, limiter))
    }

    #[tokio::test]
    async fn verify_missing_payload() -> Result<()> {
        let response = verify_otp(
            HeaderMap::new(),
            Extension(lazy_pools()?),
            Extension(auth_state()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_malformed_code_shape() -> Result<()> {
        let response = verify_otp(
            HeaderMap::new(),
            Extension(lazy_pools()?),
            Extension(auth_state()),
            Some(Json(VerifyOtpRequest {
                email: "ops@mdrecords.dev".to_string(),
                otp: "12ab56".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_malformed_email() -> Result<()> {
        let response = verify_otp(
            HeaderMap::new(),
            Extension(lazy_pools()?),
            Extension(auth_state()),
            Some(Json(VerifyOtpRequest {
                email: "nope".to_string(),
                otp: "123456".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
