//! OTP issuance endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::api::regions::RegionPools;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{issue_otp, lookup_active_panel_user, OtpOutcome};
use super::types::LoginRequest;
use super::utils::{extract_client_ip, normalize_email, valid_email};

/// Request a login code by email (always returns 204 to avoid account probing).
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 204, description = "Accepted; a code is mailed if the email belongs to an active admin"),
        (status = 400, description = "Missing payload", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // Always return 204 for invalid emails to avoid account probing.
        return StatusCode::NO_CONTENT.into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        // Login is intentionally opaque; rate limits still return 204.
        return StatusCode::NO_CONTENT.into_response();
    }
    if auth_state
        .rate_limiter()
        .check_email(&email, RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return StatusCode::NO_CONTENT.into_response();
    }

    let user = match lookup_active_panel_user(pools.panel(), &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to lookup panel user for login: {err}");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    match issue_otp(pools.panel(), &user, &email, auth_state.config()).await {
        Ok(OtpOutcome::Queued | OtpOutcome::Cooldown) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to issue otp: {err}");
            // Avoid leaking failures; always return 204 to callers.
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::super::state::{AuthConfig, AuthState};
    use super::{login, LoginRequest};
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
    async fn login_missing_payload() -> Result<()> {
        let response = login(
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
    async fn login_invalid_email_is_opaque() -> Result<()> {
        let response = login(
            HeaderMap::new(),
            Extension(lazy_pools()?),
            Extension(auth_state()),
            Some(Json(LoginRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        Ok(())
    }
}
