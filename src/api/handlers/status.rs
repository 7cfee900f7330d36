//! Third-party API health probes.
//!
//! The panel depends on external providers (payment gateway, SMS/email
//! vendors); this endpoint probes the configured URLs concurrently and
//! reports failures in-band — a dead provider never turns into a 5xx of the
//! panel itself.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use utoipa::ToSchema;

use crate::api::regions::RegionPools;

use super::auth::principal::require_auth;
use super::auth::state::AuthState;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiStatus {
    pub url: String,
    pub healthy: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

pub struct MonitorState {
    client: reqwest::Client,
    targets: Vec<String>,
}

impl MonitorState {
    #[must_use]
    pub fn new(client: reqwest::Client, targets: Vec<String>) -> Self {
        Self { client, targets }
    }

    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Probe every configured endpoint concurrently.
    pub async fn probe_all(&self) -> Vec<ApiStatus> {
        join_all(
            self.targets
                .iter()
                .map(|target| probe(&self.client, target)),
        )
        .await
    }
}

async fn probe(client: &reqwest::Client, url: &str) -> ApiStatus {
    let started = Instant::now();
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            ApiStatus {
                url: url.to_string(),
                healthy: status.is_success(),
                status_code: Some(status.as_u16()),
                latency_ms: elapsed_ms(started),
                error: None,
            }
        }
        Err(err) => ApiStatus {
            url: url.to_string(),
            healthy: false,
            status_code: err.status().map(|status| status.as_u16()),
            latency_ms: elapsed_ms(started),
            // `reqwest` errors embed the URL already; keep the source chain out.
            error: Some(err.without_url().to_string()),
        },
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[utoipa::path(
    get,
    path = "/v1/status/apis",
    responses(
        (status = 200, description = "Per-endpoint probe results.", body = [ApiStatus]),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "status"
)]
pub async fn api_status(
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    monitor: Extension<Arc<MonitorState>>,
) -> impl IntoResponse {
    if let Err(status) = require_auth(&headers, pools.panel(), &auth_state).await {
        return status.into_response();
    }

    let results = monitor.probe_all().await;
    (StatusCode::OK, Json(results)).into_response()
}

#[cfg(test)]
mod tests {
    use super::MonitorState;

    #[tokio::test]
    async fn empty_target_list_probes_nothing() {
        let monitor = MonitorState::new(reqwest::Client::new(), Vec::new());
        assert!(monitor.probe_all().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_target_reports_in_band() {
        // Reserved TEST-NET-1 address; the connection fails fast.
        let monitor = MonitorState::new(
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(500))
                .build()
                .unwrap(),
            vec!["http://192.0.2.1:9/health".to_string()],
        );

        let results = monitor.probe_all().await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].healthy);
        assert!(results[0].error.is_some());
        assert_eq!(results[0].url, "http://192.0.2.1:9/health");
    }
}
