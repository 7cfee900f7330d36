use crate::api::{
    regions::{Region, RegionPools},
    GIT_COMMIT_HASH,
};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{error, info_span, Instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    panel: String,
    india: String,
    usa: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Panel and both regional databases are healthy", body = Health),
        (status = 503, description = "At least one database is unhealthy", body = Health)
    ),
    tag = "status"
)]
// axum handler for health
pub async fn health(method: Method, pools: Extension<RegionPools>) -> impl IntoResponse {
    let panel = ping(pools.panel(), "panel").await;
    let india = ping(pools.region(Region::India), "india").await;
    let usa = ping(pools.region(Region::Usa), "usa").await;

    let is_healthy = panel && india && usa;

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        panel: status_str(panel),
        india: status_str(india),
        usa: status_str(usa),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) =
        format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>()
    {
        headers.insert("X-App", value);
    }

    if is_healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}

fn status_str(ok: bool) -> String {
    if ok {
        "ok".to_string()
    } else {
        "error".to_string()
    }
}

async fn ping(pool: &PgPool, name: &'static str) -> bool {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE",
        db.name = name
    );
    match pool.acquire().instrument(acquire_span).await {
        Ok(mut conn) => {
            let ping_span = info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING",
                db.name = name
            );
            match conn.ping().instrument(ping_span).await {
                Ok(()) => true,
                Err(error) => {
                    error!("Failed to ping {name} database: {error}");
                    false
                }
            }
        }
        Err(error) => {
            error!("Failed to acquire {name} database connection: {error}");
            false
        }
    }
}
