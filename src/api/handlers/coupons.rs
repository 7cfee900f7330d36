//! Regional coupon management.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::regions::RegionPools;

use super::auth::principal::require_auth;
use super::auth::state::AuthState;
use super::{parse_region, StoreError};

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponResponse {
    pub id: String,
    pub code: String,
    pub discount_percent: i32,
    pub max_redemptions: i32,
    pub redeemed_count: i32,
    pub expires_at: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateCouponRequest {
    pub code: String,
    pub discount_percent: i32,
    pub max_redemptions: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateCouponRequest {
    pub discount_percent: Option<i32>,
    pub max_redemptions: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

const COUPON_COLUMNS: &str = r#"
    id, code, discount_percent, max_redemptions, redeemed_count, is_active,
    to_char(expires_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS expires_at,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
"#;

/// Coupon codes are stored uppercase so redemption is case-insensitive.
fn normalize_code(code: &str) -> Option<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() || trimmed.len() > 64 {
        return None;
    }
    Some(trimmed.to_uppercase())
}

fn valid_discount(percent: i32) -> bool {
    (1..=100).contains(&percent)
}

#[utoipa::path(
    get,
    path = "/v1/regions/{region}/coupons",
    params(("region" = String, Path, description = "Region (india or usa)")),
    responses(
        (status = 200, description = "List coupons.", body = [CouponResponse]),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "regions"
)]
pub async fn list_coupons(
    Path(region): Path<String>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(status) = require_auth(&headers, pools.panel(), &auth_state).await {
        return status.into_response();
    }
    let region = match parse_region(&region) {
        Ok(region) => region,
        Err(response) => return response,
    };

    match fetch_coupons(pools.region(region)).await {
        Ok(coupons) => (StatusCode::OK, Json(coupons)).into_response(),
        Err(err) => {
            error!("Failed to list {} coupons: {err}", region.as_str());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/regions/{region}/coupons",
    request_body = CreateCouponRequest,
    params(("region" = String, Path, description = "Region (india or usa)")),
    responses(
        (status = 201, description = "Coupon created.", body = CouponResponse),
        (status = 400, description = "Invalid input.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 409, description = "A coupon with this code already exists.", body = String),
    ),
    tag = "regions"
)]
pub async fn create_coupon(
    Path(region): Path<String>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateCouponRequest>>,
) -> impl IntoResponse {
    if let Err(status) = require_auth(&headers, pools.panel(), &auth_state).await {
        return status.into_response();
    }
    let region = match parse_region(&region) {
        Ok(region) => region,
        Err(response) => return response,
    };

    let Some(Json(payload)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let Some(code) = normalize_code(&payload.code) else {
        return (StatusCode::BAD_REQUEST, "Invalid coupon code.").into_response();
    };
    if !valid_discount(payload.discount_percent) {
        return (
            StatusCode::BAD_REQUEST,
            "Discount must be between 1 and 100 percent.",
        )
            .into_response();
    }
    if payload.max_redemptions < 1 {
        return (StatusCode::BAD_REQUEST, "Max redemptions must be positive.").into_response();
    }

    match insert_coupon(pools.region(region), &code, &payload).await {
        Ok(coupon) => (StatusCode::CREATED, Json(coupon)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/regions/{region}/coupons/{id}",
    request_body = UpdateCouponRequest,
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("id" = String, Path, description = "Coupon id"),
    ),
    responses(
        (status = 200, description = "Coupon updated.", body = CouponResponse),
        (status = 400, description = "Invalid input.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Coupon not found."),
    ),
    tag = "regions"
)]
pub async fn patch_coupon(
    Path((region, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateCouponRequest>>,
) -> impl IntoResponse {
    if let Err(status) = require_auth(&headers, pools.panel(), &auth_state).await {
        return status.into_response();
    }
    let region = match parse_region(&region) {
        Ok(region) => region,
        Err(response) => return response,
    };

    let Some(Json(payload)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if let Some(percent) = payload.discount_percent {
        if !valid_discount(percent) {
            return (
                StatusCode::BAD_REQUEST,
                "Discount must be between 1 and 100 percent.",
            )
                .into_response();
        }
    }
    if let Some(max) = payload.max_redemptions {
        if max < 1 {
            return (StatusCode::BAD_REQUEST, "Max redemptions must be positive.").into_response();
        }
    }
    if payload.discount_percent.is_none()
        && payload.max_redemptions.is_none()
        && payload.expires_at.is_none()
        && payload.is_active.is_none()
    {
        return (StatusCode::BAD_REQUEST, "No updates provided.").into_response();
    }

    match update_coupon(pools.region(region), id, &payload).await {
        Ok(coupon) => (StatusCode::OK, Json(coupon)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/regions/{region}/coupons/{id}",
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("id" = String, Path, description = "Coupon id"),
    ),
    responses(
        (status = 204, description = "Coupon deleted."),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Coupon not found."),
    ),
    tag = "regions"
)]
pub async fn delete_coupon(
    Path((region, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(status) = require_auth(&headers, pools.panel(), &auth_state).await {
        return status.into_response();
    }
    let region = match parse_region(&region) {
        Ok(region) => region,
        Err(response) => return response,
    };

    match delete_coupon_row(pools.region(region), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn fetch_coupons(pool: &PgPool) -> anyhow::Result<Vec<CouponResponse>> {
    let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_response).collect())
}

async fn insert_coupon(
    pool: &PgPool,
    code: &str,
    payload: &CreateCouponRequest,
) -> Result<CouponResponse, StoreError> {
    let sql = format!(
        r"
        INSERT INTO coupons (code, discount_percent, max_redemptions, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING {COUPON_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(code)
        .bind(payload.discount_percent)
        .bind(payload.max_redemptions)
        .bind(payload.expires_at)
        .fetch_one(pool)
        .await;

    match row {
        Ok(row) => Ok(row_to_response(&row)),
        Err(err) if super::auth::is_unique_violation(&err) => Err(StoreError::Conflict(
            "A coupon with this code already exists.",
        )),
        Err(err) => Err(StoreError::Database(err)),
    }
}

async fn update_coupon(
    pool: &PgPool,
    id: Uuid,
    payload: &UpdateCouponRequest,
) -> Result<CouponResponse, StoreError> {
    let sql = format!(
        r"
        UPDATE coupons
        SET discount_percent = COALESCE($2, discount_percent),
            max_redemptions = COALESCE($3, max_redemptions),
            expires_at = COALESCE($4, expires_at),
            is_active = COALESCE($5, is_active)
        WHERE id = $1
        RETURNING {COUPON_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(payload.discount_percent)
        .bind(payload.max_redemptions)
        .bind(payload.expires_at)
        .bind(payload.is_active)
        .fetch_optional(pool)
        .await
        .map_err(StoreError::Database)?;

    row.as_ref().map(row_to_response).ok_or(StoreError::NotFound)
}

async fn delete_coupon_row(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM coupons WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(StoreError::Database)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

fn row_to_response(row: &sqlx::postgres::PgRow) -> CouponResponse {
    CouponResponse {
        id: row.get::<Uuid, _>("id").to_string(),
        code: row.get("code"),
        discount_percent: row.get("discount_percent"),
        max_redemptions: row.get("max_redemptions"),
        redeemed_count: row.get("redeemed_count"),
        expires_at: row.get("expires_at"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_code, valid_discount};

    #[test]
    fn normalize_code_uppercases_and_trims() {
        assert_eq!(normalize_code(" welcome10 "), Some("WELCOME10".to_string()));
    }

    #[test]
    fn normalize_code_rejects_empty_and_oversized() {
        assert_eq!(normalize_code("   "), None);
        assert_eq!(normalize_code(&"x".repeat(65)), None);
    }

    #[test]
    fn discount_bounds() {
        assert!(valid_discount(1));
        assert!(valid_discount(100));
        assert!(!valid_discount(0));
        assert!(!valid_discount(101));
        assert!(!valid_discount(-5));
    }
}
