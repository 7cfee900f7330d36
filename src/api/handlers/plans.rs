//! Regional subscription plan management.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
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
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub price_minor: i64,
    pub currency: String,
    pub duration_days: i32,
    pub features: Value,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreatePlanRequest {
    pub name: String,
    pub price_minor: i64,
    pub currency: String,
    pub duration_days: i32,
    pub features: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub price_minor: Option<i64>,
    pub duration_days: Option<i32>,
    pub features: Option<Value>,
    pub is_active: Option<bool>,
}

const PLAN_COLUMNS: &str = r#"
    id, name, price_minor, currency, duration_days, features, is_active,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
"#;

/// ISO-4217 style currency code, uppercased.
fn normalize_currency(currency: &str) -> Option<String> {
    let trimmed = currency.trim();
    if trimmed.len() != 3 || !trimmed.bytes().all(|byte| byte.is_ascii_alphabetic()) {
        return None;
    }
    Some(trimmed.to_uppercase())
}

#[utoipa::path(
    get,
    path = "/v1/regions/{region}/plans",
    params(("region" = String, Path, description = "Region (india or usa)")),
    responses(
        (status = 200, description = "List plans.", body = [PlanResponse]),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "regions"
)]
pub async fn list_plans(
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

    match fetch_plans(pools.region(region)).await {
        Ok(plans) => (StatusCode::OK, Json(plans)).into_response(),
        Err(err) => {
            error!("Failed to list {} plans: {err}", region.as_str());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/regions/{region}/plans",
    request_body = CreatePlanRequest,
    params(("region" = String, Path, description = "Region (india or usa)")),
    responses(
        (status = 201, description = "Plan created.", body = PlanResponse),
        (status = 400, description = "Invalid input.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 409, description = "A plan with this name already exists.", body = String),
    ),
    tag = "regions"
)]
pub async fn create_plan(
    Path(region): Path<String>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreatePlanRequest>>,
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

    let name = payload.name.trim();
    if name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Plan name is required.").into_response();
    }
    if payload.price_minor <= 0 {
        return (StatusCode::BAD_REQUEST, "Price must be positive.").into_response();
    }
    if payload.duration_days <= 0 {
        return (StatusCode::BAD_REQUEST, "Duration must be positive.").into_response();
    }
    let Some(currency) = normalize_currency(&payload.currency) else {
        return (StatusCode::BAD_REQUEST, "Invalid currency code.").into_response();
    };

    match insert_plan(pools.region(region), name, &currency, &payload).await {
        Ok(plan) => (StatusCode::CREATED, Json(plan)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/regions/{region}/plans/{id}",
    request_body = UpdatePlanRequest,
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("id" = String, Path, description = "Plan id"),
    ),
    responses(
        (status = 200, description = "Plan updated.", body = PlanResponse),
        (status = 400, description = "Invalid input.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Plan not found."),
    ),
    tag = "regions"
)]
pub async fn patch_plan(
    Path((region, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdatePlanRequest>>,
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

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if payload.name.is_some() && name.is_none() {
        return (StatusCode::BAD_REQUEST, "Plan name cannot be empty.").into_response();
    }
    if let Some(price) = payload.price_minor {
        if price <= 0 {
            return (StatusCode::BAD_REQUEST, "Price must be positive.").into_response();
        }
    }
    if let Some(duration) = payload.duration_days {
        if duration <= 0 {
            return (StatusCode::BAD_REQUEST, "Duration must be positive.").into_response();
        }
    }
    if name.is_none()
        && payload.price_minor.is_none()
        && payload.duration_days.is_none()
        && payload.features.is_none()
        && payload.is_active.is_none()
    {
        return (StatusCode::BAD_REQUEST, "No updates provided.").into_response();
    }

    match update_plan(pools.region(region), id, name, &payload).await {
        Ok(plan) => (StatusCode::OK, Json(plan)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/regions/{region}/plans/{id}",
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("id" = String, Path, description = "Plan id"),
    ),
    responses(
        (status = 204, description = "Plan deleted."),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Plan not found."),
        (status = 409, description = "Plan is referenced by payment records.", body = String),
    ),
    tag = "regions"
)]
pub async fn delete_plan(
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

    match delete_plan_row(pools.region(region), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn fetch_plans(pool: &PgPool) -> anyhow::Result<Vec<PlanResponse>> {
    let sql = format!("SELECT {PLAN_COLUMNS} FROM plans ORDER BY price_minor ASC");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_response).collect())
}

async fn insert_plan(
    pool: &PgPool,
    name: &str,
    currency: &str,
    payload: &CreatePlanRequest,
) -> Result<PlanResponse, StoreError> {
    let features = payload.features.clone().unwrap_or_else(|| Value::Array(vec![]));
    let sql = format!(
        r"
        INSERT INTO plans (name, price_minor, currency, duration_days, features)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {PLAN_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(name)
        .bind(payload.price_minor)
        .bind(currency)
        .bind(payload.duration_days)
        .bind(features)
        .fetch_one(pool)
        .await;

    match row {
        Ok(row) => Ok(row_to_response(&row)),
        Err(err) if super::auth::is_unique_violation(&err) => {
            Err(StoreError::Conflict("A plan with this name already exists."))
        }
        Err(err) => Err(StoreError::Database(err)),
    }
}

async fn update_plan(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    payload: &UpdatePlanRequest,
) -> Result<PlanResponse, StoreError> {
    let sql = format!(
        r"
        UPDATE plans
        SET name = COALESCE($2, name),
            price_minor = COALESCE($3, price_minor),
            duration_days = COALESCE($4, duration_days),
            features = COALESCE($5, features),
            is_active = COALESCE($6, is_active)
        WHERE id = $1
        RETURNING {PLAN_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(name)
        .bind(payload.price_minor)
        .bind(payload.duration_days)
        .bind(payload.features.clone())
        .bind(payload.is_active)
        .fetch_optional(pool)
        .await;

    match row {
        Ok(Some(row)) => Ok(row_to_response(&row)),
        Ok(None) => Err(StoreError::NotFound),
        Err(err) if super::auth::is_unique_violation(&err) => {
            Err(StoreError::Conflict("A plan with this name already exists."))
        }
        Err(err) => Err(StoreError::Database(err)),
    }
}

async fn delete_plan_row(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM plans WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await;

    match result {
        Ok(result) if result.rows_affected() == 0 => Err(StoreError::NotFound),
        Ok(_) => Ok(()),
        // Payment history must stay attributable to a plan.
        Err(err) if super::auth::is_foreign_key_violation(&err) => Err(StoreError::Conflict(
            "Plan is referenced by payment records.",
        )),
        Err(err) => Err(StoreError::Database(err)),
    }
}

fn row_to_response(row: &sqlx::postgres::PgRow) -> PlanResponse {
    PlanResponse {
        id: row.get::<Uuid, _>("id").to_string(),
        name: row.get("name"),
        price_minor: row.get("price_minor"),
        currency: row.get("currency"),
        duration_days: row.get("duration_days"),
        features: row.get("features"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_currency;

    #[test]
    fn normalize_currency_uppercases_three_letters() {
        assert_eq!(normalize_currency("inr"), Some("INR".to_string()));
        assert_eq!(normalize_currency(" usd "), Some("USD".to_string()));
    }

    #[test]
    fn normalize_currency_rejects_bad_shapes() {
        assert_eq!(normalize_currency("rupees"), None);
        assert_eq!(normalize_currency("u$"), None);
        assert_eq!(normalize_currency(""), None);
    }
}
