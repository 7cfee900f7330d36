//! Regional referral code management.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
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
pub struct ReferralResponse {
    pub id: String,
    pub code: String,
    pub owner_user_id: Option<String>,
    pub reward_minor: i64,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateReferralRequest {
    pub code: String,
    pub owner_user_id: Option<Uuid>,
    pub reward_minor: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateReferralRequest {
    pub reward_minor: Option<i64>,
    pub is_active: Option<bool>,
}

const REFERRAL_COLUMNS: &str = r#"
    id, code, owner_user_id, reward_minor, is_active,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
"#;

fn normalize_code(code: &str) -> Option<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() || trimmed.len() > 32 {
        return None;
    }
    Some(trimmed.to_uppercase())
}

#[utoipa::path(
    get,
    path = "/v1/regions/{region}/referrals",
    params(("region" = String, Path, description = "Region (india or usa)")),
    responses(
        (status = 200, description = "List referral codes.", body = [ReferralResponse]),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "regions"
)]
pub async fn list_referrals(
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

    match fetch_referrals(pools.region(region)).await {
        Ok(referrals) => (StatusCode::OK, Json(referrals)).into_response(),
        Err(err) => {
            error!("Failed to list {} referrals: {err}", region.as_str());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/regions/{region}/referrals",
    request_body = CreateReferralRequest,
    params(("region" = String, Path, description = "Region (india or usa)")),
    responses(
        (status = 201, description = "Referral code created.", body = ReferralResponse),
        (status = 400, description = "Invalid input.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 409, description = "A referral with this code already exists.", body = String),
    ),
    tag = "regions"
)]
pub async fn create_referral(
    Path(region): Path<String>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateReferralRequest>>,
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
        return (StatusCode::BAD_REQUEST, "Invalid referral code.").into_response();
    };
    if payload.reward_minor < 0 {
        return (StatusCode::BAD_REQUEST, "Reward cannot be negative.").into_response();
    }

    match insert_referral(pools.region(region), &code, &payload).await {
        Ok(referral) => (StatusCode::CREATED, Json(referral)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/regions/{region}/referrals/{id}",
    request_body = UpdateReferralRequest,
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("id" = String, Path, description = "Referral id"),
    ),
    responses(
        (status = 200, description = "Referral updated.", body = ReferralResponse),
        (status = 400, description = "Invalid input.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Referral not found."),
    ),
    tag = "regions"
)]
pub async fn patch_referral(
    Path((region, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateReferralRequest>>,
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

    if let Some(reward) = payload.reward_minor {
        if reward < 0 {
            return (StatusCode::BAD_REQUEST, "Reward cannot be negative.").into_response();
        }
    }
    if payload.reward_minor.is_none() && payload.is_active.is_none() {
        return (StatusCode::BAD_REQUEST, "No updates provided.").into_response();
    }

    match update_referral(pools.region(region), id, &payload).await {
        Ok(referral) => (StatusCode::OK, Json(referral)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/regions/{region}/referrals/{id}",
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("id" = String, Path, description = "Referral id"),
    ),
    responses(
        (status = 204, description = "Referral deleted."),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Referral not found."),
    ),
    tag = "regions"
)]
pub async fn delete_referral(
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

    match delete_referral_row(pools.region(region), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn fetch_referrals(pool: &PgPool) -> anyhow::Result<Vec<ReferralResponse>> {
    let sql = format!("SELECT {REFERRAL_COLUMNS} FROM referral_codes ORDER BY created_at DESC");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_response).collect())
}

async fn insert_referral(
    pool: &PgPool,
    code: &str,
    payload: &CreateReferralRequest,
) -> Result<ReferralResponse, StoreError> {
    let sql = format!(
        r"
        INSERT INTO referral_codes (code, owner_user_id, reward_minor)
        VALUES ($1, $2, $3)
        RETURNING {REFERRAL_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(code)
        .bind(payload.owner_user_id)
        .bind(payload.reward_minor)
        .fetch_one(pool)
        .await;

    match row {
        Ok(row) => Ok(row_to_response(&row)),
        Err(err) if super::auth::is_unique_violation(&err) => Err(StoreError::Conflict(
            "A referral with this code already exists.",
        )),
        Err(err) if super::auth::is_foreign_key_violation(&err) => {
            Err(StoreError::BadRequest("Owner user does not exist."))
        }
        Err(err) => Err(StoreError::Database(err)),
    }
}

async fn update_referral(
    pool: &PgPool,
    id: Uuid,
    payload: &UpdateReferralRequest,
) -> Result<ReferralResponse, StoreError> {
    let sql = format!(
        r"
        UPDATE referral_codes
        SET reward_minor = COALESCE($2, reward_minor),
            is_active = COALESCE($3, is_active)
        WHERE id = $1
        RETURNING {REFERRAL_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(payload.reward_minor)
        .bind(payload.is_active)
        .fetch_optional(pool)
        .await
        .map_err(StoreError::Database)?;

    row.as_ref().map(row_to_response).ok_or(StoreError::NotFound)
}

async fn delete_referral_row(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM referral_codes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(StoreError::Database)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

fn row_to_response(row: &sqlx::postgres::PgRow) -> ReferralResponse {
    ReferralResponse {
        id: row.get::<Uuid, _>("id").to_string(),
        code: row.get("code"),
        owner_user_id: row
            .get::<Option<Uuid>, _>("owner_user_id")
            .map(|id| id.to_string()),
        reward_minor: row.get("reward_minor"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_code;

    #[test]
    fn normalize_code_uppercases() {
        assert_eq!(normalize_code("friend-of-rao"), Some("FRIEND-OF-RAO".to_string()));
    }

    #[test]
    fn normalize_code_rejects_empty_and_oversized() {
        assert_eq!(normalize_code(""), None);
        assert_eq!(normalize_code(&"r".repeat(33)), None);
    }
}
