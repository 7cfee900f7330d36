//! Regional member (patient account) dashboards.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::regions::RegionPools;

use super::auth::principal::{require_auth, require_superadmin};
use super::auth::state::AuthState;
use super::billing::{subscription_info, SubscriptionInfo};
use super::{clamp_limit, clamp_offset, parse_region, StoreError};

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberSummary {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberDetail {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub status: String,
    pub created_at: String,
    pub subscription: SubscriptionInfo,
}

#[derive(Debug, Deserialize)]
pub struct MembersQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const MEMBER_COLUMNS: &str = r#"
    id, email, full_name, status,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
"#;

#[utoipa::path(
    get,
    path = "/v1/regions/{region}/members",
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("search" = Option<String>, Query, description = "Substring match on email or name"),
        ("limit" = Option<i64>, Query, description = "Page size (max 100)"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
    ),
    responses(
        (status = 200, description = "List members.", body = [MemberSummary]),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "regions"
)]
pub async fn list_members(
    Path(region): Path<String>,
    Query(query): Query<MembersQuery>,
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

    match fetch_members(pools.region(region), &query).await {
        Ok(members) => (StatusCode::OK, Json(members)).into_response(),
        Err(err) => {
            error!("Failed to list {} members: {err}", region.as_str());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/regions/{region}/members/{id}",
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("id" = String, Path, description = "Member id"),
    ),
    responses(
        (status = 200, description = "Member detail with derived subscription state.", body = MemberDetail),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Member not found."),
    ),
    tag = "regions"
)]
pub async fn get_member(
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

    match fetch_member_detail(pools.region(region), id).await {
        Ok(Some(member)) => (StatusCode::OK, Json(member)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to get {} member: {err}", region.as_str());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/regions/{region}/members/{id}",
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("id" = String, Path, description = "Member id"),
    ),
    responses(
        (status = 204, description = "Member deleted."),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Superadmin role required."),
        (status = 404, description = "Member not found."),
    ),
    tag = "regions"
)]
pub async fn delete_member(
    Path((region, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, pools.panel(), &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = require_superadmin(&principal) {
        return status.into_response();
    }
    let region = match parse_region(&region) {
        Ok(region) => region,
        Err(response) => return response,
    };

    match delete_member_row(pools.region(region), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn fetch_members(
    pool: &PgPool,
    query: &MembersQuery,
) -> anyhow::Result<Vec<MemberSummary>> {
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let rows = match search {
        Some(search) => {
            let pattern = format!("%{search}%");
            let sql = format!(
                r"
                SELECT {MEMBER_COLUMNS} FROM users
                WHERE email ILIKE $1 OR full_name ILIKE $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "
            );
            sqlx::query(&sql)
                .bind(pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!(
                r"
                SELECT {MEMBER_COLUMNS} FROM users
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                "
            );
            sqlx::query(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows
        .into_iter()
        .map(|row| MemberSummary {
            id: row.get::<Uuid, _>("id").to_string(),
            email: row.get("email"),
            full_name: row.get("full_name"),
            status: row.get("status"),
            created_at: row.get("created_at"),
        })
        .collect())
}

async fn fetch_member_detail(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<MemberDetail>> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM users WHERE id = $1");
    let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(pool).await? else {
        return Ok(None);
    };

    // Latest captured payment and its plan live in the same regional
    // database, so this join stays in SQL.
    let latest = sqlx::query(
        r"
        SELECT p.paid_at, pl.duration_days, pl.name
        FROM payment_records p
        JOIN plans pl ON pl.id = p.plan_id
        WHERE p.user_id = $1 AND p.status = 'captured'
        ORDER BY p.paid_at DESC
        LIMIT 1
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(|row| {
        (
            row.get("paid_at"),
            row.get("duration_days"),
            row.get("name"),
        )
    });

    Ok(Some(MemberDetail {
        id: row.get::<Uuid, _>("id").to_string(),
        email: row.get("email"),
        full_name: row.get("full_name"),
        status: row.get("status"),
        created_at: row.get("created_at"),
        subscription: subscription_info(latest, Utc::now()),
    }))
}

async fn delete_member_row(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(StoreError::Database)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}
