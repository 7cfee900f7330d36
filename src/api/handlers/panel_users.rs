//! Panel user management endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via session cookie.
//! 2) Enforce the superadmin role for every mutation.
//! 3) Perform reads or allow-listed updates against the panel database.

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

use super::auth::principal::{require_auth, require_superadmin, PanelRole, Principal};
use super::auth::state::AuthState;
use super::auth::{normalize_email, valid_email};
use super::StoreError;

#[derive(Debug, Serialize, ToSchema)]
pub struct PanelUserResponse {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreatePanelUserRequest {
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdatePanelUserRequest {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

const PANEL_USER_COLUMNS: &str = r#"
    id, email, display_name, role, status,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
"#;

#[utoipa::path(
    get,
    path = "/v1/panel-users",
    responses(
        (status = 200, description = "List panel users.", body = [PanelUserResponse]),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "panel"
)]
pub async fn list_panel_users(
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(status) = require_auth(&headers, pools.panel(), &auth_state).await {
        return status.into_response();
    }

    match fetch_panel_users(pools.panel()).await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(err) => {
            error!("Failed to list panel users: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/panel-users",
    request_body = CreatePanelUserRequest,
    responses(
        (status = 201, description = "Panel user created.", body = PanelUserResponse),
        (status = 400, description = "Invalid input.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Superadmin role required."),
        (status = 409, description = "A panel user with this email already exists.", body = String),
    ),
    tag = "panel"
)]
pub async fn create_panel_user(
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreatePanelUserRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, pools.panel(), &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = require_superadmin(&principal) {
        return status.into_response();
    }

    let Some(Json(payload)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email.").into_response();
    }
    let Some(role) = PanelRole::parse(&payload.role) else {
        return (StatusCode::BAD_REQUEST, "Invalid role.").into_response();
    };
    let display_name = payload
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match insert_panel_user(pools.panel(), &email, display_name, role).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/panel-users/{id}",
    request_body = UpdatePanelUserRequest,
    params(("id" = String, Path, description = "Panel user id")),
    responses(
        (status = 200, description = "Panel user updated.", body = PanelUserResponse),
        (status = 400, description = "Invalid input.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Superadmin role required."),
        (status = 404, description = "Panel user not found."),
    ),
    tag = "panel"
)]
pub async fn patch_panel_user(
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdatePanelUserRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, pools.panel(), &auth_state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = require_superadmin(&principal) {
        return status.into_response();
    }

    let Some(Json(payload)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let update = match validate_update(&principal, id, &payload) {
        Ok(update) => update,
        Err(response) => return response,
    };

    match update_panel_user(pools.panel(), id, &update).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/panel-users/{id}",
    params(("id" = String, Path, description = "Panel user id")),
    responses(
        (status = 204, description = "Panel user deleted."),
        (status = 400, description = "Cannot delete yourself.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Superadmin role required."),
        (status = 404, description = "Panel user not found."),
    ),
    tag = "panel"
)]
pub async fn delete_panel_user(
    Path(id): Path<Uuid>,
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

    if principal.user_id == id {
        return (StatusCode::BAD_REQUEST, "Cannot delete yourself.").into_response();
    }

    match delete_panel_user_row(pools.panel(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

/// Validated field set for a panel-user update.
struct PanelUserUpdate {
    display_name: Option<String>,
    role: Option<PanelRole>,
    status: Option<String>,
}

fn validate_update(
    principal: &Principal,
    target: Uuid,
    payload: &UpdatePanelUserRequest,
) -> Result<PanelUserUpdate, axum::response::Response> {
    let role = match payload.role.as_deref() {
        Some(value) => match PanelRole::parse(value) {
            Some(role) => Some(role),
            None => return Err((StatusCode::BAD_REQUEST, "Invalid role.").into_response()),
        },
        None => None,
    };

    let status = match payload.status.as_deref() {
        Some("active") => Some("active".to_string()),
        Some("disabled") => Some("disabled".to_string()),
        Some(_) => return Err((StatusCode::BAD_REQUEST, "Invalid status.").into_response()),
        None => None,
    };

    // Locking yourself out of the panel is always a mistake.
    if principal.user_id == target && status.as_deref() == Some("disabled") {
        return Err((StatusCode::BAD_REQUEST, "Cannot disable yourself.").into_response());
    }

    let display_name = payload
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    if display_name.is_none() && role.is_none() && status.is_none() {
        return Err((StatusCode::BAD_REQUEST, "No updates provided.").into_response());
    }

    Ok(PanelUserUpdate {
        display_name,
        role,
        status,
    })
}

async fn fetch_panel_users(pool: &PgPool) -> anyhow::Result<Vec<PanelUserResponse>> {
    let query = format!("SELECT {PANEL_USER_COLUMNS} FROM panel_users ORDER BY created_at ASC");
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_response).collect())
}

async fn insert_panel_user(
    pool: &PgPool,
    email: &str,
    display_name: Option<&str>,
    role: PanelRole,
) -> Result<PanelUserResponse, StoreError> {
    let query = format!(
        r"
        INSERT INTO panel_users (email, display_name, role)
        VALUES ($1, $2, $3)
        RETURNING {PANEL_USER_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(display_name)
        .bind(role.as_str())
        .fetch_one(pool)
        .await;

    match row {
        Ok(row) => Ok(row_to_response(&row)),
        Err(err) if super::auth::is_unique_violation(&err) => Err(StoreError::Conflict(
            "A panel user with this email already exists.",
        )),
        Err(err) => Err(StoreError::Database(err)),
    }
}

async fn update_panel_user(
    pool: &PgPool,
    id: Uuid,
    update: &PanelUserUpdate,
) -> Result<PanelUserResponse, StoreError> {
    let query = format!(
        r"
        UPDATE panel_users
        SET display_name = COALESCE($2, display_name),
            role = COALESCE($3, role),
            status = COALESCE($4, status)
        WHERE id = $1
        RETURNING {PANEL_USER_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(update.display_name.as_deref())
        .bind(update.role.map(PanelRole::as_str))
        .bind(update.status.as_deref())
        .fetch_optional(pool)
        .await
        .map_err(StoreError::Database)?;

    row.as_ref().map(row_to_response).ok_or(StoreError::NotFound)
}

async fn delete_panel_user_row(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM panel_users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(StoreError::Database)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

fn row_to_response(row: &sqlx::postgres::PgRow) -> PanelUserResponse {
    PanelUserResponse {
        id: row.get::<Uuid, _>("id").to_string(),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::auth::principal::{PanelRole, Principal};
    use super::{validate_update, UpdatePanelUserRequest};
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn superadmin() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "ops@mdrecords.dev".to_string(),
            display_name: None,
            role: PanelRole::Superadmin,
        }
    }

    #[test]
    fn validate_update_rejects_empty_patch() {
        let principal = superadmin();
        let result = validate_update(
            &principal,
            Uuid::new_v4(),
            &UpdatePanelUserRequest {
                display_name: None,
                role: None,
                status: None,
            },
        );
        let response = result.err().expect("expected error response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn validate_update_rejects_unknown_role_and_status() {
        let principal = superadmin();
        let bad_role = validate_update(
            &principal,
            Uuid::new_v4(),
            &UpdatePanelUserRequest {
                display_name: None,
                role: Some("root".to_string()),
                status: None,
            },
        );
        assert!(bad_role.is_err());

        let bad_status = validate_update(
            &principal,
            Uuid::new_v4(),
            &UpdatePanelUserRequest {
                display_name: None,
                role: None,
                status: Some("frozen".to_string()),
            },
        );
        assert!(bad_status.is_err());
    }

    #[test]
    fn validate_update_blocks_self_disable() {
        let principal = superadmin();
        let result = validate_update(
            &principal,
            principal.user_id,
            &UpdatePanelUserRequest {
                display_name: None,
                role: None,
                status: Some("disabled".to_string()),
            },
        );
        let response = result.err().expect("expected error response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn validate_update_accepts_partial_patch() {
        let principal = superadmin();
        let result = validate_update(
            &principal,
            Uuid::new_v4(),
            &UpdatePanelUserRequest {
                display_name: Some("  Dr. Rao  ".to_string()),
                role: Some("admin".to_string()),
                status: None,
            },
        );
        let update = result.ok().expect("expected valid update");
        assert_eq!(update.display_name.as_deref(), Some("Dr. Rao"));
        assert_eq!(update.role, Some(PanelRole::Admin));
        assert!(update.status.is_none());
    }
}
