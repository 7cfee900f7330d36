//! Billing aggregation across the two regional databases.
//!
//! The regional schemas are migrated independently, so payments are joined to
//! members and plans in-process: two plain queries per region, then hash-map
//! joins. A member's subscription is derived from their latest captured
//! payment plus the plan duration.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::regions::{Region, RegionPools};

use super::auth::principal::require_auth;
use super::auth::state::AuthState;
use super::{clamp_limit, clamp_offset, parse_region};

const PAYMENT_STATUS_CAPTURED: &str = "captured";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionInfo {
    /// `active`, `expired`, or `none`.
    pub status: String,
    pub plan_name: Option<String>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanRevenue {
    pub plan: String,
    pub revenue_minor: i64,
    pub payments: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillingSummary {
    pub region: String,
    pub members: i64,
    pub paying_members: i64,
    pub active_subscriptions: i64,
    pub expired_subscriptions: i64,
    pub revenue_minor: i64,
    pub revenue_by_plan: Vec<PlanRevenue>,
    pub payments_last_30_days: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub paid_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub panel_users: i64,
    pub india: BillingSummary,
    pub usa: BillingSummary,
}

#[derive(Debug, Deserialize)]
pub struct PaymentsQuery {
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One payment row as loaded for aggregation.
pub(crate) struct PaymentRow {
    pub(crate) user_id: Uuid,
    pub(crate) plan_id: Uuid,
    pub(crate) amount_minor: i64,
    pub(crate) status: String,
    pub(crate) paid_at: DateTime<Utc>,
}

/// Plan fields needed for joins and expiry arithmetic.
pub(crate) struct PlanInfo {
    pub(crate) name: String,
    pub(crate) duration_days: i32,
}

#[utoipa::path(
    get,
    path = "/v1/regions/{region}/billing/summary",
    params(("region" = String, Path, description = "Region (india or usa)")),
    responses(
        (status = 200, description = "Billing summary for the region.", body = BillingSummary),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "billing"
)]
pub async fn billing_summary(
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

    match region_summary(&pools, region).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => {
            error!("Failed to build {} billing summary: {err}", region.as_str());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/regions/{region}/payments",
    params(
        ("region" = String, Path, description = "Region (india or usa)"),
        ("user_id" = Option<String>, Query, description = "Filter by member id"),
        ("limit" = Option<i64>, Query, description = "Page size (max 100)"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
    ),
    responses(
        (status = 200, description = "Payment records, newest first.", body = [PaymentResponse]),
        (status = 400, description = "Unknown region.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "billing"
)]
pub async fn list_payments(
    Path(region): Path<String>,
    Query(query): Query<PaymentsQuery>,
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

    match fetch_payments(pools.region(region), &query).await {
        Ok(payments) => (StatusCode::OK, Json(payments)).into_response(),
        Err(err) => {
            error!("Failed to list {} payments: {err}", region.as_str());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/dashboard",
    responses(
        (status = 200, description = "Cross-region dashboard aggregates.", body = DashboardResponse),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "billing"
)]
pub async fn dashboard(
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(status) = require_auth(&headers, pools.panel(), &auth_state).await {
        return status.into_response();
    }

    let result = tokio::try_join!(
        panel_user_count(pools.panel()),
        region_summary(&pools, Region::India),
        region_summary(&pools, Region::Usa),
    );

    match result {
        Ok((panel_users, india, usa)) => {
            let response = DashboardResponse {
                panel_users,
                india,
                usa,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            // A failing region is surfaced, not silently dropped.
            error!("Failed to build dashboard: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Derive a member's subscription from their latest captured payment.
pub(crate) fn subscription_info(
    latest: Option<(DateTime<Utc>, i32, String)>,
    now: DateTime<Utc>,
) -> SubscriptionInfo {
    match latest {
        Some((paid_at, duration_days, plan_name)) => {
            let expires_at = paid_at + Duration::days(i64::from(duration_days));
            let status = if expires_at > now { "active" } else { "expired" };
            SubscriptionInfo {
                status: status.to_string(),
                plan_name: Some(plan_name),
                expires_at: Some(expires_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            }
        }
        None => SubscriptionInfo {
            status: "none".to_string(),
            plan_name: None,
            expires_at: None,
        },
    }
}

async fn region_summary(pools: &RegionPools, region: Region) -> anyhow::Result<BillingSummary> {
    let pool = pools.region(region);
    let (members, payments, plans) =
        tokio::try_join!(member_count(pool), payment_rows(pool), plan_rows(pool))?;
    Ok(summarize(region, members, &payments, &plans, Utc::now()))
}

/// Pure aggregation over pre-fetched rows; the only join key shared by the
/// two schemas is the uuid, so everything is hash-map based.
pub(crate) fn summarize(
    region: Region,
    members: i64,
    payments: &[PaymentRow],
    plans: &HashMap<Uuid, PlanInfo>,
    now: DateTime<Utc>,
) -> BillingSummary {
    let mut latest_by_member: HashMap<Uuid, &PaymentRow> = HashMap::new();
    let mut revenue_by_plan: HashMap<&str, (i64, i64)> = HashMap::new();
    let mut revenue_minor = 0i64;
    let mut recent_payments = 0i64;
    let cutoff = now - Duration::days(30);

    for payment in payments {
        if payment.status != PAYMENT_STATUS_CAPTURED {
            continue;
        }

        revenue_minor = revenue_minor.saturating_add(payment.amount_minor);
        if payment.paid_at > cutoff {
            recent_payments += 1;
        }

        let plan_name = plans
            .get(&payment.plan_id)
            .map_or("unknown", |plan| plan.name.as_str());
        let entry = revenue_by_plan.entry(plan_name).or_insert((0, 0));
        entry.0 = entry.0.saturating_add(payment.amount_minor);
        entry.1 += 1;

        latest_by_member
            .entry(payment.user_id)
            .and_modify(|current| {
                if payment.paid_at > current.paid_at {
                    *current = payment;
                }
            })
            .or_insert(payment);
    }

    let paying_members = i64::try_from(latest_by_member.len()).unwrap_or(i64::MAX);
    let mut active_subscriptions = 0i64;
    for payment in latest_by_member.values() {
        // A captured payment against a since-deleted plan counts as expired.
        let expired = plans.get(&payment.plan_id).map_or(true, |plan| {
            payment.paid_at + Duration::days(i64::from(plan.duration_days)) <= now
        });
        if !expired {
            active_subscriptions += 1;
        }
    }

    let mut revenue: Vec<PlanRevenue> = revenue_by_plan
        .into_iter()
        .map(|(plan, (revenue_minor, payments))| PlanRevenue {
            plan: plan.to_string(),
            revenue_minor,
            payments,
        })
        .collect();
    revenue.sort_by(|a, b| b.revenue_minor.cmp(&a.revenue_minor));

    BillingSummary {
        region: region.as_str().to_string(),
        members,
        paying_members,
        active_subscriptions,
        expired_subscriptions: paying_members - active_subscriptions,
        revenue_minor,
        revenue_by_plan: revenue,
        payments_last_30_days: recent_payments,
    }
}

async fn member_count(pool: &PgPool) -> anyhow::Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM users")
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

async fn panel_user_count(pool: &PgPool) -> anyhow::Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM panel_users")
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

async fn payment_rows(pool: &PgPool) -> anyhow::Result<Vec<PaymentRow>> {
    let rows = sqlx::query(
        "SELECT user_id, plan_id, amount_minor, status, paid_at FROM payment_records",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PaymentRow {
            user_id: row.get("user_id"),
            plan_id: row.get("plan_id"),
            amount_minor: row.get("amount_minor"),
            status: row.get("status"),
            paid_at: row.get("paid_at"),
        })
        .collect())
}

async fn plan_rows(pool: &PgPool) -> anyhow::Result<HashMap<Uuid, PlanInfo>> {
    let rows = sqlx::query("SELECT id, name, duration_days FROM plans")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.get("id"),
                PlanInfo {
                    name: row.get("name"),
                    duration_days: row.get("duration_days"),
                },
            )
        })
        .collect())
}

async fn fetch_payments(
    pool: &PgPool,
    query: &PaymentsQuery,
) -> anyhow::Result<Vec<PaymentResponse>> {
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);

    let rows = match query.user_id {
        Some(user_id) => {
            sqlx::query(
                r#"
                SELECT id, user_id, plan_id, amount_minor, currency, status,
                    to_char(paid_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS paid_at
                FROM payment_records
                WHERE user_id = $1
                ORDER BY paid_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT id, user_id, plan_id, amount_minor, currency, status,
                    to_char(paid_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS paid_at
                FROM payment_records
                ORDER BY paid_at DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows
        .into_iter()
        .map(|row| PaymentResponse {
            id: row.get::<Uuid, _>("id").to_string(),
            user_id: row.get::<Uuid, _>("user_id").to_string(),
            plan_id: row.get::<Uuid, _>("plan_id").to_string(),
            amount_minor: row.get("amount_minor"),
            currency: row.get("currency"),
            status: row.get("status"),
            paid_at: row.get("paid_at"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan(plans: &mut HashMap<Uuid, PlanInfo>, name: &str, duration_days: i32) -> Uuid {
        let id = Uuid::new_v4();
        plans.insert(
            id,
            PlanInfo {
                name: name.to_string(),
                duration_days,
            },
        );
        id
    }

    fn payment(
        user_id: Uuid,
        plan_id: Uuid,
        amount_minor: i64,
        status: &str,
        paid_at: DateTime<Utc>,
    ) -> PaymentRow {
        PaymentRow {
            user_id,
            plan_id,
            amount_minor,
            status: status.to_string(),
            paid_at,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn subscription_none_without_payment() {
        let info = subscription_info(None, now());
        assert_eq!(info.status, "none");
        assert!(info.plan_name.is_none());
        assert!(info.expires_at.is_none());
    }

    #[test]
    fn subscription_active_within_duration() {
        let paid_at = now() - Duration::days(10);
        let info = subscription_info(Some((paid_at, 30, "monthly".to_string())), now());
        assert_eq!(info.status, "active");
        assert_eq!(info.plan_name.as_deref(), Some("monthly"));
        assert_eq!(info.expires_at.as_deref(), Some("2026-06-21T00:00:00Z"));
    }

    #[test]
    fn subscription_expired_after_duration() {
        let paid_at = now() - Duration::days(45);
        let info = subscription_info(Some((paid_at, 30, "monthly".to_string())), now());
        assert_eq!(info.status, "expired");
    }

    #[test]
    fn summarize_counts_only_captured_payments() {
        let mut plans = HashMap::new();
        let monthly = plan(&mut plans, "monthly", 30);
        let user = Uuid::new_v4();

        let payments = vec![
            payment(user, monthly, 500, "captured", now() - Duration::days(5)),
            payment(user, monthly, 500, "failed", now() - Duration::days(4)),
            payment(user, monthly, 500, "refunded", now() - Duration::days(3)),
        ];

        let summary = summarize(Region::India, 10, &payments, &plans, now());
        assert_eq!(summary.region, "india");
        assert_eq!(summary.members, 10);
        assert_eq!(summary.paying_members, 1);
        assert_eq!(summary.revenue_minor, 500);
        assert_eq!(summary.payments_last_30_days, 1);
    }

    #[test]
    fn summarize_uses_latest_payment_per_member() {
        let mut plans = HashMap::new();
        let monthly = plan(&mut plans, "monthly", 30);
        let user = Uuid::new_v4();

        // Older payment would still be active; the newer one has lapsed.
        let payments = vec![
            payment(user, monthly, 500, "captured", now() - Duration::days(100)),
            payment(user, monthly, 500, "captured", now() - Duration::days(60)),
        ];

        let summary = summarize(Region::Usa, 1, &payments, &plans, now());
        assert_eq!(summary.paying_members, 1);
        assert_eq!(summary.active_subscriptions, 0);
        assert_eq!(summary.expired_subscriptions, 1);
    }

    #[test]
    fn summarize_splits_revenue_by_plan() {
        let mut plans = HashMap::new();
        let monthly = plan(&mut plans, "monthly", 30);
        let yearly = plan(&mut plans, "yearly", 365);

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let payments = vec![
            payment(alice, monthly, 500, "captured", now() - Duration::days(2)),
            payment(bob, yearly, 4800, "captured", now() - Duration::days(2)),
            payment(alice, monthly, 500, "captured", now() - Duration::days(40)),
        ];

        let summary = summarize(Region::India, 5, &payments, &plans, now());
        assert_eq!(summary.revenue_minor, 5800);
        assert_eq!(summary.active_subscriptions, 2);
        assert_eq!(summary.revenue_by_plan.len(), 2);
        // Sorted by revenue, yearly first.
        assert_eq!(summary.revenue_by_plan[0].plan, "yearly");
        assert_eq!(summary.revenue_by_plan[0].revenue_minor, 4800);
        assert_eq!(summary.revenue_by_plan[1].plan, "monthly");
        assert_eq!(summary.revenue_by_plan[1].payments, 2);
    }

    #[test]
    fn summarize_treats_missing_plan_as_expired() {
        let plans = HashMap::new();
        let user = Uuid::new_v4();
        let payments = vec![payment(
            user,
            Uuid::new_v4(),
            500,
            "captured",
            now() - Duration::days(1),
        )];

        let summary = summarize(Region::Usa, 1, &payments, &plans, now());
        assert_eq!(summary.paying_members, 1);
        assert_eq!(summary.active_subscriptions, 0);
        assert_eq!(summary.revenue_by_plan[0].plan, "unknown");
    }
}
