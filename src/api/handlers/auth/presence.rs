//! Process-local "online admins" presence map.
//!
//! `require_auth` touches this map on every authenticated request; entries
//! older than the TTL are pruned on access. Best effort only: counters are
//! per instance and there is no cross-instance consistency.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::regions::RegionPools;

use super::principal::require_auth;
use super::state::AuthState;
use super::types::OnlineAdmin;

struct PresenceEntry {
    email: String,
    last_seen: Instant,
}

pub struct PresenceMap {
    ttl: Duration,
    inner: Mutex<HashMap<Uuid, PresenceEntry>>,
}

impl PresenceMap {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Record activity for an admin, refreshing their last-seen timestamp.
    pub async fn touch(&self, user_id: Uuid, email: &str) {
        let mut entries = self.inner.lock().await;
        entries.retain(|_, entry| entry.last_seen.elapsed() < self.ttl);
        entries.insert(
            user_id,
            PresenceEntry {
                email: email.to_string(),
                last_seen: Instant::now(),
            },
        );
    }

    /// Admins seen within the TTL, most recently active first.
    pub async fn online(&self) -> Vec<OnlineAdmin> {
        let mut entries = self.inner.lock().await;
        entries.retain(|_, entry| entry.last_seen.elapsed() < self.ttl);

        let mut online: Vec<OnlineAdmin> = entries
            .iter()
            .map(|(user_id, entry)| OnlineAdmin {
                user_id: user_id.to_string(),
                email: entry.email.clone(),
                idle_seconds: entry.last_seen.elapsed().as_secs(),
            })
            .collect();
        online.sort_by_key(|admin| admin.idle_seconds);
        online
    }
}

#[utoipa::path(
    get,
    path = "/v1/admins/online",
    responses(
        (status = 200, description = "Admins active within the presence window.", body = [OnlineAdmin]),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "panel"
)]
pub async fn online_admins(
    headers: HeaderMap,
    pools: Extension<RegionPools>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(status) = require_auth(&headers, pools.panel(), &auth_state).await {
        return status.into_response();
    }

    let online = auth_state.presence().online().await;
    (StatusCode::OK, Json(online)).into_response()
}

#[cfg(test)]
mod tests {
    use super::PresenceMap;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn touch_and_list_online() {
        let presence = PresenceMap::new(Duration::from_secs(60));
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        presence.touch(alice, "alice@mdrecords.dev").await;
        presence.touch(bob, "bob@mdrecords.dev").await;

        let online = presence.online().await;
        assert_eq!(online.len(), 2);
        assert!(online.iter().any(|admin| admin.email == "alice@mdrecords.dev"));
    }

    #[tokio::test]
    async fn touch_is_idempotent_per_admin() {
        let presence = PresenceMap::new(Duration::from_secs(60));
        let alice = Uuid::new_v4();

        presence.touch(alice, "alice@mdrecords.dev").await;
        presence.touch(alice, "alice@mdrecords.dev").await;

        assert_eq!(presence.online().await.len(), 1);
    }

    #[tokio::test]
    async fn stale_entries_are_pruned() {
        let presence = PresenceMap::new(Duration::from_millis(10));
        let alice = Uuid::new_v4();

        presence.touch(alice, "alice@mdrecords.dev").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(presence.online().await.is_empty());
    }
}
