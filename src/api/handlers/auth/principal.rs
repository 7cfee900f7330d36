//! Authenticated principal extraction and role checks.
//!
//! Flow Overview: read the session cookie, resolve it to a panel user, touch
//! the presence map, and return a principal downstream handlers can use.

use axum::http::{HeaderMap, StatusCode};
use sqlx::PgPool;
use tracing::error;

use super::session::authenticate_session;
use super::state::AuthState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelRole {
    Admin,
    Superadmin,
}

impl PanelRole {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "superadmin" => Some(Self::Superadmin),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        }
    }
}

/// Authenticated panel user context derived from the session cookie.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: uuid::Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: PanelRole,
}

/// Resolve a session cookie into a principal, or return 401 for missing sessions.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<Principal, StatusCode> {
    let record = match authenticate_session(headers, pool).await {
        Ok(Some(record)) => record,
        Ok(None) => return Err(StatusCode::UNAUTHORIZED),
        Err(status) => return Err(status),
    };

    let Some(role) = PanelRole::parse(&record.role) else {
        // A role outside the known set means the row predates a migration.
        error!("Unknown panel role '{}' for {}", record.role, record.user_id);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };

    auth_state
        .presence()
        .touch(record.user_id, &record.email)
        .await;

    Ok(Principal {
        user_id: record.user_id,
        email: record.email,
        display_name: record.display_name,
        role,
    })
}

/// Gate for destructive operations; non-superadmins get 403.
pub fn require_superadmin(principal: &Principal) -> Result<(), StatusCode> {
    if principal.role == PanelRole::Superadmin {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

#[cfg(test)]
mod tests {
    use super::{require_superadmin, PanelRole, Principal};
    use axum::http::StatusCode;

    fn principal(role: PanelRole) -> Principal {
        Principal {
            user_id: uuid::Uuid::new_v4(),
            email: "ops@mdrecords.dev".to_string(),
            display_name: None,
            role,
        }
    }

    #[test]
    fn parse_known_roles() {
        assert_eq!(PanelRole::parse("admin"), Some(PanelRole::Admin));
        assert_eq!(PanelRole::parse("superadmin"), Some(PanelRole::Superadmin));
        assert_eq!(PanelRole::parse("root"), None);
    }

    #[test]
    fn role_as_str_round_trips() {
        for role in [PanelRole::Admin, PanelRole::Superadmin] {
            assert_eq!(PanelRole::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn superadmin_gate() {
        assert!(require_superadmin(&principal(PanelRole::Superadmin)).is_ok());
        assert_eq!(
            require_superadmin(&principal(PanelRole::Admin)),
            Err(StatusCode::FORBIDDEN)
        );
    }
}
