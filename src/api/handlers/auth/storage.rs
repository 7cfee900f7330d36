//! Database helpers for OTP and session state in the panel database.

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::state::AuthConfig;
use super::utils::{
    generate_otp_code, generate_session_token, hash_otp_code, hash_session_token,
    is_unique_violation,
};

/// Outcome for an OTP request (the endpoint answers 204 either way).
#[derive(Debug)]
pub(super) enum OtpOutcome {
    Queued,
    Cooldown,
}

/// Panel user fields needed to issue an OTP.
pub(super) struct PanelUserRow {
    pub(super) id: Uuid,
}

/// Minimal data returned for a valid session cookie.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) display_name: Option<String>,
    pub(crate) role: String,
}

/// Look up an active panel user by normalized email.
pub(super) async fn lookup_active_panel_user(
    pool: &PgPool,
    email: &str,
) -> Result<Option<PanelUserRow>> {
    let query = "SELECT id FROM panel_users WHERE email = $1 AND status = 'active'";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup panel user")?;

    Ok(row.map(|row| PanelUserRow { id: row.get("id") }))
}

/// Generate a login code, store its hash with a TTL, and enqueue the email —
/// all in one transaction so no code can be mailed without a matching row.
pub(super) async fn issue_otp(
    pool: &PgPool,
    user: &PanelUserRow,
    email: &str,
    config: &AuthConfig,
) -> Result<OtpOutcome> {
    let mut tx = pool.begin().await.context("begin otp transaction")?;

    // Cooldown window keeps a hammered login endpoint from flooding the outbox.
    let query = r"
        SELECT COUNT(*) AS recent
        FROM admin_otp_tokens
        WHERE panel_user_id = $1
          AND created_at > NOW() - ($2 * INTERVAL '1 second')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let recent: i64 = sqlx::query(query)
        .bind(user.id)
        .bind(config.resend_cooldown_seconds())
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to check otp cooldown")?
        .get("recent");

    if recent > 0 {
        let _ = tx.rollback().await;
        return Ok(OtpOutcome::Cooldown);
    }

    let code = generate_otp_code();
    let code_hash = hash_otp_code(&code);

    let query = r"
        INSERT INTO admin_otp_tokens
            (panel_user_id, otp_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .bind(code_hash)
        .bind(config.otp_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert otp token")?;

    let payload_json = json!({
        "email": email,
        "otp": code,
        "expires_minutes": config.otp_ttl_seconds() / 60,
    });
    let payload_text =
        serde_json::to_string(&payload_json).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind("otp_login")
        .bind(payload_text)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    tx.commit().await.context("commit otp transaction")?;

    Ok(OtpOutcome::Queued)
}

/// Consume a pending OTP for a user. Single use: the row is marked consumed
/// in the same statement that matches it, so a replayed code cannot win twice.
pub(super) async fn consume_otp(pool: &PgPool, user_id: Uuid, otp: &str) -> Result<bool> {
    let otp_hash = hash_otp_code(otp);
    let query = r"
        UPDATE admin_otp_tokens
        SET consumed_at = NOW()
        WHERE panel_user_id = $1
          AND otp_hash = $2
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(otp_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume otp token")?;

    Ok(row.is_some())
}

pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie.
    let query = r"
        INSERT INTO admin_sessions (panel_user_id, session_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(super) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    // Only accept active panel users and unexpired sessions.
    let query = r"
        SELECT panel_users.id, panel_users.email, panel_users.display_name,
               panel_users.role
        FROM admin_sessions
        JOIN panel_users ON panel_users.id = admin_sessions.panel_user_id
        WHERE admin_sessions.session_hash = $1
          AND admin_sessions.expires_at > NOW()
          AND panel_users.status = 'active'
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    if row.is_none() {
        return Ok(None);
    }

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE admin_sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
    }))
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM admin_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}
