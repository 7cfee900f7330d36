use crate::api::{self, email::EmailWorkerConfig, handlers::auth::state::AuthConfig};
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            panel_dsn,
            india_dsn,
            usa_dsn,
            frontend_url,
            monitor_urls,
            otp_ttl_seconds,
            session_ttl_seconds,
        } => {
            let auth_config = AuthConfig::new(frontend_url)
                .with_otp_ttl_seconds(otp_ttl_seconds)
                .with_session_ttl_seconds(session_ttl_seconds);

            api::new(
                port,
                panel_dsn,
                india_dsn,
                usa_dsn,
                auth_config,
                EmailWorkerConfig::new(),
                monitor_urls,
            )
            .await?;
        }
    }

    Ok(())
}
