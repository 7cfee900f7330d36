use crate::cli::actions::Action;
use anyhow::{anyhow, Result};
use clap::ArgMatches;

/// Map parsed CLI arguments into an [`Action`].
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("Missing required argument: --{name}"))
    };

    let monitor_urls = matches
        .get_many::<String>("monitor-url")
        .map(|values| values.map(ToString::to_string).collect())
        .unwrap_or_default();

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").map_or(8080, |port| *port),
        panel_dsn: required("panel-dsn")?,
        india_dsn: required("india-dsn")?,
        usa_dsn: required("usa-dsn")?,
        frontend_url: required("frontend-url")?,
        monitor_urls,
        otp_ttl_seconds: matches.get_one::<i64>("otp-ttl").map_or(300, |ttl| *ttl),
        session_ttl_seconds: matches
            .get_one::<i64>("session-ttl")
            .map_or(43200, |ttl| *ttl),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "mdr-panel",
            "--panel-dsn",
            "postgres://panel@localhost/panel",
            "--india-dsn",
            "postgres://app@db-in/records",
            "--usa-dsn",
            "postgres://app@db-us/records",
            "--monitor-url",
            "https://pay.example.com/health",
            "--otp-ttl",
            "120",
        ]);

        let Action::Server {
            port,
            panel_dsn,
            india_dsn,
            usa_dsn,
            frontend_url,
            monitor_urls,
            otp_ttl_seconds,
            session_ttl_seconds,
        } = handler(&matches)?;

        assert_eq!(port, 8080);
        assert_eq!(panel_dsn, "postgres://panel@localhost/panel");
        assert_eq!(india_dsn, "postgres://app@db-in/records");
        assert_eq!(usa_dsn, "postgres://app@db-us/records");
        assert_eq!(frontend_url, "http://localhost:3000");
        assert_eq!(monitor_urls, vec!["https://pay.example.com/health"]);
        assert_eq!(otp_ttl_seconds, 120);
        assert_eq!(session_ttl_seconds, 43200);
        Ok(())
    }
}
