use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("mdr-panel")
        .about("Admin panel API for a multi-region health records service")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("MDR_PANEL_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("panel-dsn")
                .long("panel-dsn")
                .help("Connection string for the panel database (panel users, sessions, outbox)")
                .env("MDR_PANEL_DSN")
                .required(true),
        )
        .arg(
            Arg::new("india-dsn")
                .long("india-dsn")
                .help("Connection string for the India regional database")
                .env("MDR_PANEL_INDIA_DSN")
                .required(true),
        )
        .arg(
            Arg::new("usa-dsn")
                .long("usa-dsn")
                .help("Connection string for the USA regional database")
                .env("MDR_PANEL_USA_DSN")
                .required(true),
        )
        .arg(
            Arg::new("frontend-url")
                .long("frontend-url")
                .help("Origin of the panel frontend, used for CORS and cookie security")
                .default_value("http://localhost:3000")
                .env("MDR_PANEL_FRONTEND_URL"),
        )
        .arg(
            Arg::new("monitor-url")
                .long("monitor-url")
                .help("Third-party API endpoint to probe from /v1/status/apis (repeatable)")
                .env("MDR_PANEL_MONITOR_URLS")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("otp-ttl")
                .long("otp-ttl")
                .help("Login OTP lifetime in seconds")
                .default_value("300")
                .env("MDR_PANEL_OTP_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("session-ttl")
                .long("session-ttl")
                .help("Admin session lifetime in seconds")
                .default_value("43200")
                .env("MDR_PANEL_SESSION_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("MDR_PANEL_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "mdr-panel");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Admin panel API for a multi-region health records service"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_port_and_dsns() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "mdr-panel",
            "--port",
            "8080",
            "--panel-dsn",
            "postgres://panel@localhost:5432/panel",
            "--india-dsn",
            "postgres://app@db-in:5432/records",
            "--usa-dsn",
            "postgres://app@db-us:5432/records",
        ]);

        assert_eq!(matches.get_one::<u16>("port").map(|s| *s), Some(8080));
        assert_eq!(
            matches.get_one::<String>("panel-dsn").map(|s| s.to_string()),
            Some("postgres://panel@localhost:5432/panel".to_string())
        );
        assert_eq!(
            matches.get_one::<String>("india-dsn").map(|s| s.to_string()),
            Some("postgres://app@db-in:5432/records".to_string())
        );
        assert_eq!(
            matches.get_one::<String>("usa-dsn").map(|s| s.to_string()),
            Some("postgres://app@db-us:5432/records".to_string())
        );
        assert_eq!(
            matches
                .get_one::<String>("frontend-url")
                .map(|s| s.to_string()),
            Some("http://localhost:3000".to_string())
        );
        assert_eq!(matches.get_one::<i64>("otp-ttl").map(|s| *s), Some(300));
        assert_eq!(
            matches.get_one::<i64>("session-ttl").map(|s| *s),
            Some(43200)
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("MDR_PANEL_PORT", Some("443")),
                ("MDR_PANEL_DSN", Some("postgres://panel@localhost/panel")),
                ("MDR_PANEL_INDIA_DSN", Some("postgres://app@db-in/records")),
                ("MDR_PANEL_USA_DSN", Some("postgres://app@db-us/records")),
                ("MDR_PANEL_LOG_LEVEL", Some("info")),
                (
                    "MDR_PANEL_MONITOR_URLS",
                    Some("https://pay.example.com/health,https://sms.example.com/ping"),
                ),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["mdr-panel"]);
                assert_eq!(matches.get_one::<u16>("port").map(|s| *s), Some(443));
                assert_eq!(
                    matches
                        .get_one::<String>("panel-dsn")
                        .map(|s| s.to_string()),
                    Some("postgres://panel@localhost/panel".to_string())
                );
                assert_eq!(matches.get_one::<u8>("verbosity").map(|s| *s), Some(2));

                let monitors: Vec<String> = matches
                    .get_many::<String>("monitor-url")
                    .map(|values| values.map(ToString::to_string).collect())
                    .unwrap_or_default();
                assert_eq!(
                    monitors,
                    vec![
                        "https://pay.example.com/health".to_string(),
                        "https://sms.example.com/ping".to_string()
                    ]
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("MDR_PANEL_LOG_LEVEL", Some(level)),
                    ("MDR_PANEL_DSN", Some("postgres://panel@localhost/panel")),
                    ("MDR_PANEL_INDIA_DSN", Some("postgres://app@db-in/records")),
                    ("MDR_PANEL_USA_DSN", Some("postgres://app@db-us/records")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["mdr-panel"]);
                    assert_eq!(
                        matches.get_one::<u8>("verbosity").map(|s| *s),
                        Some(index as u8)
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("MDR_PANEL_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "mdr-panel".to_string(),
                    "--panel-dsn".to_string(),
                    "postgres://panel@localhost/panel".to_string(),
                    "--india-dsn".to_string(),
                    "postgres://app@db-in/records".to_string(),
                    "--usa-dsn".to_string(),
                    "postgres://app@db-us/records".to_string(),
                ];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();

                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").map(|s| *s),
                    Some(index as u8)
                );
            });
        }
    }
}
