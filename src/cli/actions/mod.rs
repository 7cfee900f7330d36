pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        panel_dsn: String,
        india_dsn: String,
        usa_dsn: String,
        frontend_url: String,
        monitor_urls: Vec<String>,
        otp_ttl_seconds: i64,
        session_ttl_seconds: i64,
    },
}
