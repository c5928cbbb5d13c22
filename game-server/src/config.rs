use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Base URL of an external relay. When unset, notices are delivered
    /// straight into this process's own subscriber registry.
    pub relay_base: Option<String>,
    /// Shared secret for `POST /notify`. When unset the endpoint is open.
    pub relay_token: Option<String>,
    pub heartbeat_timeout_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub outbox_capacity: usize,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("Invalid PORT"),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://rooms.db?mode=rwc".to_string()),
            relay_base: env::var("RELAY_BASE").ok().filter(|s| !s.is_empty()),
            relay_token: env::var("RELAY_TOKEN").ok().filter(|s| !s.is_empty()),
            heartbeat_timeout_seconds: env::var("HEARTBEAT_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "70".to_string())
                .parse()
                .expect("Invalid HEARTBEAT_TIMEOUT_SECONDS"),
            sweep_interval_seconds: env::var("SWEEP_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("Invalid SWEEP_INTERVAL_SECONDS"),
            outbox_capacity: env::var("OUTBOX_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .expect("Invalid OUTBOX_CAPACITY"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
