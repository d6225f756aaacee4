/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    /// A `*` entry allows any origin.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on each post-shutdown cleanup wait (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// Seconds between WebSocket pings (default: `30`).
    pub heartbeat_interval_secs: u64,
    /// Capacity of each connection's outbound queue (default: `256`).
    pub outbound_buffer: usize,
    /// PostgreSQL URL. `None` runs against the in-memory demo fleet.
    pub database_url: Option<String>,
    /// Emit JSON logs instead of the human-readable format.
    pub log_json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default   |
    /// |---------------------------|-----------|
    /// | `HOST`                    | `0.0.0.0` |
    /// | `PORT`                    | `3000`    |
    /// | `CORS_ORIGINS`            | `*`       |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`      |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `10`      |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`      |
    /// | `OUTBOUND_BUFFER`         | `256`     |
    /// | `DATABASE_URL`            | unset     |
    /// | `LOG_FORMAT`              | `pretty`  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let heartbeat_interval_secs: u64 = std::env::var("HEARTBEAT_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("HEARTBEAT_INTERVAL_SECS must be a valid u64");

        let outbound_buffer: usize = std::env::var("OUTBOUND_BUFFER")
            .unwrap_or_else(|_| "256".into())
            .parse()
            .expect("OUTBOUND_BUFFER must be a valid usize");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_json = std::env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            heartbeat_interval_secs,
            outbound_buffer,
            database_url,
            log_json,
        }
    }

    /// Whether `CORS_ORIGINS` allows any origin.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }
}
