use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Verbose logging and debug behaviour (`DEBUG`, strtobool semantics)
    pub debug: bool,

    /// Secret used to sign access and refresh tokens
    pub secret_key: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis URL of the task broker (`CELERY_BROKER_URL`)
    pub broker_url: String,

    /// Redis URL for throttling counters (defaults to the broker)
    pub redis_url: String,

    /// Socket address the API server binds to
    pub bind_addr: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Access token lifetime in minutes (default: 5)
    pub jwt_access_minutes: u64,

    /// Refresh token lifetime in hours (default: 24)
    pub jwt_refresh_hours: u64,

    /// Default page size when a client asks for pagination
    pub page_size: u64,

    /// Upper bound on a client-requested page size
    pub max_page_size: u64,

    /// Whether per-scope request throttling is enforced
    pub throttle_enabled: bool,

    /// Number of concurrent task consumers per worker process
    pub worker_concurrency: usize,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let broker_url = std::env::var("CELERY_BROKER_URL")
            .unwrap_or_else(|_| "redis://localhost:6379/0".to_string());

        Ok(Self {
            debug: match std::env::var("DEBUG") {
                Ok(raw) => parse_bool(&raw)
                    .ok_or_else(|| anyhow::anyhow!("DEBUG must be a boolean, got '{}'", raw))?,
                Err(_) => false,
            },
            secret_key: std::env::var("SECRET_KEY")
                .map_err(|_| anyhow::anyhow!("SECRET_KEY environment variable is required"))?,
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| broker_url.clone()),
            broker_url,
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            jwt_access_minutes: parse_var("JWT_ACCESS_MINUTES", 5)?,
            jwt_refresh_hours: parse_var("JWT_REFRESH_HOURS", 24)?,
            page_size: parse_var("PAGE_SIZE", 10)?,
            max_page_size: parse_var("MAX_PAGE_SIZE", 100)?,
            throttle_enabled: match std::env::var("THROTTLE_ENABLED") {
                Ok(raw) => parse_bool(&raw).ok_or_else(|| {
                    anyhow::anyhow!("THROTTLE_ENABLED must be a boolean, got '{}'", raw)
                })?,
                Err(_) => true,
            },
            worker_concurrency: parse_var("WORKER_CONCURRENCY", 4)?,
        })
    }

    /// Default `EnvFilter` directive for the given crate targets.
    ///
    /// `RUST_LOG` still takes precedence where the binary consults it first.
    pub fn log_filter(&self, targets: &[&str]) -> String {
        let level = if self.debug { "debug" } else { "info" };
        targets
            .iter()
            .map(|t| format!("{}={}", t, level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Interpret a truth value the way `strtobool` does.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                key,
                std::any::type_name::<T>()
            )
        }),
        Err(_) => Ok(default),
    }
}
