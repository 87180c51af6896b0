use serde::Deserialize;

/// Default callback retry delays in minutes, indexed by retry count.
pub const DEFAULT_BACKOFF_MINUTES: [i64; 6] = [15, 45, 120, 180, 360, 720];

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Address the intake API listens on (default: 0.0.0.0:8080)
    pub api_bind_addr: String,

    /// Timeout applied to every outbound callback request, in seconds (default: 10)
    pub client_timeout_secs: u64,

    /// Number of concurrent retry workers per sweep (default: 10)
    pub retry_workers: usize,

    /// Failed attempts after which a notification is abandoned (default: 6)
    pub max_retry: i32,

    /// Delay before each retry, in minutes, indexed by retry count
    pub retry_backoff_minutes: Vec<i64>,

    /// Interval between sweeps in seconds. When unset the sweeper runs once and exits.
    pub sweep_interval_secs: Option<u64>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: get("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: parse("DB_MAX_CONNECTIONS", "20")
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            api_bind_addr: parse("API_BIND_ADDR", "0.0.0.0:8080"),
            client_timeout_secs: parse("CLIENT_TIMEOUT_SECS", "10")
                .parse()
                .map_err(|_| anyhow::anyhow!("CLIENT_TIMEOUT_SECS must be a valid u64"))?,
            retry_workers: parse("RETRY_WORKERS", "10")
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0)
                .ok_or_else(|| anyhow::anyhow!("RETRY_WORKERS must be a positive integer"))?,
            max_retry: parse("MAX_RETRY", "6")
                .parse()
                .ok()
                .filter(|n: &i32| *n >= 0)
                .ok_or_else(|| anyhow::anyhow!("MAX_RETRY must be a non-negative integer"))?,
            retry_backoff_minutes: match get("RETRY_BACKOFF_MINUTES") {
                Some(raw) => parse_backoff_minutes(&raw)?,
                None => DEFAULT_BACKOFF_MINUTES.to_vec(),
            },
            sweep_interval_secs: get("SWEEP_INTERVAL_SECS")
                .map(|raw| {
                    raw.parse()
                        .ok()
                        .filter(|n: &u64| *n > 0)
                        .ok_or_else(|| {
                            anyhow::anyhow!("SWEEP_INTERVAL_SECS must be a positive integer")
                        })
                })
                .transpose()?,
        })
    }
}

/// Parse a comma-separated list of non-negative minute values, e.g. `"15,45,120"`.
pub fn parse_backoff_minutes(raw: &str) -> anyhow::Result<Vec<i64>> {
    let minutes = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .ok()
                .filter(|m| *m >= 0)
                .ok_or_else(|| anyhow::anyhow!("RETRY_BACKOFF_MINUTES has invalid entry '{}'", s))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if minutes.is_empty() {
        anyhow::bail!("RETRY_BACKOFF_MINUTES must list at least one delay");
    }
    Ok(minutes)
}
