use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub log_endpoint: String,
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub sync_interval: Duration,
    pub probe: Option<ProbeConfig>,
    pub token_timeout: Duration,
    pub background: BackgroundConfig,
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub initial_token: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub url: String,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct BackgroundConfig {
    pub tag: String,
    pub grant_delay: Duration,
    pub window: Duration,
    pub backoff_max: Duration,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            tag: "qd-sync".to_string(),
            grant_delay: Duration::from_secs(1),
            window: Duration::from_secs(60),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let api_base = env_or("QD_API_BASE", "http://localhost:8000")
            .trim_end_matches('/')
            .to_string();
        let log_endpoint = env_or("QD_LOG_ENDPOINT", "/api/operator/log");
        let database_url = env_or("QD_DATABASE_URL", "sqlite://qd-outbox.db");

        let host: IpAddr = env_or("QD_HOST", "127.0.0.1")
            .parse()
            .map_err(|e| format!("Invalid QD_HOST: {e}"))?;

        let port: u16 = env_or("QD_PORT", "3030")
            .parse()
            .map_err(|e| format!("Invalid QD_PORT: {e}"))?;

        let sync_interval = Duration::from_secs(env_parse("QD_SYNC_INTERVAL_SECS", 20)?);
        if sync_interval.is_zero() {
            return Err("QD_SYNC_INTERVAL_SECS must be greater than zero".to_string());
        }

        let probe_interval = env_parse("QD_PROBE_INTERVAL_SECS", 5)?;
        let probe = (probe_interval > 0).then(|| ProbeConfig {
            url: env_or("QD_PROBE_URL", &api_base),
            interval: Duration::from_secs(probe_interval),
        });

        let token_timeout = Duration::from_millis(env_parse("QD_TOKEN_TIMEOUT_MS", 3000)?);

        let background = BackgroundConfig {
            tag: env_or("QD_SYNC_TAG", "qd-sync"),
            grant_delay: Duration::from_millis(env_parse("QD_SYNC_GRANT_DELAY_MS", 1000)?),
            window: Duration::from_secs(env_parse("QD_SYNC_WINDOW_SECS", 60)?),
            backoff_max: Duration::from_secs(env_parse("QD_SYNC_BACKOFF_MAX_SECS", 300)?),
        };

        let request_timeout = Duration::from_secs(env_parse("QD_REQUEST_TIMEOUT_SECS", 30)?);

        let max_body_size: usize = env_or("QD_MAX_BODY_SIZE", "20971520")
            .parse()
            .map_err(|e| format!("Invalid QD_MAX_BODY_SIZE: {e}"))?;

        let initial_token = std::env::var("QD_TOKEN").ok().filter(|t| !t.is_empty());

        let log_level = env_or("QD_LOG_LEVEL", "info");

        Ok(Config {
            api_base,
            log_endpoint,
            database_url,
            host,
            port,
            sync_interval,
            probe,
            token_timeout,
            background,
            request_timeout,
            max_body_size,
            initial_token,
            log_level,
        })
    }

    /// Full URL of the collaborator's logging endpoint.
    pub fn log_url(&self) -> String {
        format!("{}{}", self.api_base, self.log_endpoint)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse(key: &str, default: u64) -> Result<u64, String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("Invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}
