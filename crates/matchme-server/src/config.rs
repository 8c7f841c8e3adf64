use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use matchme_gateway::config::GatewayConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:8080,http://localhost:3000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub gateway: GatewayConfig,
}

impl ServerConfig {
    /// Read `MATCHME_*` variables. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = var("MATCHME_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MATCHME_JWT_SECRET is unset or still a placeholder; it must match the identity service's secret");
        }

        let db_path: PathBuf = var("MATCHME_DB_PATH")
            .unwrap_or_else(|| "matchme.db".into())
            .into();
        let host = var("MATCHME_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&var, "MATCHME_PORT", 3000)?;

        let defaults = GatewayConfig::default();
        let gateway = GatewayConfig {
            send_timeout: Duration::from_millis(parse_or(&var, "MATCHME_SEND_TIMEOUT_MS", 5000)?),
            outbound_capacity: parse_or(&var, "MATCHME_OUTBOUND_CAPACITY", defaults.outbound_capacity)?,
            sweep_interval: Duration::from_secs(parse_or(&var, "MATCHME_PRESENCE_SWEEP_SECS", 60)?),
            ..defaults
        };
        if gateway.outbound_capacity == 0 {
            bail!("MATCHME_OUTBOUND_CAPACITY must be at least 1");
        }
        if gateway.sweep_interval.is_zero() {
            bail!("MATCHME_PRESENCE_SWEEP_SECS must be at least 1");
        }

        let cors_origins = var("MATCHME_CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.into())
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            cors_origins,
            gateway,
        })
    }
}

fn parse_or<F, T>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
