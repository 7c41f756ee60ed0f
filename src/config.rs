use std::{fmt, path::PathBuf, time::Duration};

use anyhow::Context;
use serde::Deserialize;

/// Deployment mode, read from `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in: Duration,
    pub cookie_expires_in_days: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_dir: PathBuf,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("MONGO_URL"))
            .context("DATABASE_URL (or MONGO_URL) must be set")?;
        let port = match std::env::var("APP_PORT") {
            Ok(v) => v.parse::<u16>().with_context(|| format!("invalid APP_PORT {v:?}"))?,
            Err(_) => 3000,
        };
        let expires_in = match std::env::var("JWT_EXPIRES_IN") {
            Ok(v) => parse_expires_in(&v)?,
            Err(_) => Duration::from_secs(90 * 24 * 60 * 60),
        };
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            expires_in,
            cookie_expires_in_days: match std::env::var("JWT_COOKIE_EXPIRES_IN") {
                Ok(v) => parse_cookie_days(&v)?,
                Err(_) => 90,
            },
        };
        Ok(Self {
            database_url,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            environment: current_environment(),
            log_dir: std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
            jwt,
        })
    }
}

pub fn current_environment() -> Environment {
    std::env::var("NODE_ENV")
        .map(|v| Environment::parse(&v))
        .unwrap_or(Environment::Development)
}

/// Longest accepted token lifetime and cookie age.
pub const MAX_EXPIRES_IN_DAYS: u64 = 10 * 365;
const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Accepts `90d`, `12h`, `30m`, `1h 30m` or a bare number of seconds.
pub fn parse_expires_in(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let parsed = match raw.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(raw)
            .with_context(|| format!("invalid JWT_EXPIRES_IN {raw:?}"))?,
    };
    if parsed.as_secs() > MAX_EXPIRES_IN_DAYS * SECS_PER_DAY {
        anyhow::bail!("JWT_EXPIRES_IN {raw:?} exceeds {MAX_EXPIRES_IN_DAYS} days");
    }
    Ok(parsed)
}

pub fn parse_cookie_days(raw: &str) -> anyhow::Result<u64> {
    let raw = raw.trim();
    let days = raw
        .parse::<u64>()
        .with_context(|| format!("invalid JWT_COOKIE_EXPIRES_IN {raw:?}"))?;
    if days > MAX_EXPIRES_IN_DAYS {
        anyhow::bail!("JWT_COOKIE_EXPIRES_IN {raw:?} exceeds {MAX_EXPIRES_IN_DAYS} days");
    }
    Ok(days)
}
