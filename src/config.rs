use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub admin_session_minutes: i64,
    pub admin_email: String,
    pub admin_password: Option<String>,
    pub app_base_url: String,
    pub cors_origins: Vec<String>,
    pub public_rps: u32,
    /// Key public rate limits on `X-Forwarded-For`; only set behind a proxy that owns it.
    pub trust_proxy: bool,
    /// Shared secret the inbound mail webhook must present.
    pub inbound_secret: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub sendgrid_api_key: Option<String>,
    pub from_email: String,
    pub token_ttl_hours: i64,
    pub join_lead_minutes: i64,
    pub join_grace_minutes: i64,
    pub credential_ttl_minutes: i64,
    pub upstream_timeout_secs: u64,
    pub match_threshold: f64,
    pub task_max_attempts: i32,
    pub task_backoff_base_secs: i64,
    pub task_backoff_cap_secs: i64,
    pub task_lease_secs: i64,
    pub task_workers: usize,
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_address: "0.0.0.0:8000".to_string(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            jwt_secret: String::new(),
            admin_session_minutes: 30,
            admin_email: "admin@interviews.local".to_string(),
            admin_password: None,
            app_base_url: "http://localhost:8000".to_string(),
            cors_origins: vec!["*".to_string()],
            public_rps: 20,
            trust_proxy: false,
            inbound_secret: None,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".to_string(),
            sendgrid_api_key: None,
            from_email: "talent@interviews.local".to_string(),
            token_ttl_hours: 48,
            join_lead_minutes: 15,
            join_grace_minutes: 30,
            credential_ttl_minutes: 10,
            upstream_timeout_secs: 15,
            match_threshold: 0.55,
            task_max_attempts: 5,
            task_backoff_base_secs: 30,
            task_backoff_cap_secs: 3600,
            task_lease_secs: 300,
            task_workers: 4,
            sweep_interval_secs: 60,
        }
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = Config::default();

        let store_backend = match get_env_opt("STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(Error::Config(format!(
                    "Invalid value for STORE: {} (expected postgres or memory)",
                    other
                )))
            }
        };
        let database_url = get_env_opt("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(Error::Config(
                "Missing environment variable: DATABASE_URL".to_string(),
            ));
        }

        let config = Self {
            server_address: get_env_opt("SERVER_ADDRESS").unwrap_or(defaults.server_address),
            store_backend,
            database_url,
            jwt_secret: get_env("JWT_SECRET")?,
            admin_session_minutes: get_env_parse_or(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                defaults.admin_session_minutes,
            )?,
            admin_email: get_env_opt("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            admin_password: get_env_opt("ADMIN_PASSWORD"),
            app_base_url: get_env_opt("APP_BASE_URL").unwrap_or(defaults.app_base_url),
            cors_origins: get_env_opt("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            public_rps: get_env_parse_or("PUBLIC_RPS", defaults.public_rps)?,
            trust_proxy: get_env_parse_or("TRUST_PROXY", defaults.trust_proxy)?,
            inbound_secret: get_env_opt("INBOUND_SECRET"),
            openai_api_key: get_env_opt("OPENAI_API_KEY"),
            openai_base_url: get_env_opt("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            sendgrid_api_key: get_env_opt("SENDGRID_API_KEY"),
            from_email: get_env_opt("FROM_EMAIL").unwrap_or(defaults.from_email),
            token_ttl_hours: get_env_parse_or("INTERVIEW_TOKEN_TTL_HOURS", defaults.token_ttl_hours)?,
            join_lead_minutes: get_env_parse_or("JOIN_LEAD_MINUTES", defaults.join_lead_minutes)?,
            join_grace_minutes: get_env_parse_or("JOIN_GRACE_MINUTES", defaults.join_grace_minutes)?,
            credential_ttl_minutes: get_env_parse_or(
                "CREDENTIAL_TTL_MINUTES",
                defaults.credential_ttl_minutes,
            )?,
            upstream_timeout_secs: get_env_parse_or(
                "UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout_secs,
            )?,
            match_threshold: get_env_parse_or("MATCH_THRESHOLD", defaults.match_threshold)?,
            task_max_attempts: get_env_parse_or("TASK_MAX_ATTEMPTS", defaults.task_max_attempts)?,
            task_backoff_base_secs: get_env_parse_or(
                "TASK_BACKOFF_BASE_SECS",
                defaults.task_backoff_base_secs,
            )?,
            task_backoff_cap_secs: get_env_parse_or(
                "TASK_BACKOFF_CAP_SECS",
                defaults.task_backoff_cap_secs,
            )?,
            task_lease_secs: get_env_parse_or("TASK_LEASE_SECS", defaults.task_lease_secs)?,
            task_workers: get_env_parse_or("TASK_WORKERS", defaults.task_workers)?,
            sweep_interval_secs: get_env_parse_or(
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.jwt_secret.len() < 16 {
            return Err(Error::Config(
                "JWT_SECRET must be at least 16 characters".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(Error::Config(
                "MATCH_THRESHOLD must be between 0 and 1".to_string(),
            ));
        }
        if self.token_ttl_hours <= 0 || self.task_max_attempts <= 0 || self.task_workers == 0 {
            return Err(Error::Config(
                "INTERVIEW_TOKEN_TTL_HOURS, TASK_MAX_ATTEMPTS and TASK_WORKERS must be positive"
                    .to_string(),
            ));
        }
        if self.task_lease_secs <= 0 {
            return Err(Error::Config(
                "TASK_LEASE_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_opt(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}

pub fn init_config() -> Result<&'static Config> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    get_config()
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_checks_once_secret_is_set() {
        let config = Config {
            jwt_secret: "0123456789abcdef".to_string(),
            ..Config::default()
        };
        assert!(config.check().is_ok());
        assert_eq!(config.token_ttl_hours, 48);
    }

    #[test]
    fn short_secret_is_rejected() {
        let config = Config {
            jwt_secret: "short".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.check(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_lease_is_rejected() {
        let config = Config {
            jwt_secret: "0123456789abcdef".to_string(),
            task_lease_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.check(), Err(Error::Config(_))));
    }
}
