//! Environment configuration for the sync proxy and the field client.

use thiserror::Error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BUCKET: &str = "EtnoApp";
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

pub const DEFAULT_PROXY_URL: &str = "https://etnoapp-production.up.railway.app";
pub const DEFAULT_DB_PATH: &str = "etnoapp.db";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Settings for the proxy process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub service_role_key: String,
    pub storage_bucket: String,
    pub host: String,
    pub port: u16,
    /// Empty means any origin is accepted.
    pub allowed_origins: Vec<String>,
    pub body_limit_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let supabase_url = required("SUPABASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let service_role_key = required("SUPABASE_SERVICE_ROLE_KEY")?;

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw.clone(),
            })?,
            None => DEFAULT_PORT,
        };

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            supabase_url,
            service_role_key,
            storage_bucket: lookup("STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            allowed_origins,
            body_limit_bytes: DEFAULT_BODY_LIMIT,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings for the on-device field client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub proxy_url: String,
    pub supabase_url: Option<String>,
    pub anon_key: Option<String>,
    pub db_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: std::env::var("ETNO_PROXY_URL")
                .unwrap_or_else(|_| DEFAULT_PROXY_URL.to_string()),
            supabase_url: std::env::var("SUPABASE_URL").ok(),
            anon_key: std::env::var("SUPABASE_ANON_KEY").ok(),
            db_path: std::env::var("ETNO_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
        }
    }
}
