//! Process configuration, read once from the environment at startup.

use crate::cache::CacheConfig;
use std::env;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: set {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to build http client: {0}")]
    Client(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub gemini: GeminiConfig,
    pub server: ServerConfig,
    pub extraction: ExtractionConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractionConfig {
    pub max_attempts: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|key| get(*key));

        let backend = BackendConfig {
            url: first(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"])
                .ok_or(ConfigError::Missing("SUPABASE_URL"))?,
            api_key: first(&[
                "SUPABASE_SERVICE_ROLE_KEY",
                "SUPABASE_ANON_KEY",
                "NEXT_PUBLIC_SUPABASE_ANON_KEY",
            ])
            .ok_or(ConfigError::Missing(
                "SUPABASE_SERVICE_ROLE_KEY or SUPABASE_ANON_KEY",
            ))?,
        };

        let gemini = GeminiConfig {
            api_key: first(&["GEMINI_API_KEY", "NEXT_PUBLIC_GEMINI_API_KEY"])
                .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?,
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        };

        let bind = get("EMO_MCP_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let server = ServerConfig {
            bind: parse_value("EMO_MCP_BIND", &bind)?,
            request_timeout: get("EMO_MCP_REQUEST_TIMEOUT_SECS")
                .map(|raw| parse_value::<u64>("EMO_MCP_REQUEST_TIMEOUT_SECS", &raw))
                .transpose()?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };

        let max_attempts = match get("EXTRACTION_MAX_ATTEMPTS") {
            Some(raw) => parse_value::<u32>("EXTRACTION_MAX_ATTEMPTS", &raw)?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "EXTRACTION_MAX_ATTEMPTS",
                message: "must be at least 1".to_string(),
            });
        }

        let mut cache = CacheConfig::default();
        if let Some(raw) = get("CACHE_MAX_ENTRIES") {
            cache.max_entries = parse_value::<NonZeroUsize>("CACHE_MAX_ENTRIES", &raw)?;
        }
        if let Some(raw) = get("CACHE_TTL_SECS") {
            cache.ttl = Duration::from_secs(parse_value("CACHE_TTL_SECS", &raw)?);
        }

        Ok(Self {
            backend,
            gemini,
            server,
            extraction: ExtractionConfig { max_attempts },
            cache,
        })
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        message: err.to_string(),
    })
}
