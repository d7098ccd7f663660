//! Process configuration, loaded once at startup.
//!
//! Built-in defaults are merged with environment variables through
//! [`figment`], then validated into an immutable [`Config`] that handlers
//! share behind an `Arc`. A missing or malformed provider credential is a
//! startup failure, never a per-request one.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variables holding text. Read verbatim, so values such as a
/// digits-only engine id keep their exact spelling.
pub const STRING_ENV_KEYS: &[&str] = &[
    "GEMINI_API_KEY",
    "GEMINI_MODEL",
    "GEMINI_BASE_URL",
    "GOOGLE_SEARCH_API_KEY",
    "SEARCH_ENGINE_ID",
    "NEWSAPI_KEY",
    "HOST",
    "TEXT_PATH",
    "VOICE_PATH",
];

/// Environment variables holding numbers, parsed by figment.
pub const NUMERIC_ENV_KEYS: &[&str] = &["PORT", "AI_TIMEOUT_MS", "MAX_REQUEST_BYTES"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
}

/// Raw settings as they come out of figment, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub google_search_api_key: Option<String>,
    pub search_engine_id: Option<String>,
    pub newsapi_key: Option<String>,
    pub host: String,
    pub port: u16,
    pub ai_timeout_ms: u64,
    pub text_path: String,
    pub voice_path: String,
    pub max_request_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".to_owned(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            google_search_api_key: None,
            search_engine_id: None,
            newsapi_key: None,
            host: "0.0.0.0".to_owned(),
            port: 5000,
            ai_timeout_ms: 20_000,
            text_path: "/".to_owned(),
            voice_path: "/voice".to_owned(),
            max_request_bytes: crate::server::DEFAULT_MAX_REQUEST_SIZE,
        }
    }
}

/// A credential whose `Debug` and `Display` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Validates a raw credential: non-blank, no whitespace or control characters.
    pub fn parse(key: &'static str, raw: Option<&str>) -> Result<Self, ConfigError> {
        let value = raw.map(str::trim).unwrap_or("");
        if value.is_empty() {
            return Err(ConfigError::Missing(key));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ConfigError::Invalid {
                key,
                reason: "must not contain whitespace or control characters".to_owned(),
            });
        }
        Ok(Self(value.to_owned()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Google Custom Search credentials. Present only when both are configured.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: ApiKey,
    pub engine_id: String,
}

/// Validated, immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: ApiKey,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub search: Option<SearchConfig>,
    pub news_api_key: Option<ApiKey>,
    pub host: String,
    pub port: u16,
    pub ai_timeout: Duration,
    pub text_path: String,
    pub voice_path: String,
    pub max_request_bytes: usize,
}

impl Config {
    /// Loads defaults overlaid with the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The figment [`Config::load`] extracts from.
    pub fn figment() -> Figment {
        let text: BTreeMap<String, String> = STRING_ENV_KEYS
            .iter()
            .filter_map(|key| {
                std::env::var(key)
                    .ok()
                    .map(|value| (key.to_ascii_lowercase(), value))
            })
            .collect();

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Serialized::defaults(text))
            .merge(Env::raw().only(NUMERIC_ENV_KEYS))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment.extract().map_err(Box::new)?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let gemini_api_key = ApiKey::parse("GEMINI_API_KEY", settings.gemini_api_key.as_deref())?;

        if settings.gemini_model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "GEMINI_MODEL",
                reason: "must not be empty".to_owned(),
            });
        }

        let base_url = settings.gemini_base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                key: "GEMINI_BASE_URL",
                reason: format!("{base_url:?} is not an http(s) URL"),
            });
        }

        let search = match (
            non_blank(settings.google_search_api_key.as_deref()),
            non_blank(settings.search_engine_id.as_deref()),
        ) {
            (Some(key), Some(engine)) => Some(SearchConfig {
                api_key: ApiKey::parse("GOOGLE_SEARCH_API_KEY", Some(key))?,
                engine_id: engine.to_owned(),
            }),
            _ => None,
        };

        let news_api_key = non_blank(settings.newsapi_key.as_deref())
            .map(|key| ApiKey::parse("NEWSAPI_KEY", Some(key)))
            .transpose()?;

        let text_path = route_path("TEXT_PATH", &settings.text_path)?;
        let voice_path = route_path("VOICE_PATH", &settings.voice_path)?;
        if text_path == voice_path {
            return Err(ConfigError::Invalid {
                key: "VOICE_PATH",
                reason: format!("must differ from TEXT_PATH ({text_path})"),
            });
        }

        if settings.ai_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "AI_TIMEOUT_MS",
                reason: "must be greater than zero".to_owned(),
            });
        }

        if settings.max_request_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_REQUEST_BYTES",
                reason: "must be greater than zero".to_owned(),
            });
        }

        Ok(Self {
            gemini_api_key,
            gemini_model: settings.gemini_model.trim().to_owned(),
            gemini_base_url: base_url,
            search,
            news_api_key,
            host: settings.host,
            port: settings.port,
            ai_timeout: Duration::from_millis(settings.ai_timeout_ms),
            text_path,
            voice_path,
            max_request_bytes: settings.max_request_bytes,
        })
    }

    /// `host:port` for [`Server::bind`](crate::server::Server::bind).
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn route_path(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let path = raw.trim();
    if !path.starts_with('/') {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("{path:?} must start with '/'"),
        });
    }
    if path.contains(['?', '#', ' ']) {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("{path:?} must be a plain path"),
        });
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() { "/".to_owned() } else { trimmed.to_owned() })
}
