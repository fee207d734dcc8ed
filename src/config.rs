//! Configuration loading.
//!
//! Configuration is read once, at construction. Files are TOML, resolved in
//! this order:
//! 1. An explicit path (the CLI's `--config`)
//! 2. `~/.mimir/config.toml` (user)
//! 3. `/etc/mimir/config.toml` (system)
//!
//! With no file, defaults are used. Environment variables are applied on
//! top of whatever was loaded:
//!
//! | Variable | Field |
//! |---|---|
//! | `MIMIR_PROVIDER` | `provider.kind` (`openrouter`, `openai`, `gemini`) |
//! | `MIMIR_API_KEY` | `provider.api_key`, else the provider's own variable |
//! | `MIMIR_BASE_URL` | `provider.base_url` |
//! | `MIMIR_PRIMARY_MODEL` | `provider.primary_model` |
//! | `MIMIR_FALLBACK_MODEL` | `provider.fallback_model` (empty clears it) |
//! | `MIMIR_TOKENS_PER_WINDOW` | `rate_limit.tokens_per_window` |
//! | `MIMIR_REQUESTS_PER_WINDOW` | `rate_limit.requests_per_window` |
//! | `MIMIR_CACHE_TTL_SECS` | `cache.ttl_secs` |
//! | `MIMIR_CACHE_MAX_ENTRIES` | `cache.max_entries` |
//! | `MIMIR_DEBUG` | `debug` |
//!
//! ```toml
//! debug = false
//!
//! [provider]
//! kind = "openrouter"
//! primary_model = "openai/gpt-4o-mini"
//! fallback_model = "anthropic/claude-3.5-haiku"
//! timeout_secs = 60
//!
//! [budget]
//! max_tokens_per_request = 6000
//! max_response_tokens = 1000
//!
//! [rate_limit]
//! tokens_per_window = 60000
//! requests_per_window = 60
//! window_secs = 60
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 500
//!
//! [cache]
//! ttl_secs = 3600
//! max_entries = 1000
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::chunker::CostBudget;
use crate::providers::{DEFAULT_REQUEST_TIMEOUT, RateLimitConfig, RetryConfig};
use crate::tokenizer::EstimatorConfig;
use crate::{MimirError, Result};

/// Full mimir configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub budget: CostBudget,
    pub estimator: EstimatorConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    /// Debug mode: verbose logging, and the response cache is bypassed.
    pub debug: bool,
}

/// Which upstream wire format to talk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenRouter,
    OpenAi,
    Gemini,
}

impl ProviderKind {
    /// Environment variable conventionally holding this provider's key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "openai/gpt-4o-mini",
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-2.0-flash",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = MimirError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(MimirError::Configuration(format!(
                "unknown provider '{other}' (expected openrouter, openai or gemini)"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        })
    }
}

/// Upstream connection and model selection.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// API credential. Prefer the environment over the config file.
    pub api_key: Option<String>,
    /// Override the provider's default endpoint.
    pub base_url: Option<String>,
    /// Defaults to the provider's [`default_model`](ProviderKind::default_model).
    pub primary_model: Option<String>,
    pub fallback_model: Option<String>,
    #[serde(with = "secs", rename = "timeout_secs")]
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            api_key: None,
            base_url: None,
            primary_model: None,
            fallback_model: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// Primary model, falling back to the provider default.
    pub fn primary_model(&self) -> &str {
        self.primary_model
            .as_deref()
            .unwrap_or_else(|| self.kind.default_model())
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("primary_model", &self.primary_model)
            .field("fallback_model", &self.fallback_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// Load from the standard locations, then apply the process environment.
    ///
    /// An explicit path that does not exist is an error; otherwise a missing
    /// file just means defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse one TOML file, without environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MimirError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Apply `MIMIR_*` overrides read through `var`.
    ///
    /// `var` is the environment lookup; tests pass a map instead of
    /// mutating the process environment.
    pub fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| var(key).map(|v| v.trim().to_string());

        if let Some(kind) = var("MIMIR_PROVIDER") {
            self.provider.kind = kind.parse()?;
        }
        if let Some(key) = var("MIMIR_API_KEY")
            .or_else(|| var(self.provider.kind.api_key_env()))
            .filter(|k| !k.is_empty())
        {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = var("MIMIR_BASE_URL").filter(|u| !u.is_empty()) {
            self.provider.base_url = Some(url);
        }
        if let Some(model) = var("MIMIR_PRIMARY_MODEL").filter(|m| !m.is_empty()) {
            self.provider.primary_model = Some(model);
        }
        if let Some(model) = var("MIMIR_FALLBACK_MODEL") {
            self.provider.fallback_model = (!model.is_empty()).then_some(model);
        }
        if let Some(v) = var("MIMIR_TOKENS_PER_WINDOW") {
            self.rate_limit.tokens_per_window = parse_number("MIMIR_TOKENS_PER_WINDOW", &v)?;
        }
        if let Some(v) = var("MIMIR_REQUESTS_PER_WINDOW") {
            self.rate_limit.requests_per_window = parse_number("MIMIR_REQUESTS_PER_WINDOW", &v)?;
        }
        if let Some(v) = var("MIMIR_CACHE_TTL_SECS") {
            self.cache.ttl = Duration::from_secs(parse_number("MIMIR_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = var("MIMIR_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_number("MIMIR_CACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = var("MIMIR_DEBUG") {
            self.debug = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    /// Cache settings with debug mode applied.
    pub fn effective_cache(&self) -> CacheConfig {
        if self.debug {
            CacheConfig {
                enabled: false,
                ..self.cache.clone()
            }
        } else {
            self.cache.clone()
        }
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| MimirError::Configuration(format!("{name} must be a number, got '{value}'")))
}

/// Serde helper: `Duration` from whole seconds.
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Serde helper: `Duration` from milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
