//! Startup configuration.
//!
//! Loaded from TOML with the following resolution order:
//! 1. Explicit path (e.g. `--config <path>`)
//! 2. `~/.heimdall/config.toml` (user)
//! 3. `/etc/heimdall/config.toml` (system)
//!
//! With no file and no explicit path, built-in defaults apply. Environment
//! variables are layered on top by [`Config::apply_env`]:
//!
//! | Variable | Field |
//! |---|---|
//! | `ENABLE_RATE_LIMITING` | `rate_limits.enabled` |
//! | `RECORD_REJECTED_ATTEMPTS` | `rate_limits.record_rejected_attempts` |
//! | `QUERY_RATE_LIMIT` / `QUERY_RATE_WINDOW` | `rate_limits.query` |
//! | `INGEST_RATE_LIMIT` / `INGEST_RATE_WINDOW` | `rate_limits.ingest` |
//! | `HEALTH_RATE_LIMIT` / `HEALTH_RATE_WINDOW` | `rate_limits.health` |
//! | `DEFAULT_RATE_LIMIT` / `DEFAULT_RATE_WINDOW` | `rate_limits.default` |
//! | `MAX_CONCURRENT_REQUESTS` | `concurrency.global` |
//! | `MAX_QUERY_CONCURRENT` | `concurrency.query` |
//! | `MAX_INGEST_CONCURRENT` | `concurrency.ingest` |
//! | `MAX_ROUTE_CONCURRENT` | `concurrency.default` |
//! | `DEFAULT_TIMEOUT` | `timeouts.request_secs` |
//! | `QUERY_TIMEOUT` / `INGEST_TIMEOUT` | `timeouts.query_secs` / `timeouts.ingest_secs` |
//! | `SLOW_REQUEST_THRESHOLD` | `timeouts.slow_request_secs` |
//! | `ENABLE_CACHING` | `cache.enabled` |
//! | `CACHE_TTL` / `EMBEDDING_CACHE_TTL` | `cache.default_ttl_secs` / `cache.embedding_ttl_secs` |
//! | `CACHE_ALLOW_CLEAR` | `cache.allow_clear` |
//! | `REDIS_URL` | `store.url` |
//! | `THREAD_POOL_SIZE` | `workers.threads` |

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::admission::{ConcurrencyConfig, TimeoutConfig};
use crate::cache::CacheConfig;
use crate::ratelimit::RateLimitPolicy;
use crate::{HeimdallError, Result};

/// Control-plane configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rate_limits: RateLimitConfig,
    pub concurrency: ConcurrencyConfig,
    pub timeouts: TimeoutConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub workers: WorkerConfig,
}

/// Rate limiting switches plus the per-class policy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Default: true.
    pub enabled: bool,
    /// Whether rejected requests occupy a window slot. Unset keeps the
    /// limiter's own default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_rejected_attempts: Option<bool>,
    #[serde(flatten)]
    pub policy: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            record_rejected_attempts: None,
            policy: RateLimitPolicy::default(),
        }
    }
}

/// External store location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `redis://...` URL. Unset means the in-process store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Blocking worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Default: 4.
    pub threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { threads: 4 }
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path that does not exist is an error; a missing
    /// user/system file is not.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// [`load`](Self::load), then environment overrides, then validation.
    pub fn from_env(explicit_path: Option<&Path>) -> Result<Self> {
        let config = Self::load(explicit_path)?.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HeimdallError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HeimdallError::Configuration(format!("failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HeimdallError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".heimdall").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/heimdall/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup (see the module table).
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Overrides(&lookup);

        let rl = &mut self.rate_limits;
        env.flag("ENABLE_RATE_LIMITING", &mut rl.enabled)?;
        if let Some(v) = env.parse_flag("RECORD_REJECTED_ATTEMPTS")? {
            rl.record_rejected_attempts = Some(v);
        }
        env.value("QUERY_RATE_LIMIT", &mut rl.policy.query.limit)?;
        env.value("QUERY_RATE_WINDOW", &mut rl.policy.query.window_secs)?;
        env.value("INGEST_RATE_LIMIT", &mut rl.policy.ingest.limit)?;
        env.value("INGEST_RATE_WINDOW", &mut rl.policy.ingest.window_secs)?;
        env.value("HEALTH_RATE_LIMIT", &mut rl.policy.health.limit)?;
        env.value("HEALTH_RATE_WINDOW", &mut rl.policy.health.window_secs)?;
        env.value("DEFAULT_RATE_LIMIT", &mut rl.policy.default.limit)?;
        env.value("DEFAULT_RATE_WINDOW", &mut rl.policy.default.window_secs)?;

        let cc = &mut self.concurrency;
        env.value("MAX_CONCURRENT_REQUESTS", &mut cc.global)?;
        env.value("MAX_QUERY_CONCURRENT", &mut cc.query)?;
        env.value("MAX_INGEST_CONCURRENT", &mut cc.ingest)?;
        env.value("MAX_ROUTE_CONCURRENT", &mut cc.default)?;

        let to = &mut self.timeouts;
        env.value("DEFAULT_TIMEOUT", &mut to.request_secs)?;
        if let Some(v) = env.parse("QUERY_TIMEOUT")? {
            to.query_secs = Some(v);
        }
        if let Some(v) = env.parse("INGEST_TIMEOUT")? {
            to.ingest_secs = Some(v);
        }
        env.value("SLOW_REQUEST_THRESHOLD", &mut to.slow_request_secs)?;

        let cache = &mut self.cache;
        env.flag("ENABLE_CACHING", &mut cache.enabled)?;
        env.value("CACHE_TTL", &mut cache.default_ttl_secs)?;
        env.value("EMBEDDING_CACHE_TTL", &mut cache.embedding_ttl_secs)?;
        env.flag("CACHE_ALLOW_CLEAR", &mut cache.allow_clear)?;

        if let Some(url) = lookup("REDIS_URL").filter(|u| !u.trim().is_empty()) {
            self.store.url = Some(url);
        }
        env.value("THREAD_POOL_SIZE", &mut self.workers.threads)?;

        Ok(self)
    }

    /// Reject values the control plane cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.rate_limits.policy.validate()?;
        self.concurrency.validate()?;
        self.timeouts.validate()?;
        if self.cache.default_ttl_secs == 0 || self.cache.embedding_ttl_secs == 0 {
            return Err(HeimdallError::Configuration(
                "cache TTLs must be > 0".to_string(),
            ));
        }
        if self.workers.threads == 0 {
            return Err(HeimdallError::Configuration(
                "workers.threads must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| HeimdallError::Internal(format!("failed to render config: {e}")))
    }
}

struct Overrides<'a, F>(&'a F);

impl<F> Overrides<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.raw(name)
            .map(|v| {
                v.parse::<T>().map_err(|e| {
                    HeimdallError::Configuration(format!("invalid value for {name} ({v:?}): {e}"))
                })
            })
            .transpose()
    }

    fn parse_flag(&self, name: &str) -> Result<Option<bool>> {
        self.raw(name)
            .map(|v| match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(HeimdallError::Configuration(format!(
                    "invalid value for {name} ({v:?}): expected a boolean"
                ))),
            })
            .transpose()
    }

    fn value<T>(&self, name: &str, slot: &mut T) -> Result<()>
    where
        T: FromStr,
        T::Err: Display,
    {
        if let Some(v) = self.parse(name)? {
            *slot = v;
        }
        Ok(())
    }

    fn flag(&self, name: &str, slot: &mut bool) -> Result<()> {
        if let Some(v) = self.parse_flag(name)? {
            *slot = v;
        }
        Ok(())
    }
}
