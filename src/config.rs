//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. Explicit path (e.g. `mimir --config <path>`)
//! 2. `~/.mimir/config.toml` (user)
//! 3. `/etc/mimir/config.toml` (system)
//!
//! API keys are never stored in the file; each target names the environment
//! variable holding its key (`api_key_env`).
//!
//! ```toml
//! primary_target = "claude"
//! fallback_target = "titan"
//!
//! [cache]
//! ttl_secs = 3600
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 500
//!
//! [circuit]
//! failure_threshold = 5
//! cooldown_secs = 60
//!
//! [targets.claude]
//! kind = "anthropic"
//! endpoint = "https://runtime.example.com"
//! model = "anthropic.claude-3-haiku"
//! api_key_env = "MIMIR_API_KEY"
//!
//! [targets.titan]
//! kind = "titan"
//! endpoint = "https://runtime.example.com"
//! model = "amazon.titan-text-express-v1"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::providers::{CircuitBreakerConfig, ProviderKind, RetryConfig};
use crate::{MimirError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MimirConfig {
    /// Target that serves requests first.
    pub primary_target: String,
    /// Target used when the primary is exhausted or its circuit is open.
    #[serde(default)]
    pub fallback_target: Option<String>,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub circuit: CircuitSection,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Set to false to bypass the response cache entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Default entry TTL in seconds (default: 3600).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// In-memory store capacity (default: 10,000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Single-flight coalescing of concurrent misses (default: true).
    #[serde(default = "default_true")]
    pub coalesce: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            coalesce: true,
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

/// `[circuit]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,
}

impl Default for CircuitSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            failure_window_secs: default_failure_window_secs(),
        }
    }
}

/// `[targets.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub kind: ProviderKind,
    /// Runtime base URL; requests go to `{endpoint}/model/{model}/invoke`.
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding a bearer token, if the endpoint needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl TargetConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_failure_window_secs() -> u64 {
    60
}

impl MimirConfig {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.mimir/config.toml`
    /// 3. `/etc/mimir/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from_path(&path)
    }

    /// Load and validate a specific file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            MimirError::Configuration(msg) => {
                MimirError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MimirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(MimirError::Configuration(
            "No config file found. Create ~/.mimir/config.toml or /etc/mimir/config.toml"
                .to_string(),
        ))
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.targets.contains_key(&self.primary_target) {
            return Err(MimirError::Configuration(format!(
                "primary_target '{}' is not defined under [targets]",
                self.primary_target
            )));
        }
        if let Some(fallback) = &self.fallback_target
            && !self.targets.contains_key(fallback)
        {
            return Err(MimirError::Configuration(format!(
                "fallback_target '{fallback}' is not defined under [targets]"
            )));
        }
        self.cache_config().validate()?;
        self.retry_config().validate()?;
        self.circuit_config().validate()?;
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.cache.max_entries)
            .default_ttl(Duration::from_secs(self.cache.ttl_secs))
            .coalesce(self.cache.coalesce)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.retry.max_retries)
            .base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .jitter(self.retry.jitter)
            .attempt_timeout(Duration::from_secs(self.retry.attempt_timeout_secs))
    }

    pub fn circuit_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .failure_threshold(self.circuit.failure_threshold)
            .cooldown(Duration::from_secs(self.circuit.cooldown_secs))
            .failure_window(Duration::from_secs(self.circuit.failure_window_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        primary_target = "main"

        [targets.main]
        kind = "anthropic"
        endpoint = "http://localhost:8080"
        model = "anthropic.claude-3-haiku"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = MimirConfig::from_toml_str(MINIMAL).unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.circuit.failure_threshold, 5);
        assert!(config.fallback_target.is_none());
        assert_eq!(config.targets["main"].kind, ProviderKind::Anthropic);
    }

    #[test]
    fn durations_convert() {
        let toml = format!(
            "{MINIMAL}\n[retry]\nbase_delay_ms = 250\nattempt_timeout_secs = 5\n\
             [circuit]\ncooldown_secs = 90\n"
        );
        let config = MimirConfig::from_toml_str(&toml).unwrap();
        let retry = config.retry_config();
        assert_eq!(retry.base_delay, Duration::from_millis(250));
        assert_eq!(retry.attempt_timeout, Duration::from_secs(5));
        assert_eq!(config.circuit_config().cooldown, Duration::from_secs(90));
    }

    #[test]
    fn undefined_fallback_is_rejected() {
        let toml = MINIMAL.replace(
            "primary_target = \"main\"",
            "primary_target = \"main\"\nfallback_target = \"backup\"",
        );
        let err = MimirConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("backup"));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let toml = format!("{MINIMAL}\n[circuit]\nfailure_threshold = 0\n");
        assert!(MimirConfig::from_toml_str(&toml).is_err());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let toml = format!("{MINIMAL}\n[cache]\nttl_secs = 0\n");
        assert!(MimirConfig::from_toml_str(&toml).is_err());
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let toml = MINIMAL.replace("anthropic\"", "gpt\"");
        assert!(matches!(
            MimirConfig::from_toml_str(&toml),
            Err(MimirError::Configuration(_))
        ));
    }

    #[test]
    fn api_key_missing_env_is_none() {
        let target = TargetConfig {
            kind: ProviderKind::Titan,
            endpoint: "http://x".into(),
            model: "m".into(),
            api_key_env: Some("MIMIR_TEST_SURELY_UNSET_VARIABLE".into()),
        };
        assert!(target.api_key().is_none());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = MimirConfig::load(Some(&path)).unwrap();
        assert_eq!(config.primary_target, "main");
    }

    #[test]
    fn explicit_missing_path_errors() {
        let err = MimirConfig::load(Some(Path::new("/nonexistent/mimir.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
