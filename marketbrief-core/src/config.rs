//! Application configuration: simulation mode, retry/breaker tuning,
//! storage locations, and provider credentials.
//!
//! Tuning and paths come from an optional TOML file; credentials come
//! from the environment only and are never written to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::{CircuitBreaker, FetchPolicy, MockStore, RetryPolicy};
use crate::providers::FetchRuntime;

/// A configuration fault: raised before any network or storage attempt,
/// never retried, never counted by a circuit breaker.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential for {provider}: set the {env_var} environment variable")]
    MissingCredential {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("could not read config file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("could not parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Provider credentials, resolved from the environment once at startup.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    fred_api_key: Option<String>,
    finmind_api_key: Option<String>,
    finnhub_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            fred_api_key: read("FRED_API_KEY"),
            finmind_api_key: read("FINMIND_API_KEY"),
            finnhub_api_key: read("FINNHUB_API_KEY"),
        }
    }

    pub fn fred_api_key(&self) -> Result<&str, ConfigError> {
        self.fred_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                provider: "fred",
                env_var: "FRED_API_KEY",
            })
    }

    pub fn finmind_api_key(&self) -> Result<&str, ConfigError> {
        self.finmind_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                provider: "finmind",
                env_var: "FINMIND_API_KEY",
            })
    }

    pub fn finnhub_api_key(&self) -> Result<&str, ConfigError> {
        self.finnhub_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                provider: "finnhub",
                env_var: "FINNHUB_API_KEY",
            })
    }

    #[cfg(test)]
    pub fn for_tests(fred: Option<&str>, finmind: Option<&str>, finnhub: Option<&str>) -> Self {
        Self {
            fred_api_key: fred.map(String::from),
            finmind_api_key: finmind.map(String::from),
            finnhub_api_key: finnhub.map(String::from),
        }
    }
}

/// Serializable application config with the original defaults:
/// simulation on, 3 retry attempts at 5s base delay, breaker trips at 3
/// failures with a 60s reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub simulation: bool,
    pub retry_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_timeout_secs: u64,
    pub database_path: PathBuf,
    pub parquet_dir: PathBuf,
    pub mock_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            simulation: true,
            retry_attempts: 3,
            retry_base_delay_secs: 5,
            breaker_failure_threshold: 3,
            breaker_reset_timeout_secs: 60,
            database_path: PathBuf::from("data/marketbrief.sqlite"),
            parquet_dir: PathBuf::from("data/parquet"),
            mock_dir: PathBuf::from("data/mock"),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file. A missing file yields the defaults; a file
    /// that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_secs(self.retry_base_delay_secs),
        )
    }

    /// A fresh policy (breaker + retry) for one provider. Each provider
    /// must get its own so breaker state stays isolated.
    pub fn fetch_policy(&self, provider: &'static str) -> FetchPolicy {
        FetchPolicy::new(
            CircuitBreaker::new(
                provider,
                self.breaker_failure_threshold,
                Duration::from_secs(self.breaker_reset_timeout_secs),
            ),
            self.retry_policy(),
        )
    }

    pub fn runtime(&self) -> FetchRuntime {
        FetchRuntime {
            simulation: self.simulation,
            mock: MockStore::new(&self.mock_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_tuning() {
        let cfg = AppConfig::default();
        assert!(cfg.simulation);
        assert_eq!(cfg.retry_attempts, 3);
        assert_eq!(cfg.retry_base_delay_secs, 5);
        assert_eq!(cfg.breaker_failure_threshold, 3);
        assert_eq!(cfg.breaker_reset_timeout_secs, 60);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load(Path::new("definitely/not/here.toml")).unwrap();
        assert!(cfg.simulation);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "simulation = false\nretry_attempts = 5\n").unwrap();

        let cfg = AppConfig::load(&path).unwrap();
        assert!(!cfg.simulation);
        assert_eq!(cfg.retry_attempts, 5);
        assert_eq!(cfg.breaker_failure_threshold, 3);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "simulation = [oops").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_credential_is_a_config_fault() {
        let creds = Credentials::for_tests(None, None, None);
        assert!(matches!(
            creds.fred_api_key(),
            Err(ConfigError::MissingCredential {
                env_var: "FRED_API_KEY",
                ..
            })
        ));
    }
}
