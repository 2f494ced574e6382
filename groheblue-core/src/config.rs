//! Client configuration.
//!
//! A [`ClientConfig`] is read from a TOML file and passed by reference to
//! [`GroheClient::connect`](crate::GroheClient::connect). Nothing in the
//! library looks settings up on its own.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatcher::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy};
use crate::model::{ApplianceId, RoomPath};
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::store::Secret;
use crate::transport::{DEFAULT_BASE_URL, Endpoints};

/// Environment variable consulted when the file has no `password`.
pub const PASSWORD_ENV: &str = "GROHEBLUE_PASSWORD";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or misses required fields.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Neither the file nor the environment provide a password.
    #[error("no password configured; set `password` or GROHEBLUE_PASSWORD")]
    MissingPassword,

    /// `base_url` is not an absolute URL.
    #[error("invalid base_url {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A value is out of range.
    #[error("invalid config: {message}")]
    Invalid { message: String },

    /// The platform has no configuration directory.
    #[error("could not determine the configuration directory")]
    NoConfigDir,
}

/// Settings for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Account e-mail address.
    pub email: String,

    /// Account password. Falls back to `GROHEBLUE_PASSWORD` when absent.
    #[serde(default, skip_serializing)]
    pub password: Option<Secret>,

    /// API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Dashboard polling interval in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// The appliance to control. Discovered from the dashboard if absent.
    #[serde(default)]
    pub device: Option<DeviceConfig>,

    /// Command retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

/// Address of a configured appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub location_id: String,
    pub room_id: String,
    pub appliance_id: ApplianceId,
}

impl DeviceConfig {
    /// The room the appliance is registered under.
    pub fn room(&self) -> RoomPath {
        RoomPath::new(self.location_id.clone(), self.room_id.clone())
    }
}

/// `[retry]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl ClientConfig {
    /// A configuration with default settings for `email`.
    pub fn new(email: impl Into<String>, password: Secret) -> Self {
        Self {
            email: email.into(),
            password: Some(password),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            device: None,
            retry: RetryConfig::default(),
        }
    }

    /// Read and validate the file at `path`.
    ///
    /// A missing `password` is taken from `GROHEBLUE_PASSWORD`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let env_password = std::env::var(PASSWORD_ENV).ok();
        let config = Self::parse(&contents, env_password)?;

        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate TOML, with `env_password` as password fallback.
    pub fn parse(contents: &str, env_password: Option<String>) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(contents)?;
        if config.password.is_none() {
            config.password = env_password.filter(|p| !p.is_empty()).map(Secret::new);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the base URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "email must not be empty".to_string(),
            });
        }
        if self.password.is_none() {
            return Err(ConfigError::MissingPassword);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "request_timeout_secs must be at least 1".to_string(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "poll_interval_secs must be at least 1".to_string(),
            });
        }
        if let Some(device) = &self.device {
            if device.appliance_id.as_str().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "device.appliance_id must not be empty".to_string(),
                });
            }
        }
        self.endpoints().map(|_| ())
    }

    /// The account password.
    pub fn password(&self) -> Result<&Secret, ConfigError> {
        self.password.as_ref().ok_or(ConfigError::MissingPassword)
    }

    /// API endpoints derived from `base_url`.
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        Endpoints::new(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    /// Dispatch retry policy from the `[retry]` table.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            delay: Duration::from_secs(self.retry.delay_secs),
        }
    }

    /// Per-request HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Dashboard polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// `config.toml` in the platform configuration directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("com", "grohe", "groheblue")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}
