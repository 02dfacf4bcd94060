use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::errors::PlayerAppError;

/// Application configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend collaborator endpoints
    pub backend: BackendConfig,

    /// Conversion status polling
    pub polling: PollingConfig,

    /// Keyboard and pointer handling
    pub input: InputConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL for /status, /hls, /episodes and /search
    pub base_url: String,

    /// Token passed to the embedded-provider search endpoint
    pub search_token: String,

    /// Per-request timeout
    #[serde(with = "crate::serde_helpers::duration_ms")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between status probes
    #[serde(with = "crate::serde_helpers::duration_ms")]
    pub interval: Duration,

    /// Delay between a ready status and the attach signal
    #[serde(with = "crate::serde_helpers::duration_ms")]
    pub ready_settle_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Press duration that turns a tap into a hold
    #[serde(with = "crate::serde_helpers::duration_ms")]
    pub hold_threshold: Duration,

    /// Seek step for the arrow keys, in seconds
    pub seek_step_secs: f64,

    /// Volume step for the arrow keys
    pub volume_step: f64,

    /// Playback rate while space is held
    pub hold_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, text)
    pub format: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            search_token: String::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            ready_settle_delay: Duration::from_millis(1000),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            hold_threshold: Duration::from_millis(1500),
            seek_step_secs: 10.0,
            volume_step: 0.1,
            hold_rate: 2.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl BackendConfig {
    pub fn parsed_base_url(&self) -> Result<Url, PlayerAppError> {
        Url::parse(&self.base_url).map_err(|e| PlayerAppError::Configuration {
            message: format!("Invalid backend base URL {:?}: {}", self.base_url, e),
        })
    }
}

/// Configuration manager for loading, saving, and validating configurations
pub struct ConfigManager {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: AppConfig::default(),
        }
    }

    /// Load configuration from file, writing the defaults if it does not exist yet
    pub async fn load(&mut self) -> Result<(), PlayerAppError> {
        if !self.config_path.exists() {
            self.save().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_path).await
            .map_err(|e| PlayerAppError::Configuration {
                message: format!("Failed to read config file: {}", e),
            })?;

        self.config = toml::from_str(&content)
            .map_err(|e| PlayerAppError::Configuration {
                message: format!("Failed to parse config file: {}", e),
            })?;

        self.validate()?;
        Ok(())
    }

    pub async fn save(&self) -> Result<(), PlayerAppError> {
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| PlayerAppError::Configuration {
                message: format!("Failed to serialize config: {}", e),
            })?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await
                    .map_err(|e| PlayerAppError::Configuration {
                        message: format!("Failed to create config directory: {}", e),
                    })?;
            }
        }

        tokio::fs::write(&self.config_path, content).await
            .map_err(|e| PlayerAppError::Configuration {
                message: format!("Failed to write config file: {}", e),
            })?;

        Ok(())
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: AppConfig) -> Result<(), PlayerAppError> {
        self.config = config;
        self.validate()?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PlayerAppError> {
        validate_config(&self.config)
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), PlayerAppError> {
    let invalid = |message: &str| PlayerAppError::Configuration {
        message: message.to_string(),
    };

    if config.backend.base_url.trim().is_empty() {
        return Err(invalid("Backend base URL cannot be empty"));
    }
    config.backend.parsed_base_url()?;

    if config.backend.request_timeout.is_zero() {
        return Err(invalid("Request timeout must be greater than 0"));
    }

    if config.polling.interval.is_zero() {
        return Err(invalid("Polling interval must be greater than 0"));
    }

    if config.input.hold_threshold.is_zero() {
        return Err(invalid("Hold threshold must be greater than 0"));
    }

    if config.input.seek_step_secs <= 0.0 {
        return Err(invalid("Seek step must be greater than 0"));
    }

    if config.input.volume_step <= 0.0 || config.input.volume_step > 1.0 {
        return Err(invalid("Volume step must be in (0, 1]"));
    }

    if config.input.hold_rate <= 1.0 {
        return Err(invalid("Hold playback rate must be greater than 1"));
    }

    Ok(())
}

/// Environment-based configuration override
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    pub fn apply_overrides(config: &mut AppConfig) {
        use std::env;

        if let Ok(url) = env::var("PLAYER_BACKEND_URL") {
            config.backend.base_url = url;
        }
        if let Ok(token) = env::var("PLAYER_SEARCH_TOKEN") {
            config.backend.search_token = token;
        }
        if let Ok(interval) = env::var("PLAYER_POLL_INTERVAL_MS") {
            if let Ok(millis) = interval.parse::<u64>() {
                config.polling.interval = Duration::from_millis(millis);
            }
        }
        if let Ok(level) = env::var("PLAYER_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}
