//! Shutdown timer configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::instance::{ChannelName, DEFAULT_CHANNEL_NAME, Endpoint};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Single-instance channel settings
    pub instance: InstanceConfig,

    /// Countdown settings
    pub timer: TimerConfig,
}

impl Config {
    /// Check values that would otherwise fail deep inside the runtime
    pub fn validate(&self) -> Result<()> {
        ChannelName::new(self.instance.name.clone()).context("Invalid instance.name")?;
        if self.timer.tick_ms == 0 {
            return Err(eyre::eyre!("timer.tick-ms must be greater than zero"));
        }
        if self.timer.duration_secs == 0 {
            return Err(eyre::eyre!("timer.duration-secs must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .shutdown-timer.yml
        let local_config = PathBuf::from(".shutdown-timer.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/shutdown-timer/shutdown-timer.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("shutdown-timer").join("shutdown-timer.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Single-instance channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Rendezvous name shared by every instance
    pub name: String,

    /// Directory for the socket and lock files
    #[serde(rename = "runtime-dir")]
    pub runtime_dir: Option<PathBuf>,

    /// Bound on reaching the primary, in milliseconds
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Bound on reading one inbound message, in milliseconds
    #[serde(rename = "read-timeout-ms")]
    pub read_timeout_ms: u64,

    /// Retry ownership once when the current owner does not answer
    #[serde(rename = "reclaim-unreachable")]
    pub reclaim_unreachable: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHANNEL_NAME.to_string(),
            runtime_dir: None,
            connect_timeout_ms: 1000,
            read_timeout_ms: 1000,
            reclaim_unreachable: true,
        }
    }
}

impl InstanceConfig {
    pub fn endpoint(&self) -> Result<Endpoint> {
        let name = ChannelName::new(self.name.clone()).context("Invalid instance name")?;
        Ok(match &self.runtime_dir {
            Some(dir) => Endpoint::new(name, dir),
            None => Endpoint::in_runtime_dir(name),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Countdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Countdown length in seconds
    #[serde(rename = "duration-secs")]
    pub duration_secs: u64,

    /// Tick period in milliseconds
    #[serde(rename = "tick-ms")]
    pub tick_ms: u64,

    /// Commands run in order when the countdown expires, each as an argument vector
    #[serde(rename = "expire-commands")]
    pub expire_commands: Vec<Vec<String>>,

    /// Pause between expire commands in milliseconds
    #[serde(rename = "expire-command-gap-ms")]
    pub expire_command_gap_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            duration_secs: 60 * 60,
            tick_ms: 1000,
            expire_commands: Vec::new(),
            expire_command_gap_ms: 1000,
        }
    }
}

impl TimerConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn expire_command_gap(&self) -> Duration {
        Duration::from_millis(self.expire_command_gap_ms)
    }
}
