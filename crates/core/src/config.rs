//! Bridge Configuration
//!
//! Manages all session settings including:
//! - Android SDK location
//! - adb server port and kill policy
//! - Command and discovery timeouts
//! - Emulator launch timings

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use tracing::{info, debug, warn};

use crate::error::{Error, Result};

/// Port the adb server listens on unless overridden
pub const DEFAULT_ADB_SERVER_PORT: u16 = 5037;

/// Environment variable consulted for the adb server port
pub const ADB_SERVER_PORT_ENV: &str = "ANDROID_ADB_SERVER_PORT";

/// Emulator timing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmulatorConfig {
    /// How long to wait for a launched AVD to register with adb
    pub launch_timeout_ms: u64,
    /// How long to wait for the boot animation to stop
    pub ready_timeout_ms: u64,
    /// How many times the registration search is repeated
    pub retry_attempts: u32,
    /// Timeout for a single console command
    pub console_timeout_ms: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            launch_timeout_ms: 60_000,
            ready_timeout_ms: 60_000,
            retry_attempts: 1,
            console_timeout_ms: 5_000,
        }
    }
}

/// Main bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Path to Android SDK
    pub sdk_path: Option<PathBuf>,
    /// Port of the adb server
    pub adb_server_port: u16,
    /// Never kill the adb server (another process owns it)
    pub suppress_kill_server: bool,
    /// Timeout for a single adb invocation
    pub exec_timeout_ms: u64,
    /// Deadline for rediscovering devices
    pub device_timeout_ms: u64,
    /// Emulator settings
    pub emulator: EmulatorConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sdk_path: None,
            adb_server_port: DEFAULT_ADB_SERVER_PORT,
            suppress_kill_server: false,
            exec_timeout_ms: 20_000,
            device_timeout_ms: 20_000,
            emulator: EmulatorConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Defaults with the adb server port taken from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `ANDROID_ADB_SERVER_PORT` if it is set and valid
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(ADB_SERVER_PORT_ENV) {
            self.apply_server_port(&value);
        }
    }

    fn apply_server_port(&mut self, value: &str) {
        match value.trim().parse::<u16>() {
            Ok(port) => self.adb_server_port = port,
            Err(_) => warn!("Ignoring invalid {}={:?}", ADB_SERVER_PORT_ENV, value),
        }
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.exec_timeout_ms)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "droidlink", "droidlink")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load configuration from the default location
    pub async fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| Error::Config("Cannot determine config path".into()))?;
        Self::load_from(&config_file).await
    }

    /// Load configuration from a file, falling back to defaults if it is missing
    pub async fn load_from(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            debug!("Loading config from {:?}", path);
            let contents = tokio::fs::read_to_string(path).await?;
            toml::from_str(&contents)?
        } else {
            info!("Config file not found, using defaults");
            BridgeConfig::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<()> {
        let config_file = Self::config_file()
            .ok_or_else(|| Error::Config("Cannot determine config path".into()))?;
        self.save_to(&config_file).await
    }

    /// Save configuration to a file
    pub async fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    /// Get Android SDK path, with auto-detection
    pub fn get_sdk_path(&self) -> Option<PathBuf> {
        self.sdk_path.clone().or_else(|| {
            ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .map(PathBuf::from)
                .find(|p| p.exists())
        })
    }
}
