//! SDK tool lookup
//!
//! Resolves `adb` and `emulator` inside an Android SDK, falling back to PATH.

use std::env;
use std::path::PathBuf;

use tracing::debug;
use which::which;

use droidlink_core::{BridgeConfig, Error, Result};

/// Android SDK tool locations
#[derive(Debug, Clone, Default)]
pub struct SdkTools {
    sdk_path: Option<PathBuf>,
}

impl SdkTools {
    pub fn new(sdk_path: Option<PathBuf>) -> Self {
        Self { sdk_path }
    }

    /// Use the configured SDK, or the one named by the environment
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.get_sdk_path().or_else(Self::detect_sdk))
    }

    fn detect_sdk() -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(home) = dirs::home_dir() {
            if cfg!(target_os = "macos") {
                candidates.push(home.join("Library").join("Android").join("sdk"));
            }
            candidates.push(home.join("Android").join("Sdk"));
        }
        if let Some(local) = dirs::data_local_dir() {
            candidates.push(local.join("Android").join("Sdk"));
        }
        candidates.into_iter().find(|p| p.join("platform-tools").exists())
    }

    pub fn sdk_path(&self) -> Option<&PathBuf> {
        self.sdk_path.as_ref()
    }

    fn binary_name(name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", name)
        } else {
            name.to_string()
        }
    }

    fn resolve(&self, subdir: &str, name: &str) -> Result<PathBuf> {
        let binary = Self::binary_name(name);

        if let Some(sdk) = &self.sdk_path {
            let candidate = sdk.join(subdir).join(&binary);
            if candidate.exists() {
                debug!("Using {} from SDK: {:?}", name, candidate);
                return Ok(candidate);
            }
        }

        which(&binary).map_err(|_| {
            let searched = self
                .sdk_path
                .as_ref()
                .map(|p| p.join(subdir).display().to_string())
                .unwrap_or_else(|| env::var("PATH").unwrap_or_default());
            Error::ToolNotFound(format!("{} (searched {})", binary, searched))
        })
    }

    /// Get the adb executable path
    pub fn adb(&self) -> Result<PathBuf> {
        self.resolve("platform-tools", "adb")
    }

    /// Get the emulator executable path
    pub fn emulator(&self) -> Result<PathBuf> {
        self.resolve("emulator", "emulator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_sdk_binary() {
        let sdk = env::temp_dir().join(format!("droidlink-sdk-{}", std::process::id()));
        let tools_dir = sdk.join("platform-tools");
        std::fs::create_dir_all(&tools_dir).unwrap();
        let adb = tools_dir.join(SdkTools::binary_name("adb"));
        std::fs::write(&adb, b"").unwrap();

        let tools = SdkTools::new(Some(sdk.clone()));
        assert_eq!(tools.adb().unwrap(), adb);

        std::fs::remove_dir_all(&sdk).unwrap();
    }

    #[test]
    fn test_missing_tool_names_search_location() {
        let tools = SdkTools::new(Some(PathBuf::from("/nonexistent/droidlink-sdk")));
        match tools.resolve("emulator", "droidlink-no-such-tool") {
            Err(Error::ToolNotFound(message)) => {
                assert!(message.contains("droidlink-no-such-tool"));
                assert!(message.contains("/nonexistent/droidlink-sdk"));
            }
            other => panic!("expected ToolNotFound, got {:?}", other),
        }
    }
}
