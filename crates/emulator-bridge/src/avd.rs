//! AVD (Android Virtual Device) listing
//!
//! Lists the AVDs the emulator binary knows about, via `emulator -list-avds`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use droidlink_core::{Error, Result};

use crate::runner::{clean_output, CommandRunner, DEFAULT_EXEC_TIMEOUT};

static API_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_API_(\d+)$").expect("Invalid API pattern regex"));

/// AVD information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvdInfo {
    /// Name passed to `-avd`
    pub name: String,
    /// Name with underscores and the API suffix removed
    pub display_name: String,
    /// API level, when the name ends in `_API_<n>`
    pub api_level: Option<u32>,
}

impl AvdInfo {
    fn from_name(name: &str) -> Self {
        let (display_name, api_level) = match API_PATTERN.captures(name) {
            Some(caps) => (
                API_PATTERN.replace(name, "").replace('_', " ").trim().to_string(),
                caps.get(1).and_then(|m| m.as_str().parse().ok()),
            ),
            None => (name.replace('_', " "), None),
        };
        Self {
            name: name.to_string(),
            display_name,
            api_level,
        }
    }
}

/// Parse `emulator -list-avds`: one name per line, emulator log noise skipped
pub fn parse_avd_list(output: &str) -> Vec<AvdInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("INFO") && !line.starts_with("WARNING"))
        .map(AvdInfo::from_name)
        .collect()
}

/// List all available AVDs
pub async fn list_avds(runner: &dyn CommandRunner, emulator: &Path) -> Result<Vec<AvdInfo>> {
    let output = runner
        .run(emulator, &["-list-avds".to_string()], DEFAULT_EXEC_TIMEOUT)
        .await?;
    Ok(parse_avd_list(&clean_output(&output)))
}

/// Fail with [`Error::UnknownAvd`] unless `avd_name` is listed
pub async fn check_avd_exists(runner: &dyn CommandRunner, emulator: &Path, avd_name: &str) -> Result<()> {
    let avds = list_avds(runner, emulator).await?;
    if avds.iter().any(|avd| avd.name == avd_name) {
        Ok(())
    } else {
        Err(Error::UnknownAvd {
            avd: avd_name.to_string(),
            available: avds.into_iter().map(|avd| avd.name).collect(),
        })
    }
}
