//! Command Runner
//!
//! Runs external executables with a timeout and cleans their output.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use droidlink_core::{Error, Result};

/// Timeout applied to every invocation unless the caller overrides it
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Noise printed by some adb builds on stdout
static LINKER_WARNING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^WARNING: linker.+$").expect("Invalid linker warning regex"));

/// Per-invocation options
#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    pub timeout: Duration,
}

impl ExecOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }
}

/// Executes a program with discrete argument tokens and returns raw stdout.
///
/// Implementations report a non-zero exit as [`Error::Execution`] whose
/// message carries stderr and stdout, and an expired timeout as
/// [`Error::Timeout`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<String>;
}

/// Render a command line for logs and error messages
pub fn render_command(program: &Path, args: &[String]) -> String {
    let mut rendered = program.display().to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

/// Strip linker warnings and surrounding whitespace
pub fn clean_output(stdout: &str) -> String {
    LINKER_WARNING.replace_all(stdout, "").trim().to_string()
}

/// Runs commands as child processes via tokio
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<String> {
        let command = render_command(program, args);
        debug!("exec {}", command);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(Error::Timeout {
                    command,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(Error::execution(
                command,
                format!("exited with {}: {} {}", code, stderr.trim(), stdout.trim()),
            ));
        }

        Ok(stdout)
    }
}
