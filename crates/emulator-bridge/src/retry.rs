//! Retry Orchestration
//!
//! Two retry shapes wrap the client:
//! - rediscovery bounded by wall-clock time ([`AdbClient::devices_with_retry`])
//! - command execution bounded by attempt count ([`AdbClient::exec_with_retry`])
//!
//! Each loop owns exactly one [`RetryBudget`] flavor.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use droidlink_core::{Error, Event, Result};

use crate::adb::AdbClient;
use crate::device::Endpoint;
use crate::runner::ExecOptions;

/// Attempts allowed for a single adb command
pub const EXEC_ATTEMPTS: u32 = 2;

/// Pause after restarting the server before listing again
pub const DISCOVERY_COOLDOWN: Duration = Duration::from_millis(200);

/// Pause after a dropped connection before rediscovering
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// How much retrying a loop may still do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    /// Bounded by attempt count
    Attempts { remaining: u32 },
    /// Bounded by wall-clock time
    Deadline { started: Instant, limit: Duration },
}

impl RetryBudget {
    pub fn attempts(count: u32) -> Self {
        RetryBudget::Attempts { remaining: count }
    }

    pub fn deadline(limit: Duration) -> Self {
        RetryBudget::Deadline {
            started: Instant::now(),
            limit,
        }
    }

    /// True when no further attempt may start
    pub fn exhausted(&self) -> bool {
        match self {
            RetryBudget::Attempts { remaining } => *remaining == 0,
            RetryBudget::Deadline { started, limit } => started.elapsed() > *limit,
        }
    }

    /// Consume one attempt; a deadline budget is only consumed by time
    pub fn start_attempt(&mut self) {
        if let RetryBudget::Attempts { remaining } = self {
            *remaining = remaining.saturating_sub(1);
        }
    }
}

impl AdbClient {
    /// List devices, restarting the server until at least one shows up
    /// or `timeout` elapses.
    pub async fn devices_with_retry(&self, timeout: Duration) -> Result<Vec<Endpoint>> {
        let budget = RetryBudget::deadline(timeout);
        let mut last_error = None;

        loop {
            if budget.exhausted() {
                return Err(Error::NoDevice {
                    waited_ms: timeout.as_millis() as u64,
                    last_error,
                });
            }

            match self.list_devices().await {
                Ok(devices) if !devices.is_empty() => return Ok(devices),
                Ok(_) => {
                    debug!("No devices listed, restarting adb and checking again");
                    last_error = None;
                }
                Err(e) => {
                    warn!("Device discovery failed, restarting adb: {}", e);
                    last_error = Some(e.to_string());
                }
            }

            self.restart_server().await;
            tokio::time::sleep(DISCOVERY_COOLDOWN).await;
        }
    }

    /// [`AdbClient::devices_with_retry`] with the configured deadline
    pub async fn connected_devices(&self) -> Result<Vec<Endpoint>> {
        self.devices_with_retry(self.device_timeout).await
    }

    /// Run a scoped command, retrying once.
    ///
    /// A dropped connection triggers a reconnection pass before the retry.
    /// The last error is returned unchanged once attempts run out.
    pub async fn exec_with_retry(&self, args: &[&str], options: ExecOptions) -> Result<String> {
        let mut budget = RetryBudget::attempts(EXEC_ATTEMPTS);

        loop {
            budget.start_attempt();
            let err = match self.exec(args, options).await {
                Ok(stdout) => return Ok(stdout),
                Err(e) => e,
            };

            if budget.exhausted() {
                return Err(err);
            }

            if err.is_recoverable() {
                let command = args.join(" ");
                info!("Error sending command, reconnecting device and retrying: {}", command);
                self.events.emit(Event::Rediscovery {
                    command,
                    reason: err.to_string(),
                });
                tokio::time::sleep(RECONNECT_DELAY).await;
                if let Err(e) = self.connected_devices().await {
                    warn!("Reconnection pass failed: {}", e);
                }
            } else {
                debug!("Retrying after failure: {}", err);
            }
        }
    }

    /// Run a shell command on the selected device
    pub async fn shell(&self, args: &[&str]) -> Result<String> {
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push("shell");
        full_args.extend_from_slice(args);
        self.exec_with_retry(&full_args, self.exec_options()).await
    }
}
