//! Emulator Process
//!
//! Spawns emulator processes in the background and forwards their output.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tracing::{debug, info};

use droidlink_core::Result;

/// Capacity of the output channel; slow subscribers miss old lines
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Emulator output event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorEvent {
    Stdout(String),
    Stderr(String),
    Exited(Option<i32>),
}

/// Running emulator process, owned by the caller once launched
#[derive(Debug)]
pub struct EmulatorProcess {
    pub avd_name: String,
    process: Option<Child>,
    output: broadcast::Sender<EmulatorEvent>,
}

impl EmulatorProcess {
    fn spawned(avd_name: &str, child: Child, output: broadcast::Sender<EmulatorEvent>) -> Self {
        Self {
            avd_name: avd_name.to_string(),
            process: Some(child),
            output,
        }
    }

    /// A handle with no child attached (an emulator started elsewhere)
    pub fn detached(avd_name: &str) -> Self {
        let (output, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        Self {
            avd_name: avd_name.to_string(),
            process: None,
            output,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(Child::id)
    }

    /// Subscribe to forwarded output lines
    pub fn subscribe(&self) -> broadcast::Receiver<EmulatorEvent> {
        self.output.subscribe()
    }

    /// Check if the emulator process is still running
    pub fn is_running(&mut self) -> bool {
        match self.process.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Kill the emulator and publish its exit to subscribers
    pub async fn kill(&mut self) -> Result<()> {
        if let Some(child) = self.process.as_mut() {
            child.kill().await?;
            let code = child.try_wait()?.and_then(|status| status.code());
            let _ = self.output.send(EmulatorEvent::Exited(code));
            info!("Killed emulator: {}", self.avd_name);
        }
        Ok(())
    }

    /// Wait for emulator to exit
    pub async fn wait(&mut self) -> Result<Option<i32>> {
        match self.process.as_mut() {
            Some(child) => {
                let status = child.wait().await?;
                let _ = self.output.send(EmulatorEvent::Exited(status.code()));
                Ok(status.code())
            }
            None => Ok(None),
        }
    }
}

/// Starts an emulator binary detached from the caller's control flow
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn spawn(&self, avd_name: &str, program: &Path, args: &[String]) -> Result<EmulatorProcess>;
}

/// Spawns through tokio and forwards output lines to the log
#[derive(Debug, Clone, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    pub fn new() -> Self {
        Self
    }
}

fn forward_lines<R>(
    reader: R,
    avd_name: String,
    tx: broadcast::Sender<EmulatorEvent>,
    wrap: fn(String) -> EmulatorEvent,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    // Detached: nothing awaits this task, and it ends when the pipe closes.
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            info!("[AVD OUTPUT {}] {}", avd_name, line);
            let _ = tx.send(wrap(line));
        }
        debug!("Output stream for {} closed", avd_name);
    });
}

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn spawn(&self, avd_name: &str, program: &Path, args: &[String]) -> Result<EmulatorProcess> {
        debug!("Spawning {:?} {:?}", program, args);
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, avd_name.to_string(), tx.clone(), EmulatorEvent::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, avd_name.to_string(), tx.clone(), EmulatorEvent::Stderr);
        }

        Ok(EmulatorProcess::spawned(avd_name, child, tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detached_handle() {
        let mut process = EmulatorProcess::detached("Pixel_6_API_33");
        assert!(!process.is_running());
        assert_eq!(process.pid(), None);
        assert_eq!(process.wait().await.unwrap(), None);
        process.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_forwarded_to_subscribers() {
        let mut process = TokioLauncher::new()
            .spawn(
                "fake",
                Path::new("/bin/sh"),
                &["-c".to_string(), "sleep 0.2; echo booting".to_string()],
            )
            .await
            .unwrap();
        let mut output = process.subscribe();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), output.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, EmulatorEvent::Stdout("booting".into()));
        assert_eq!(process.wait().await.unwrap(), Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_publishes_exit() {
        let mut process = TokioLauncher::new()
            .spawn("fake", Path::new("/bin/sh"), &["-c".to_string(), "sleep 60".to_string()])
            .await
            .unwrap();
        let mut output = process.subscribe();
        assert!(process.is_running());

        process.kill().await.unwrap();

        assert!(!process.is_running());
        assert_eq!(output.try_recv().unwrap(), EmulatorEvent::Exited(None));
    }
}
