//! Test doubles for the process, console and launcher seams.
//!
//! Replies are matched by substring against the space-joined argument list.
//! The last reply of a script repeats forever.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use droidlink_core::{BridgeConfig, Error, Result};

use crate::adb::AdbClient;
use crate::console::EmulatorConsole;
use crate::process::{EmulatorProcess, ProcessLauncher};
use crate::runner::CommandRunner;

#[derive(Debug, Clone)]
pub enum Reply {
    Out(String),
    Fail(String),
    /// Sleep for the whole timeout, then report a timeout
    Hang,
}

struct Rule {
    needle: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    calls: Vec<String>,
}

/// A [`CommandRunner`] that answers from a script and records every call
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<State>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, needle: &str, replies: Vec<Reply>) {
        self.state.lock().rules.push(Rule {
            needle: needle.to_string(),
            replies: replies.into(),
        });
    }

    pub fn reply(&self, needle: &str, stdout: &str) {
        self.script(needle, vec![Reply::Out(stdout.to_string())]);
    }

    pub fn fail(&self, needle: &str, message: &str) {
        self.script(needle, vec![Reply::Fail(message.to_string())]);
    }

    /// Every call so far, as space-joined arguments
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    fn next_reply(&self, joined: &str) -> Option<Reply> {
        let mut state = self.state.lock();
        state.calls.push(joined.to_string());
        let rule = state
            .rules
            .iter_mut()
            .find(|rule| joined.contains(&rule.needle) && !rule.replies.is_empty())?;
        if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<String> {
        let joined = args.join(" ");
        let command = format!("{} {}", program.display(), joined);
        match self.next_reply(&joined) {
            None => Ok(String::new()),
            Some(Reply::Out(stdout)) => Ok(stdout),
            Some(Reply::Fail(message)) => Err(Error::execution(command, message)),
            Some(Reply::Hang) => {
                tokio::time::sleep(timeout).await;
                Err(Error::Timeout {
                    command,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Build a session over a scripted runner with default configuration
pub fn client_with(runner: &ScriptedRunner) -> AdbClient {
    client_with_config(runner, &BridgeConfig::default())
}

pub fn client_with_config(runner: &ScriptedRunner, config: &BridgeConfig) -> AdbClient {
    AdbClient::with_runner(PathBuf::from("adb"), config, Arc::new(runner.clone()))
}

/// Console that reports a fixed AVD name per port
#[derive(Clone, Default)]
pub struct ScriptedConsole {
    names: Arc<Mutex<HashMap<u16, std::result::Result<String, String>>>>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn avd(&self, port: u16, name: &str) {
        self.names.lock().insert(port, Ok(name.to_string()));
    }

    pub fn broken(&self, port: u16, message: &str) {
        self.names.lock().insert(port, Err(message.to_string()));
    }
}

#[async_trait]
impl EmulatorConsole for ScriptedConsole {
    async fn send_command(&self, port: u16, command: &str) -> Result<String> {
        assert_eq!(command, "avd name");
        match self.names.lock().get(&port) {
            Some(Ok(name)) => Ok(name.clone()),
            Some(Err(message)) => Err(Error::Console(message.clone())),
            None => Err(Error::Console(format!("connection refused on {}", port))),
        }
    }
}

/// Launcher that records the command line instead of spawning it
#[derive(Clone, Default)]
pub struct RecordingLauncher {
    launches: Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.launches.lock().clone()
    }
}

#[async_trait]
impl ProcessLauncher for RecordingLauncher {
    async fn spawn(&self, avd_name: &str, program: &Path, args: &[String]) -> Result<EmulatorProcess> {
        self.launches
            .lock()
            .push((program.to_path_buf(), args.to_vec()));
        Ok(EmulatorProcess::detached(avd_name))
    }
}
