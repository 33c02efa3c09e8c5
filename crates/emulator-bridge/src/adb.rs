//! ADB (Android Debug Bridge) Client
//!
//! A session against the adb binary: device discovery, server control and
//! single-attempt command execution. Retrying wrappers live in
//! [`crate::retry`], device selection in [`crate::session`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use droidlink_core::{BridgeConfig, Event, EventBus, RestartOutcome, Result};

use crate::device::{parse_device_list, parse_device_list_with_offline, Endpoint};
use crate::runner::{clean_output, CommandRunner, ExecOptions, ProcessRunner};
use crate::session::{ExecutableDescriptor, SessionTarget};
use crate::tools::SdkTools;

/// Marker adb prints for a missing remote path
const NO_SUCH_FILE: &str = "No such file";

/// ADB Client
///
/// Owns the session target. Commands that go through [`AdbClient::exec`]
/// are scoped to the selected device; discovery and server control are not.
pub struct AdbClient {
    pub(crate) executable: ExecutableDescriptor,
    pub(crate) target: SessionTarget,
    runner: Arc<dyn CommandRunner>,
    pub(crate) events: Arc<EventBus>,
    suppress_kill_server: bool,
    exec_timeout: Duration,
    pub(crate) device_timeout: Duration,
}

impl AdbClient {
    /// Create a client for an adb binary, running it as a child process
    pub fn new(adb_path: PathBuf, config: &BridgeConfig) -> Self {
        Self::with_runner(adb_path, config, Arc::new(ProcessRunner::new()))
    }

    /// Create a client with a custom command runner
    pub fn with_runner(
        adb_path: PathBuf,
        config: &BridgeConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            executable: ExecutableDescriptor::new(adb_path, config.adb_server_port),
            target: SessionTarget::default(),
            runner,
            events: Arc::new(EventBus::new()),
            suppress_kill_server: config.suppress_kill_server,
            exec_timeout: config.exec_timeout(),
            device_timeout: config.device_timeout(),
        }
    }

    /// Locate adb from the configuration and create a client
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let adb = SdkTools::from_config(config).adb()?;
        Ok(Self::new(adb, config))
    }

    /// Publish events on a shared bus
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn executable(&self) -> &ExecutableDescriptor {
        &self.executable
    }

    /// Options carrying the configured per-command timeout
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions::with_timeout(self.exec_timeout)
    }

    /// Run adb with the default prefix only and clean the output
    async fn run_unscoped(&self, args: &[&str]) -> Result<String> {
        let mut full_args = self.executable.default_args.clone();
        full_args.extend(args.iter().map(|s| s.to_string()));
        let stdout = self
            .runner
            .run(&self.executable.path, &full_args, self.exec_timeout)
            .await?;
        Ok(clean_output(&stdout))
    }

    /// Run one device-scoped adb command, without retrying
    pub async fn exec(&self, args: &[&str], options: ExecOptions) -> Result<String> {
        let mut full_args = self.executable.default_args.clone();
        full_args.extend(self.target.scope_args());
        full_args.extend(args.iter().map(|s| s.to_string()));

        debug!("adb {:?}", full_args);
        let stdout = self
            .runner
            .run(&self.executable.path, &full_args, options.timeout)
            .await?;
        Ok(clean_output(&stdout))
    }

    /// List connected devices, hiding offline ones
    pub async fn list_devices(&self) -> Result<Vec<Endpoint>> {
        let output = self.run_unscoped(&["devices"]).await?;
        parse_device_list(&output)
    }

    /// List connected devices including offline ones
    pub async fn list_all_devices(&self) -> Result<Vec<Endpoint>> {
        let output = self.run_unscoped(&["devices"]).await?;
        parse_device_list_with_offline(&output)
    }

    /// List connected emulators
    pub async fn list_emulators(&self) -> Result<Vec<Endpoint>> {
        let devices = self.list_devices().await?;
        Ok(devices.into_iter().filter(Endpoint::is_emulator).collect())
    }

    /// Kill the adb server so the next command starts a fresh one.
    ///
    /// Never fails: the next discovery call is what decides whether the
    /// bridge is usable again.
    pub async fn restart_server(&self) -> RestartOutcome {
        let outcome = if self.suppress_kill_server {
            debug!("Not restarting adb since 'suppress_kill_server' is on");
            RestartOutcome::Suppressed
        } else {
            match self.run_unscoped(&["kill-server"]).await {
                Ok(_) => {
                    debug!("adb server killed");
                    RestartOutcome::Restarted
                }
                Err(e) => {
                    warn!("Error killing adb server, going to see if it's online anyway: {}", e);
                    RestartOutcome::Failed(e.to_string())
                }
            }
        };
        self.events.emit(Event::ServerRestart(outcome.clone()));
        outcome
    }

    /// List a remote path; a missing path yields an empty list
    pub async fn ls(&self, remote_path: &str) -> Result<Vec<String>> {
        let stdout = match self.shell(&["ls", remote_path]).await {
            Ok(stdout) => stdout,
            Err(e) if e.to_string().contains(NO_SUCH_FILE) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !line.contains(NO_SUCH_FILE))
            .map(str::to_string)
            .collect())
    }

    pub async fn file_exists(&self, remote_path: &str) -> Result<bool> {
        Ok(!self.ls(remote_path).await?.is_empty())
    }

    /// Get device property
    pub async fn device_property(&self, prop: &str) -> Result<String> {
        let output = self.shell(&["getprop", prop]).await?;
        Ok(output.trim().to_string())
    }

    /// Set device property
    pub async fn set_device_property(&self, prop: &str, value: &str) -> Result<()> {
        self.shell(&["setprop", prop, value]).await?;
        Ok(())
    }

    /// Check the device answers shell commands
    pub async fn ping(&self) -> Result<bool> {
        let output = self.shell(&["echo", "ping"]).await?;
        Ok(output.starts_with("ping"))
    }

    /// [`AdbClient::ping`] as a single attempt with its own timeout
    pub async fn ping_once(&self, options: ExecOptions) -> Result<bool> {
        let output = self.exec(&["shell", "echo", "ping"], options).await?;
        Ok(output.starts_with("ping"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::EndpointState;
    use crate::test_utils::{client_with, client_with_config, Reply, ScriptedRunner};
    use droidlink_core::Error;

    #[tokio::test]
    async fn test_list_devices_is_unscoped() {
        let runner = ScriptedRunner::new();
        runner.reply("devices", "List of devices attached\nemulator-5554\tdevice\n");
        let mut adb = client_with(&runner);
        adb.set_device_id("emulator-5554");

        let devices = adb.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(runner.calls(), vec!["devices"]);
    }

    #[tokio::test]
    async fn test_list_all_devices_reports_offline() {
        let runner = ScriptedRunner::new();
        runner.reply("devices", "List of devices attached\nemulator-5554\toffline\n");
        let adb = client_with(&runner);

        assert!(adb.list_devices().await.unwrap().is_empty());
        let all = adb.list_all_devices().await.unwrap();
        assert_eq!(all[0].state, EndpointState::Offline);
    }

    #[tokio::test]
    async fn test_list_emulators_subset_with_ports() {
        let runner = ScriptedRunner::new();
        runner.reply(
            "devices",
            "List of devices attached\nemulator-5554\tdevice\n0123456789ABCDEF\tdevice\nemulator-5556\tdevice\n",
        );
        let adb = client_with(&runner);

        let all = adb.list_devices().await.unwrap();
        let emulators = adb.list_emulators().await.unwrap();
        assert_eq!(emulators.len(), 2);
        assert!(emulators.iter().all(|e| e.emulator_port.is_some()));
        assert!(emulators.iter().all(|e| all.contains(e)));
    }

    #[tokio::test]
    async fn test_exec_is_scoped_and_prefixed() {
        let runner = ScriptedRunner::new();
        runner.reply("getprop", "WARNING: linker: noise\n  1 \n");
        let mut config = BridgeConfig::default();
        config.adb_server_port = 5038;
        let mut adb = client_with_config(&runner, &config);
        adb.set_device_id("emulator-5554");

        let out = adb.exec(&["shell", "getprop", "sys.boot_completed"], ExecOptions::default()).await.unwrap();
        assert_eq!(out, "1");
        assert_eq!(
            runner.calls(),
            vec!["-P 5038 -s emulator-5554 shell getprop sys.boot_completed"]
        );
    }

    #[tokio::test]
    async fn test_restart_server_outcomes() {
        let runner = ScriptedRunner::new();
        runner.script(
            "kill-server",
            vec![Reply::Out(String::new()), Reply::Fail("cannot connect to daemon".into())],
        );
        let adb = client_with(&runner);
        let events = adb.events().subscribe();

        assert_eq!(adb.restart_server().await, RestartOutcome::Restarted);
        let failed = adb.restart_server().await;
        assert!(matches!(failed, RestartOutcome::Failed(ref m) if m.contains("cannot connect")));
        assert_eq!(events.drain().len(), 2);
    }

    #[tokio::test]
    async fn test_restart_server_suppressed() {
        let runner = ScriptedRunner::new();
        let mut config = BridgeConfig::default();
        config.suppress_kill_server = true;
        let adb = client_with_config(&runner, &config);

        assert_eq!(adb.restart_server().await, RestartOutcome::Suppressed);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ls_filters_and_file_exists() {
        let runner = ScriptedRunner::new();
        runner.reply("ls /sdcard/Download", "a.txt\n  b.png  \n\n");
        runner.reply("ls /sdcard/missing", "ls: /sdcard/missing: No such file or directory\n");
        let adb = client_with(&runner);

        assert_eq!(adb.ls("/sdcard/Download").await.unwrap(), vec!["a.txt", "b.png"]);
        assert!(adb.file_exists("/sdcard/Download").await.unwrap());
        assert!(!adb.file_exists("/sdcard/missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_ls_missing_path_is_empty_every_time() {
        let runner = ScriptedRunner::new();
        runner.fail("ls /data/nope", "exited with 1: ls: /data/nope: No such file or directory");
        let adb = client_with(&runner);

        for _ in 0..3 {
            assert!(adb.ls("/data/nope").await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_ls_other_failures_propagate() {
        let runner = ScriptedRunner::new();
        runner.fail("ls /data", "exited with 1: ls: /data: Permission denied");
        let adb = client_with(&runner);

        let err = adb.ls("/data").await.unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
    }

    #[tokio::test]
    async fn test_properties_and_ping() {
        let runner = ScriptedRunner::new();
        runner.reply("getprop ro.build.version.sdk", "34\n");
        runner.reply("echo ping", "ping\n");
        let adb = client_with(&runner);

        assert_eq!(adb.device_property("ro.build.version.sdk").await.unwrap(), "34");
        adb.set_device_property("sys.boot_completed", "0").await.unwrap();
        assert!(adb.ping().await.unwrap());
        assert_eq!(runner.count("shell setprop sys.boot_completed 0"), 1);
    }
}
