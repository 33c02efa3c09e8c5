//! Emulator Lifecycle
//!
//! Launches AVDs and waits for them, or for any device, to become usable.
//!
//! A launch moves through [`LaunchState`]: the process is started detached,
//! then the AVD must register with adb under its console name, then the boot
//! animation must stop. Every transition is logged and published on the
//! session's event bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use droidlink_core::{BridgeConfig, EmulatorConfig, Error, Event, LaunchState, Poll, Result};

use crate::adb::AdbClient;
use crate::avd::{self, AvdInfo};
use crate::console::{EmulatorConsole, TelnetConsole};
use crate::device::Endpoint;
use crate::process::{EmulatorProcess, ProcessLauncher, TokioLauncher};
use crate::retry::RetryBudget;
use crate::runner::{CommandRunner, ExecOptions, ProcessRunner, DEFAULT_EXEC_TIMEOUT};
use crate::tools::SdkTools;

/// Property that reads `stopped` once the boot animation is done
pub const BOOT_ANIM_PROPERTY: &str = "init.svc.bootanim";

/// Property that reads `1` once the system has booted
pub const BOOT_COMPLETED_PROPERTY: &str = "sys.boot_completed";

/// Delay between registration checks for a launched AVD
pub const AVD_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Delay between boot animation checks
pub const BOOT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Attempts for [`AdbClient::wait_for_device`]
pub const WAIT_FOR_DEVICE_ATTEMPTS: u32 = 3;

/// Settle time between `stop` and `start` during a reboot
pub const REBOOT_SETTLE_DELAY: Duration = Duration::from_millis(2000);

/// Boot completion checks after a reboot
pub const REBOOT_POLL_ATTEMPTS: u32 = 90;

/// Delay between boot completion checks after a reboot
pub const REBOOT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Delay between checks that a killed emulator has gone
pub const KILL_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Emulator launch options
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Device language, passed as `persist.sys.language` (lowercased)
    pub language: Option<String>,
    /// Device country, passed as `persist.sys.country` (uppercased)
    pub locale: Option<String>,
    /// GPU mode (auto, host, swiftshader_indirect, etc.)
    pub gpu: Option<String>,
    /// Run without a window
    pub no_window: bool,
    /// Disable audio
    pub no_audio: bool,
    /// Skip the boot animation
    pub no_boot_anim: bool,
    /// Wipe user data on launch
    pub wipe_data: bool,
    /// Ignore the quick-boot snapshot
    pub cold_boot: bool,
    /// Free-form arguments appended as given
    pub extra_args: Vec<String>,
    /// Verify the AVD exists before launching
    pub check_avd: bool,
    /// Deadline for the AVD to register with adb
    pub launch_timeout: Duration,
    /// Deadline for the boot animation to stop
    pub ready_timeout: Duration,
    /// Times the registration search is run
    pub retry_attempts: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self::from_config(&EmulatorConfig::default())
    }
}

impl LaunchOptions {
    pub fn from_config(config: &EmulatorConfig) -> Self {
        Self {
            language: None,
            locale: None,
            gpu: None,
            no_window: false,
            no_audio: false,
            no_boot_anim: false,
            wipe_data: false,
            cold_boot: false,
            extra_args: Vec::new(),
            check_avd: false,
            launch_timeout: Duration::from_millis(config.launch_timeout_ms),
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
            retry_attempts: config.retry_attempts,
        }
    }

    /// Options for headless/CI environments
    pub fn headless() -> Self {
        Self {
            gpu: Some("swiftshader_indirect".to_string()),
            no_audio: true,
            no_window: true,
            no_boot_anim: true,
            ..Default::default()
        }
    }

    /// Append whitespace-separated extra arguments
    pub fn args_from_str(mut self, args: &str) -> Self {
        self.extra_args
            .extend(args.split_whitespace().map(str::to_string));
        self
    }

    /// Build the emulator command line for an AVD
    pub fn to_args(&self, avd_name: &str) -> Vec<String> {
        let mut args = vec!["-avd".to_string(), avd_name.to_string()];

        if let Some(ref language) = self.language {
            args.push("-prop".to_string());
            args.push(format!("persist.sys.language={}", language.to_lowercase()));
        }

        if let Some(ref locale) = self.locale {
            args.push("-prop".to_string());
            args.push(format!("persist.sys.country={}", locale.to_uppercase()));
        }

        if let Some(ref gpu) = self.gpu {
            args.push("-gpu".to_string());
            args.push(gpu.clone());
        }

        if self.no_window {
            args.push("-no-window".to_string());
        }

        if self.no_audio {
            args.push("-no-audio".to_string());
        }

        if self.no_boot_anim {
            args.push("-no-boot-anim".to_string());
        }

        if self.wipe_data {
            args.push("-wipe-data".to_string());
        }

        if self.cold_boot {
            args.push("-no-snapshot-load".to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// OS command that terminates every emulator process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl KillCommand {
    pub fn for_platform() -> Self {
        let (program, args): (&str, &[&str]) = if cfg!(windows) {
            ("taskkill", &["/F", "/T", "/IM", "emulator.exe"])
        } else if cfg!(target_os = "macos") {
            ("/usr/bin/killall", &["-m", "emulator*"])
        } else {
            ("killall", &["-r", "^(emulator|qemu-system-).*"])
        };
        Self {
            program: PathBuf::from(program),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Emulator launcher
pub struct EmulatorLauncher {
    tools: SdkTools,
    runner: Arc<dyn CommandRunner>,
    launcher: Arc<dyn ProcessLauncher>,
    console: Arc<dyn EmulatorConsole>,
    kill_command: KillCommand,
}

impl EmulatorLauncher {
    /// Create a launcher with the default process, console and tool seams
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_parts(
            SdkTools::from_config(config),
            Arc::new(ProcessRunner::new()),
            Arc::new(TokioLauncher::new()),
            Arc::new(TelnetConsole::new(Duration::from_millis(
                config.emulator.console_timeout_ms,
            ))),
        )
    }

    pub fn with_parts(
        tools: SdkTools,
        runner: Arc<dyn CommandRunner>,
        launcher: Arc<dyn ProcessLauncher>,
        console: Arc<dyn EmulatorConsole>,
    ) -> Self {
        Self {
            tools,
            runner,
            launcher,
            console,
            kill_command: KillCommand::for_platform(),
        }
    }

    pub fn with_kill_command(mut self, kill_command: KillCommand) -> Self {
        self.kill_command = kill_command;
        self
    }

    fn transition(&self, adb: &AdbClient, avd_name: &str, state: LaunchState) {
        info!("Emulator {}: {}", avd_name, state);
        adb.events().emit(Event::LaunchStateChanged {
            avd_name: avd_name.to_string(),
            state,
        });
    }

    /// List all AVDs known to the emulator binary
    pub async fn list_avds(&self) -> Result<Vec<AvdInfo>> {
        let emulator = self.tools.emulator()?;
        avd::list_avds(self.runner.as_ref(), &emulator).await
    }

    /// Launch an AVD and wait until it has booted.
    ///
    /// The returned process belongs to the caller; the session ends up
    /// targeting the launched emulator. If registration or boot fails, the
    /// spawned emulator is killed before the error is returned.
    pub async fn launch(
        &self,
        adb: &mut AdbClient,
        avd_name: &str,
        options: LaunchOptions,
    ) -> Result<EmulatorProcess> {
        let avd_name = avd_name.strip_prefix('@').unwrap_or(avd_name);
        let result = self.drive_launch(adb, avd_name, &options).await;
        if let Err(ref e) = result {
            warn!("Launching {} failed: {}", avd_name, e);
            self.transition(adb, avd_name, LaunchState::Failed);
        }
        result
    }

    async fn drive_launch(
        &self,
        adb: &mut AdbClient,
        avd_name: &str,
        options: &LaunchOptions,
    ) -> Result<EmulatorProcess> {
        self.transition(adb, avd_name, LaunchState::Launching);
        let emulator = self.tools.emulator()?;
        if options.check_avd {
            avd::check_avd_exists(self.runner.as_ref(), &emulator, avd_name).await?;
        }

        let args = options.to_args(avd_name);
        debug!("Emulator args: {:?}", args);
        let mut process = self.launcher.spawn(avd_name, &emulator, &args).await?;

        if let Err(e) = self.await_boot(adb, avd_name, options).await {
            if let Err(kill_err) = process.kill().await {
                warn!("Could not kill {} after failed launch: {}", avd_name, kill_err);
            }
            return Err(e);
        }

        self.transition(adb, avd_name, LaunchState::Ready);
        Ok(process)
    }

    /// Registration then boot animation, for an already spawned emulator
    async fn await_boot(
        &self,
        adb: &mut AdbClient,
        avd_name: &str,
        options: &LaunchOptions,
    ) -> Result<()> {
        self.transition(adb, avd_name, LaunchState::WaitingForRegistration);
        let mut attempts = RetryBudget::attempts(options.retry_attempts.max(1));
        loop {
            attempts.start_attempt();
            match self
                .running_avd_with_retry(adb, avd_name, options.launch_timeout)
                .await
            {
                Ok(_) => break,
                Err(e) if !attempts.exhausted() => warn!("{}; searching again", e),
                Err(e) => return Err(e),
            }
        }

        self.transition(adb, avd_name, LaunchState::WaitingForBoot);
        adb.wait_for_emulator_ready(options.ready_timeout).await
    }

    /// Find a connected emulator running `avd_name` and select it.
    ///
    /// Emulators whose console does not answer are skipped.
    pub async fn running_avd(&self, adb: &mut AdbClient, avd_name: &str) -> Result<Option<Endpoint>> {
        let avd_name = avd_name.strip_prefix('@').unwrap_or(avd_name);
        let emulators = adb.list_emulators().await?;

        for emulator in emulators {
            let Some(port) = emulator.emulator_port else {
                continue;
            };
            adb.set_emulator_port(port);
            match self.console.send_command(port, "avd name").await {
                Ok(running) if running == avd_name => {
                    info!("Found {} running as {}", avd_name, emulator.id);
                    adb.select_device(&emulator);
                    return Ok(Some(emulator));
                }
                Ok(running) => debug!("{} is running {}", emulator.id, running),
                Err(e) => debug!("Console of {} did not answer: {}", emulator.id, e),
            }
        }

        Ok(None)
    }

    /// Poll [`EmulatorLauncher::running_avd`] until it matches or `timeout` elapses
    pub async fn running_avd_with_retry(
        &self,
        adb: &mut AdbClient,
        avd_name: &str,
        timeout: Duration,
    ) -> Result<Endpoint> {
        let budget = RetryBudget::deadline(timeout);
        loop {
            if budget.exhausted() {
                return Err(Error::AvdNotFound {
                    avd: avd_name.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            match self.running_avd(adb, avd_name).await {
                Ok(Some(endpoint)) => return Ok(endpoint),
                Ok(None) => debug!("{} not registered yet", avd_name),
                Err(e) => debug!("Listing emulators failed while waiting for {}: {}", avd_name, e),
            }
            tokio::time::sleep(AVD_POLL_INTERVAL).await;
        }
    }

    /// Terminate every emulator process on this host
    pub async fn kill_all(&self) -> Result<()> {
        info!("Killing all emulators");
        self.runner
            .run(&self.kill_command.program, &self.kill_command.args, DEFAULT_EXEC_TIMEOUT)
            .await?;
        Ok(())
    }
}

impl AdbClient {
    /// One read of the boot animation property
    pub async fn boot_animation_poll(&self) -> Poll {
        let outcome = match self.shell(&["getprop", BOOT_ANIM_PROPERTY]).await {
            Ok(value) if value.contains("stopped") => Poll::Ready,
            Ok(value) => Poll::Pending(value),
            Err(e) => Poll::Ignored(e.to_string()),
        };
        self.events.emit(Event::BootPoll {
            property: BOOT_ANIM_PROPERTY.to_string(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Wait for the selected emulator's boot animation to stop
    pub async fn wait_for_emulator_ready(&self, timeout: Duration) -> Result<()> {
        let budget = RetryBudget::deadline(timeout);
        loop {
            if budget.exhausted() {
                return Err(Error::BootTimeout {
                    what: format!("Emulator {}", self.device_id().unwrap_or("(unselected)")),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            match self.boot_animation_poll().await {
                Poll::Ready => {
                    info!("Boot animation stopped");
                    return Ok(());
                }
                Poll::Pending(value) => debug!("Boot animation state: {:?}", value),
                Poll::Ignored(e) => debug!("Boot animation read failed, ignoring: {}", e),
            }
            tokio::time::sleep(BOOT_POLL_INTERVAL).await;
        }
    }

    /// Wait until adb reports the device and it answers a ping.
    ///
    /// The timeout is split evenly across attempts and each attempt runs
    /// single commands within its slice; between attempts the server is
    /// restarted and devices are listed again.
    pub async fn wait_for_device(&self, timeout: Duration) -> Result<()> {
        let slice = timeout / WAIT_FOR_DEVICE_ATTEMPTS;
        let started = Instant::now();
        let mut budget = RetryBudget::attempts(WAIT_FOR_DEVICE_ATTEMPTS);

        loop {
            budget.start_attempt();
            let err = match self.wait_then_ping(slice).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if budget.exhausted() {
                return Err(Error::DeviceNotReady {
                    timeout_ms: timeout.as_millis() as u64,
                    waited_ms: started.elapsed().as_millis() as u64,
                    attempts: WAIT_FOR_DEVICE_ATTEMPTS,
                    last_error: err.to_string(),
                });
            }

            warn!("Device not ready, restarting adb: {}", err);
            self.restart_server().await;
            if let Err(e) = self.list_devices().await {
                debug!("Listing devices after restart failed: {}", e);
            }
        }
    }

    async fn wait_then_ping(&self, slice: Duration) -> Result<()> {
        let started = Instant::now();
        self.exec(&["wait-for-device"], ExecOptions::with_timeout(slice))
            .await?;

        let remaining = slice.saturating_sub(started.elapsed());
        if self.ping_once(ExecOptions::with_timeout(remaining)).await? {
            Ok(())
        } else {
            Err(Error::execution("shell echo ping", "device did not answer ping"))
        }
    }

    /// Restart Android on the selected device and wait for boot completion
    pub async fn reboot(&self) -> Result<()> {
        info!("Rebooting {}", self.device_id().unwrap_or("device"));
        self.shell(&["stop"]).await?;
        tokio::time::sleep(REBOOT_SETTLE_DELAY).await;
        self.set_device_property(BOOT_COMPLETED_PROPERTY, "0").await?;
        self.shell(&["start"]).await?;

        let mut budget = RetryBudget::attempts(REBOOT_POLL_ATTEMPTS);
        while !budget.exhausted() {
            budget.start_attempt();
            let outcome = match self.device_property(BOOT_COMPLETED_PROPERTY).await {
                Ok(value) if value == "1" => Poll::Ready,
                Ok(value) => Poll::Pending(value),
                Err(e) => Poll::Ignored(e.to_string()),
            };
            self.events.emit(Event::BootPoll {
                property: BOOT_COMPLETED_PROPERTY.to_string(),
                outcome: outcome.clone(),
            });

            match outcome {
                Poll::Ready => {
                    info!("Reboot complete");
                    return Ok(());
                }
                Poll::Pending(value) => debug!("{} = {:?}, still booting", BOOT_COMPLETED_PROPERTY, value),
                Poll::Ignored(e) => debug!("Reading {} failed, still booting: {}", BOOT_COMPLETED_PROPERTY, e),
            }

            if !budget.exhausted() {
                tokio::time::sleep(REBOOT_POLL_INTERVAL).await;
            }
        }

        Err(Error::BootTimeout {
            what: format!("{} after reboot", self.device_id().unwrap_or("Device")),
            timeout_ms: REBOOT_POLL_INTERVAL.as_millis() as u64 * REBOOT_POLL_ATTEMPTS as u64,
        })
    }

    /// Shut down the selected emulator and wait for it to disappear.
    ///
    /// Returns `false` when the selected emulator was not connected.
    pub async fn kill_emulator(&self, timeout: Duration) -> Result<bool> {
        let device_id = self
            .device_id()
            .ok_or_else(|| Error::NoEmulator("no emulator selected".into()))?
            .to_string();

        if !self.is_emulator_connected(&device_id).await? {
            debug!("{} is not connected, nothing to kill", device_id);
            return Ok(false);
        }

        self.exec_with_retry(&["emu", "kill"], self.exec_options()).await?;
        self.events.emit(Event::EmulatorKilled {
            device_id: device_id.clone(),
        });

        let budget = RetryBudget::deadline(timeout);
        loop {
            if budget.exhausted() {
                return Err(Error::Timeout {
                    command: format!("emu kill ({})", device_id),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            if !self.is_emulator_connected(&device_id).await? {
                info!("Emulator {} stopped", device_id);
                return Ok(true);
            }
            tokio::time::sleep(KILL_POLL_INTERVAL).await;
        }
    }

    async fn is_emulator_connected(&self, device_id: &str) -> Result<bool> {
        Ok(self
            .list_emulators()
            .await?
            .iter()
            .any(|e| e.id == device_id))
    }
}
