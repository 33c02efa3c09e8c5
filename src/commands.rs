//! CLI commands for droidlink
//!
//! Provides command-line interface functionality for automation and scripting.

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use droidlink_core::BridgeConfig;
use droidlink_emulator_bridge::{AdbClient, EmulatorLauncher, LaunchOptions};

/// Open a session, bound to `serial` or to the first connected device
async fn session(config: &BridgeConfig, serial: Option<&str>) -> Result<AdbClient> {
    let mut adb = AdbClient::from_config(config)?;
    match serial {
        Some(serial) => adb.set_device_id(serial),
        None => {
            let devices = adb.connected_devices().await?;
            if let Some(device) = devices.first() {
                adb.select_device(device);
            }
        }
    }
    Ok(adb)
}

/// Device list command
pub struct DevicesCommand {
    pub all: bool,
    pub json: bool,
}

impl DevicesCommand {
    /// List connected devices
    pub async fn execute(&self, config: &BridgeConfig) -> Result<()> {
        let adb = AdbClient::from_config(config)?;
        let devices = if self.all {
            adb.list_all_devices().await?
        } else {
            adb.list_devices().await?
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&devices)?);
        } else if devices.is_empty() {
            println!("No devices connected");
        } else {
            println!("Connected devices:");
            for device in devices {
                match device.emulator_port {
                    Some(port) => println!("  {} - {} (console {})", device.id, device.state.as_str(), port),
                    None => println!("  {} - {}", device.id, device.state.as_str()),
                }
            }
        }

        Ok(())
    }
}

/// AVD list command
pub struct AvdsCommand {
    pub json: bool,
}

impl AvdsCommand {
    pub async fn execute(&self, config: &BridgeConfig) -> Result<()> {
        let avds = EmulatorLauncher::new(config).list_avds().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&avds)?);
        } else if avds.is_empty() {
            println!("No AVDs configured");
        } else {
            println!("Available AVDs:");
            for avd in avds {
                match avd.api_level {
                    Some(api) => println!("  {} - {} (API {})", avd.name, avd.display_name, api),
                    None => println!("  {} - {}", avd.name, avd.display_name),
                }
            }
        }

        Ok(())
    }
}

/// Emulator launch command
pub struct LaunchCommand {
    pub avd: String,
    pub language: Option<String>,
    pub locale: Option<String>,
    pub args: Option<String>,
    pub no_window: bool,
    pub check: bool,
    /// Stay attached until the emulator exits
    pub attach: bool,
}

impl LaunchCommand {
    /// Launch the AVD and wait for it to boot
    pub async fn execute(&self, config: &BridgeConfig) -> Result<()> {
        let mut options = LaunchOptions::from_config(&config.emulator);
        options.language = self.language.clone();
        options.locale = self.locale.clone();
        options.no_window = self.no_window;
        options.check_avd = self.check;
        if let Some(ref args) = self.args {
            options = options.args_from_str(args);
        }

        let mut adb = AdbClient::from_config(config)?;
        let launcher = EmulatorLauncher::new(config);
        let mut process = launcher.launch(&mut adb, &self.avd, options).await?;

        println!(
            "Emulator {} ready as {}",
            self.avd,
            adb.device_id().unwrap_or("(unknown)")
        );

        if self.attach {
            info!("Attached to {} (pid {:?})", process.avd_name, process.pid());
            let code = process.wait().await?;
            info!("Emulator exited with {:?}", code);
        }

        Ok(())
    }
}

/// Wait-for-device command
pub struct WaitCommand {
    pub serial: Option<String>,
    pub timeout_secs: u64,
}

impl WaitCommand {
    pub async fn execute(&self, config: &BridgeConfig) -> Result<()> {
        let mut adb = AdbClient::from_config(config)?;
        if let Some(ref serial) = self.serial {
            adb.set_device_id(serial);
        }

        adb.wait_for_device(Duration::from_secs(self.timeout_secs))
            .await?;
        println!("Device ready");
        Ok(())
    }
}

/// Soft reboot command
pub struct RebootCommand {
    pub serial: Option<String>,
}

impl RebootCommand {
    pub async fn execute(&self, config: &BridgeConfig) -> Result<()> {
        let adb = session(config, self.serial.as_deref()).await?;
        adb.reboot().await?;
        println!("Reboot complete");
        Ok(())
    }
}

/// Shell command
pub struct ShellCommand {
    pub serial: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    pub async fn execute(&self, config: &BridgeConfig) -> Result<()> {
        let adb = session(config, Some(&self.serial)).await?;
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let output = adb.shell(&args).await?;
        println!("{}", output);
        Ok(())
    }
}

/// Remote directory listing command
pub struct LsCommand {
    pub serial: String,
    pub path: String,
}

impl LsCommand {
    pub async fn execute(&self, config: &BridgeConfig) -> Result<()> {
        let adb = session(config, Some(&self.serial)).await?;
        for entry in adb.ls(&self.path).await? {
            println!("{}", entry);
        }
        Ok(())
    }
}

/// Kill every emulator on this host
pub struct KillAllCommand;

impl KillAllCommand {
    pub async fn execute(&self, config: &BridgeConfig) -> Result<()> {
        EmulatorLauncher::new(config).kill_all().await?;
        println!("All emulators killed");
        Ok(())
    }
}
