//! droidlink - adb session and emulator lifecycle tool
//!
//! Lists devices, launches AVDs and waits for them to boot, and runs
//! commands against a selected device with automatic bridge recovery.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use droidlink::commands::{
    AvdsCommand, DevicesCommand, KillAllCommand, LaunchCommand, LsCommand, RebootCommand,
    ShellCommand, WaitCommand,
};
use droidlink_core::{BridgeConfig, Error};

#[derive(Parser)]
#[command(name = "droidlink")]
#[command(about = "Resilient adb session and emulator lifecycle management")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected devices
    Devices {
        /// Include offline devices
        #[arg(long)]
        all: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured AVDs
    Avds {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Launch an AVD and wait until it has booted
    Launch {
        /// AVD name (a leading '@' is accepted)
        avd: String,

        /// Device language (e.g. en)
        #[arg(long)]
        language: Option<String>,

        /// Device country (e.g. US)
        #[arg(long)]
        locale: Option<String>,

        /// Extra emulator arguments, whitespace separated
        #[arg(long, allow_hyphen_values = true)]
        args: Option<String>,

        /// Run without a window
        #[arg(long)]
        no_window: bool,

        /// Fail early if the AVD does not exist
        #[arg(long)]
        check: bool,

        /// Stay attached until the emulator exits
        #[arg(long)]
        attach: bool,
    },

    /// Wait until a device is connected and responsive
    Wait {
        /// Device serial
        #[arg(short, long)]
        serial: Option<String>,

        /// Timeout in seconds
        #[arg(short, long, default_value_t = 30)]
        timeout: u64,
    },

    /// Restart Android on a device and wait for boot completion
    Reboot {
        /// Device serial (defaults to the first connected device)
        #[arg(short, long)]
        serial: Option<String>,
    },

    /// Run a shell command on a device
    Shell {
        /// Device serial
        serial: String,

        /// Command and arguments
        #[arg(last = true, required = true)]
        args: Vec<String>,
    },

    /// List a directory on a device
    Ls {
        /// Device serial
        serial: String,

        /// Remote path
        path: String,
    },

    /// Kill every emulator process on this host
    KillAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(ref path) => BridgeConfig::load_from(path).await?,
        None => BridgeConfig::load().await?,
    };
    debug!("Config: {:?}", config);
    info!("droidlink v{}", droidlink::VERSION);

    let result = match cli.command {
        Commands::Devices { all, json } => DevicesCommand { all, json }.execute(&config).await,
        Commands::Avds { json } => AvdsCommand { json }.execute(&config).await,
        Commands::Launch {
            avd,
            language,
            locale,
            args,
            no_window,
            check,
            attach,
        } => {
            LaunchCommand {
                avd,
                language,
                locale,
                args,
                no_window,
                check,
                attach,
            }
            .execute(&config)
            .await
        }
        Commands::Wait { serial, timeout } => {
            WaitCommand {
                serial,
                timeout_secs: timeout,
            }
            .execute(&config)
            .await
        }
        Commands::Reboot { serial } => RebootCommand { serial }.execute(&config).await,
        Commands::Shell { serial, args } => ShellCommand { serial, args }.execute(&config).await,
        Commands::Ls { serial, path } => LsCommand { serial, path }.execute(&config).await,
        Commands::KillAll => KillAllCommand.execute(&config).await,
    };

    result.map_err(|e| match e.downcast::<Error>() {
        Ok(err) => anyhow::anyhow!(err.user_message()),
        Err(other) => other,
    })
}
