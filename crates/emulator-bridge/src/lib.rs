//! Android Debug Bridge client
//!
//! Drives `adb` and the emulator binary as external processes: device
//! discovery, scoped command execution with recovery, AVD launch and
//! readiness waits.

pub mod adb;
pub mod avd;
pub mod console;
pub mod device;
pub mod emulator;
pub mod process;
pub mod retry;
pub mod runner;
pub mod session;
pub mod tools;

#[cfg(test)]
mod test_utils;

pub use adb::AdbClient;
pub use avd::{AvdInfo, check_avd_exists, list_avds};
pub use console::{EmulatorConsole, TelnetConsole};
pub use device::{Endpoint, EndpointState, parse_device_list};
pub use emulator::{EmulatorLauncher, KillCommand, LaunchOptions};
pub use process::{EmulatorEvent, EmulatorProcess, ProcessLauncher, TokioLauncher};
pub use retry::RetryBudget;
pub use runner::{CommandRunner, ExecOptions, ProcessRunner};
pub use session::{ExecutableDescriptor, SessionTarget};
pub use tools::SdkTools;
