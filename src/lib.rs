//! droidlink - resilient adb sessions and emulator lifecycle
//!
//! ## Architecture
//!
//! - `droidlink-core`: error taxonomy, configuration, lifecycle events
//! - `droidlink-emulator-bridge`: device discovery, scoped execution with
//!   recovery, emulator launch and readiness waits

#![warn(clippy::all)]

pub mod commands;

pub use droidlink_core as core;
pub use droidlink_emulator_bridge as bridge;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use droidlink_core::{BridgeConfig, Error, Event, EventBus, Result};
    pub use droidlink_emulator_bridge::{
        AdbClient, Endpoint, EndpointState, EmulatorLauncher, LaunchOptions, SdkTools,
    };
}
