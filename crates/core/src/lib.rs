//! droidlink Core - shared types
//!
//! This crate provides the error taxonomy, configuration and event bus
//! shared by the adb session and emulator lifecycle layers.

pub mod config;
pub mod events;
pub mod error;

pub use config::{BridgeConfig, EmulatorConfig, DEFAULT_ADB_SERVER_PORT};
pub use events::{Event, EventBus, EventSubscription, LaunchState, Poll, RestartOutcome};
pub use error::{classify_message, Error, FailureClass, Result};

/// droidlink version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
