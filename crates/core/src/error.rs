//! Error types for droidlink
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Substrings that mark an adb failure as a dropped connection.
const CONNECTION_LOST_SIGNALS: [&str; 2] = ["protocol fault (no status)", "error: device not found"];

/// How the retry layer should react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The bridge lost the device; restart/rediscovery may recover it
    ConnectionLost,
    /// Anything else; surfaced without recovery
    Fatal,
}

/// Main error type for droidlink
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Unexpected output while listing devices: {0}")]
    Discovery(String),

    #[error("Command '{command}' failed: {message}")]
    Execution { command: String, message: String },

    #[error("Command '{command}' timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Could not find a connected Android device after waiting {waited_ms}ms{}", last_error_suffix(.last_error))]
    NoDevice {
        waited_ms: u64,
        last_error: Option<String>,
    },

    #[error("No connected emulator found: {0}")]
    NoEmulator(String),

    #[error("AVD '{avd}' did not appear among connected emulators within {timeout_ms}ms")]
    AvdNotFound { avd: String, timeout_ms: u64 },

    #[error("AVD '{avd}' does not exist (available: {})", .available.join(", "))]
    UnknownAvd { avd: String, available: Vec<String> },

    #[error("{what} did not finish booting within {timeout_ms}ms")]
    BootTimeout { what: String, timeout_ms: u64 },

    #[error("Device did not become ready within {timeout_ms}ms ({attempts} attempts over {waited_ms}ms): {last_error}")]
    DeviceNotReady {
        timeout_ms: u64,
        waited_ms: u64,
        attempts: u32,
        last_error: String,
    },

    #[error("Emulator console error: {0}")]
    Console(String),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(message) => format!(" (last error: {})", message),
        None => String::new(),
    }
}

/// Result type alias for droidlink operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build an execution error for a rendered command line
    pub fn execution(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Execution {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Classify this failure from its rendered text
    pub fn failure_class(&self) -> FailureClass {
        classify_message(&self.to_string())
    }

    /// Check if reconnecting to the device may recover from this error
    pub fn is_recoverable(&self) -> bool {
        self.failure_class() == FailureClass::ConnectionLost
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::Io(e) => format!("File operation failed: {}", e),
            Error::ToolNotFound(tool) => {
                format!("{} not found. Set ANDROID_HOME or add it to PATH.", tool)
            }
            Error::NoDevice { .. } => {
                format!("{}. Is a device attached and authorized?", self)
            }
            _ => self.to_string(),
        }
    }
}

/// Classify raw failure text, case-insensitively
pub fn classify_message(message: &str) -> FailureClass {
    let lowered = message.to_lowercase();
    if CONNECTION_LOST_SIGNALS
        .iter()
        .any(|signal| lowered.contains(signal))
    {
        FailureClass::ConnectionLost
    } else {
        FailureClass::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found_is_connection_lost() {
        let err = Error::execution("adb shell ls", "exited with 1: error: device not found");
        assert_eq!(err.failure_class(), FailureClass::ConnectionLost);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_protocol_fault_matches_case_insensitively() {
        assert_eq!(
            classify_message("adb: Protocol Fault (No Status)"),
            FailureClass::ConnectionLost
        );
    }

    #[test]
    fn test_other_failures_are_fatal() {
        let err = Error::execution("adb install x.apk", "INSTALL_FAILED_INSUFFICIENT_STORAGE");
        assert_eq!(err.failure_class(), FailureClass::Fatal);
        assert_eq!(
            Error::Discovery("garbage".into()).failure_class(),
            FailureClass::Fatal
        );
    }

    #[test]
    fn test_timeouts_are_not_recoverable() {
        let err = Error::Timeout {
            command: "adb wait-for-device".into(),
            timeout_ms: 10000,
        };
        assert_eq!(err.failure_class(), FailureClass::Fatal);
        assert!(!err.is_recoverable());
        assert!(!Error::NoDevice { waited_ms: 1, last_error: None }.is_recoverable());
    }

    #[test]
    fn test_user_message_hints() {
        let err = Error::ToolNotFound("adb (searched /sdk/platform-tools)".into());
        assert!(err.user_message().contains("ANDROID_HOME"));

        let err = Error::NoDevice {
            waited_ms: 20000,
            last_error: None,
        };
        assert!(err.user_message().ends_with("Is a device attached and authorized?"));

        let err = Error::Console("unknown command".into());
        assert_eq!(err.user_message(), err.to_string());
    }

    #[test]
    fn test_no_device_message_names_the_wait() {
        let err = Error::NoDevice {
            waited_ms: 20000,
            last_error: Some("connection refused".into()),
        };
        let text = err.to_string();
        assert!(text.contains("20000ms"));
        assert!(text.contains("connection refused"));

        let bare = Error::NoDevice {
            waited_ms: 500,
            last_error: None,
        };
        assert!(!bare.to_string().contains("last error"));
    }
}
