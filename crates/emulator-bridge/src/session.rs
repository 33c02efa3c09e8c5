//! Session Target and Device Selection
//!
//! A session is bound to at most one device. The binding is a single value
//! that is replaced wholesale, so the device id, console port and scoping
//! flags never disagree.

use std::path::PathBuf;

use tracing::{debug, info};

use droidlink_core::{Error, Event, Result, DEFAULT_ADB_SERVER_PORT};

use crate::adb::AdbClient;
use crate::device::{port_from_id, Endpoint};

/// The adb binary plus the arguments every invocation starts with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableDescriptor {
    pub path: PathBuf,
    pub default_args: Vec<String>,
}

impl ExecutableDescriptor {
    pub fn new(path: PathBuf, server_port: u16) -> Self {
        let default_args = if server_port != DEFAULT_ADB_SERVER_PORT {
            vec!["-P".to_string(), server_port.to_string()]
        } else {
            Vec::new()
        };
        Self { path, default_args }
    }
}

/// The device a session currently targets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTarget {
    device_id: Option<String>,
    emulator_port: Option<u16>,
}

impl SessionTarget {
    /// Target a device; the console port is derived from its serial
    pub fn for_device(id: &str) -> Self {
        Self {
            device_id: Some(id.to_string()),
            emulator_port: port_from_id(id),
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn emulator_port(&self) -> Option<u16> {
        self.emulator_port
    }

    /// Arguments that scope a command to the selected device
    pub fn scope_args(&self) -> Vec<String> {
        match &self.device_id {
            Some(id) => vec!["-s".to_string(), id.clone()],
            None => Vec::new(),
        }
    }

    fn with_emulator_port(&self, port: u16) -> Self {
        Self {
            device_id: self.device_id.clone(),
            emulator_port: Some(port),
        }
    }
}

impl AdbClient {
    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    pub fn device_id(&self) -> Option<&str> {
        self.target.device_id()
    }

    /// Bind the session to an endpoint
    pub fn select_device(&mut self, endpoint: &Endpoint) {
        self.set_device_id(&endpoint.id);
    }

    /// Bind the session to a device serial, replacing any previous target
    pub fn set_device_id(&mut self, id: &str) {
        let target = SessionTarget::for_device(id);
        info!("Selected device {} (port {:?})", id, target.emulator_port());
        self.events.emit(Event::DeviceSelected {
            device_id: id.to_string(),
            emulator_port: target.emulator_port(),
        });
        self.target = target;
    }

    pub fn set_emulator_port(&mut self, port: u16) {
        debug!("Emulator port set to {}", port);
        self.target = self.target.with_emulator_port(port);
    }

    /// The target's console port, or the first connected emulator's
    pub async fn emulator_port(&self) -> Result<u16> {
        if let Some(port) = self.target.emulator_port() {
            return Ok(port);
        }

        let emulators = self.list_emulators().await?;
        emulators
            .first()
            .and_then(|e| e.emulator_port)
            .ok_or_else(|| Error::NoEmulator("no ports available".into()))
    }
}
