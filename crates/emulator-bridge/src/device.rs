//! Device Types and Discovery Parsing
//!
//! Represents endpoints (physical devices and emulators) reported by
//! `adb devices`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use droidlink_core::{Error, Result};

/// Header line printed by `adb devices`
pub const DEVICE_LIST_HEADER: &str = "List of devices";

static EMULATOR_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"emulator-(\d+)").expect("Invalid emulator id regex"));

/// Endpoint connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointState {
    /// Connected and accepting commands
    Device,
    /// Known to adb but not reachable
    Offline,
    /// Any other state (unauthorized, recovery, ...)
    Unknown,
}

impl EndpointState {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "device" => EndpointState::Device,
            "offline" => EndpointState::Offline,
            _ => EndpointState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointState::Device => "device",
            EndpointState::Offline => "offline",
            EndpointState::Unknown => "unknown",
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, EndpointState::Device)
    }
}

/// One attached device or running emulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Serial as reported by adb
    pub id: String,
    /// Connection state
    pub state: EndpointState,
    /// Console port, for `emulator-<port>` serials
    pub emulator_port: Option<u16>,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, state: EndpointState) -> Self {
        let id = id.into();
        let emulator_port = port_from_id(&id);
        Self {
            id,
            state,
            emulator_port,
        }
    }

    pub fn is_emulator(&self) -> bool {
        self.emulator_port.is_some()
    }

    pub fn is_usable(&self) -> bool {
        self.state.is_usable()
    }
}

/// Extract the console port from an `emulator-<digits>` serial
pub fn port_from_id(id: &str) -> Option<u16> {
    EMULATOR_ID
        .captures(id)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse `adb devices` output, dropping offline endpoints
pub fn parse_device_list(output: &str) -> Result<Vec<Endpoint>> {
    parse_lines(output, false)
}

/// Parse `adb devices` output, keeping offline endpoints
pub fn parse_device_list_with_offline(output: &str) -> Result<Vec<Endpoint>> {
    parse_lines(output, true)
}

fn parse_lines(output: &str, keep_offline: bool) -> Result<Vec<Endpoint>> {
    let start = output
        .find(DEVICE_LIST_HEADER)
        .ok_or_else(|| Error::Discovery(output.to_string()))?;

    let endpoints = output[start..]
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.contains(DEVICE_LIST_HEADER))
        .filter(|line| !line.contains("* daemon"))
        .filter(|line| keep_offline || !line.contains("offline"))
        .map(|line| {
            let mut parts = line.split('\t');
            let id = parts.next().unwrap_or_default().trim();
            let state = parts
                .next()
                .map(EndpointState::parse)
                .unwrap_or(EndpointState::Unknown);
            Endpoint::new(id, state)
        })
        .collect();

    Ok(endpoints)
}
