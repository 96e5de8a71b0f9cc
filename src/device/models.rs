use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::serial::CommandClient;

/// Firmware streaming mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    Uvc,
    Wifi,
    Setup,
    /// Reported before the firmware has settled on a mode
    Unknown,
}

impl DeviceMode {
    /// Value the `switch_mode` command expects, if the mode can be requested at all
    pub fn wire_name(&self) -> Option<&'static str> {
        match self {
            DeviceMode::Uvc => Some("uvc"),
            DeviceMode::Wifi => Some("wifi"),
            DeviceMode::Setup => Some("auto"),
            DeviceMode::Unknown => None,
        }
    }

    /// Modes a session may ask `ensure_mode` for
    pub fn is_switchable(&self) -> bool {
        matches!(self, DeviceMode::Uvc | DeviceMode::Wifi)
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceMode::Uvc => "uvc",
            DeviceMode::Wifi => "wifi",
            DeviceMode::Setup => "setup",
            DeviceMode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for DeviceMode {
    type Err = super::DeviceError;

    // The firmware reports "UVC", "WiFi", "Setup" or "unknown"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uvc" => Ok(DeviceMode::Uvc),
            "wifi" => Ok(DeviceMode::Wifi),
            "setup" | "auto" => Ok(DeviceMode::Setup),
            "unknown" => Ok(DeviceMode::Unknown),
            other => Err(super::DeviceError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Where the connection manager stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Bound(String),
}

/// The one logical "current device": a client and the port it was opened on
#[derive(Default)]
pub struct DeviceBinding {
    pub current_port: Option<String>,
    pub client: Option<CommandClient>,
}

impl DeviceBinding {
    pub fn state(&self) -> BindingState {
        match (&self.current_port, &self.client) {
            (Some(port), Some(_)) => BindingState::Bound(port.clone()),
            _ => BindingState::Unbound,
        }
    }

    /// Close and forget the bound client, returning the port it was on
    pub fn release(&mut self) -> Option<String> {
        if let Some(mut client) = self.client.take() {
            client.disconnect();
        }
        self.current_port.take()
    }
}
