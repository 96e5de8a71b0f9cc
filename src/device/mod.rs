pub mod capabilities;
pub mod commands;
pub mod manager;
pub mod models;
pub mod port_monitor;
pub mod workflow;

pub use capabilities::Capability;
pub use commands::{SerialInfo, WhoAmI};
pub use manager::{Connector, DeviceManager, SystemConnector};
pub use models::*;
pub use port_monitor::{PortChange, PortChangeDetector, PortEnumerator, PortSnapshot, SystemPorts};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No device connected yet, provide a port first")]
    NoDeviceBound,

    #[error("No new port appeared after the device rebooted")]
    NoNewPort,

    #[error("Command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Unexpected response to '{command}': {reason}")]
    UnexpectedResponse { command: String, reason: String },

    #[error("{0} is not a supported mode")]
    UnsupportedMode(String),

    #[error("Unknown board {0}")]
    UnknownBoard(String),

    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
