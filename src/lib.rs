//! Command/response client for camera-tracker firmware over a serial link,
//! plus a connection manager that follows the device across reboots that
//! change its port.
pub mod config;
pub mod device;
pub mod serial;

#[doc(hidden)]
pub mod testing;

pub use crate::config::SessionConfig;
pub use device::{DeviceError, DeviceManager, DeviceMode};
pub use serial::{CommandClient, Response, SerialError, SerialInterface};
