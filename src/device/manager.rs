use std::time::Duration;

use tokio::time::sleep;

use crate::config::SessionConfig;
use crate::serial::{self, CommandClient, LinkSettings, SerialInterface};
use super::{BindingState, DeviceBinding, DeviceError, Result};

/// Opens a serial link on a named port
pub trait Connector {
    fn connect(&self, port_name: &str) -> serial::Result<SerialInterface>;
}

/// Opens real OS serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector {
    settings: LinkSettings,
}

impl SystemConnector {
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }
}

impl Connector for SystemConnector {
    fn connect(&self, port_name: &str) -> serial::Result<SerialInterface> {
        let mut interface = SerialInterface::with_settings(self.settings);
        interface.connect(port_name)?;
        Ok(interface)
    }
}

/// Owns the single "current device" of a session and re-binds it when the
/// device shows up under a different port.
///
/// Create one with `init` at session start and call `teardown` at the end.
/// Re-binding always closes the old link before the new one is opened.
pub struct DeviceManager<C: Connector = SystemConnector> {
    connector: C,
    binding: DeviceBinding,
    settle_duration: Duration,
    command_timeout: Duration,
}

impl DeviceManager<SystemConnector> {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_connector(
            SystemConnector::new(config.link_settings()),
            config.settle_duration(),
            config.command_timeout(),
        )
    }
}

impl<C: Connector> DeviceManager<C> {
    pub fn with_connector(connector: C, settle_duration: Duration, command_timeout: Duration) -> Self {
        Self {
            connector,
            binding: DeviceBinding::default(),
            settle_duration,
            command_timeout,
        }
    }

    /// Create a manager already bound to `port`
    pub async fn init(
        connector: C,
        port: &str,
        settle_duration: Duration,
        command_timeout: Duration,
    ) -> Result<Self> {
        let mut manager = Self::with_connector(connector, settle_duration, command_timeout);
        manager.get_device(Some(port)).await?;
        Ok(manager)
    }

    pub fn settle_duration(&self) -> Duration {
        self.settle_duration
    }

    pub fn state(&self) -> BindingState {
        self.binding.state()
    }

    pub fn current_port(&self) -> Option<&str> {
        self.binding.current_port.as_deref()
    }

    /// Get the bound client, first re-binding to `port` if it differs from
    /// the current one.
    ///
    /// A re-bind waits out the settle duration before returning; asking for
    /// the current port (or none) returns the existing client immediately.
    pub async fn get_device(&mut self, port: Option<&str>) -> Result<&mut CommandClient> {
        if let Some(port) = port {
            if self.binding.current_port.as_deref() != Some(port) {
                self.rebind(port).await?;
            }
        }

        self.binding.client.as_mut().ok_or(DeviceError::NoDeviceBound)
    }

    async fn rebind(&mut self, port: &str) -> Result<()> {
        match self.binding.release() {
            Some(old_port) => log::info!("Port changed from {} to {}, reconnecting", old_port, port),
            None => log::info!("Binding device on {}", port),
        }

        let interface = self.connector.connect(port).map_err(|e| {
            log::error!("Failed to open {}: {}", port, e);
            DeviceError::SerialError(e)
        })?;
        let client = CommandClient::new(interface).with_default_timeout(self.command_timeout);

        log::debug!("Waiting {:?} for the device to settle", self.settle_duration);
        sleep(self.settle_duration).await;

        self.binding = DeviceBinding {
            current_port: Some(port.to_string()),
            client: Some(client),
        };
        Ok(())
    }

    /// Close the bound client, if any. The manager can be bound again afterwards.
    pub fn teardown(&mut self) {
        if let Some(port) = self.binding.release() {
            log::info!("Released device on {}", port);
        }
    }
}
