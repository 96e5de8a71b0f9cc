use std::fmt;
use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{ClearBuffer, SerialPort};

use super::{Result, SerialError};

pub const BAUD_RATE: u32 = 115200;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Line parameters for a single serial link (8N1 is implied)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Byte-level port primitives the link is built on.
///
/// The OS serial port implements this, and so do the scripted ports used in tests.
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write the whole buffer, failing with `WriteFailed` on I/O error or write timeout
    async fn send_data(&mut self, data: &[u8]) -> Result<()>;

    /// Copy whatever is already queued into `buf`; returns 0 when nothing is waiting
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Discard bytes received but not yet read
    fn clear_input(&mut self) -> Result<()>;
}

/// A write error takes precedence over failing to restore the read timeout
fn write_outcome(written: Result<()>, restored: serialport::Result<()>) -> Result<()> {
    if let Err(e) = &restored {
        log::error!("Failed to restore read timeout: {}", e);
    }
    written?;
    restored.map_err(SerialError::from)
}

/// Adapter over an open `serialport` handle
struct NativePort {
    port: Box<dyn SerialPort>,
    settings: LinkSettings,
}

#[async_trait]
impl SerialPortIO for NativePort {
    async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        // serialport has one timeout for both directions
        let swap_timeout = self.settings.write_timeout != self.settings.read_timeout;
        if swap_timeout {
            self.port.set_timeout(self.settings.write_timeout)?;
        }

        let written = self
            .port
            .write_all(data)
            .and_then(|_| self.port.flush())
            .map_err(|e| SerialError::WriteFailed(e.to_string()));

        if !swap_timeout {
            return written;
        }
        let restored = self.port.set_timeout(self.settings.read_timeout);
        write_outcome(written, restored)
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let waiting = self.port.bytes_to_read()? as usize;
        if waiting == 0 || buf.is_empty() {
            return Ok(0);
        }

        let len = waiting.min(buf.len());
        match self.port.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(SerialError::IoError(e)),
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// A single serial connection that can be opened, closed and reopened.
///
/// At most one port is held at a time; `connect` on an open link closes the
/// old port first.
pub struct SerialInterface {
    port: Option<Box<dyn SerialPortIO>>,
    port_name: Option<String>,
    settings: LinkSettings,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self::with_settings(LinkSettings::default())
    }

    pub fn with_settings(settings: LinkSettings) -> Self {
        Self {
            port: None,
            port_name: None,
            settings,
        }
    }

    /// Wrap an already-open port that was configured with `settings`
    pub fn from_io(
        port_name: impl Into<String>,
        io: Box<dyn SerialPortIO>,
        settings: LinkSettings,
    ) -> Self {
        Self {
            port: Some(io),
            port_name: Some(port_name.into()),
            settings,
        }
    }

    pub fn settings(&self) -> LinkSettings {
        self.settings
    }

    /// Open `port_name`, deasserting DTR and RTS so boards wired for
    /// auto-reset are not rebooted by the open itself
    pub fn connect(&mut self, port_name: &str) -> Result<()> {
        if self.is_connected() {
            self.disconnect();
        }

        let mut port = serialport::new(port_name, self.settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(self.settings.read_timeout)
            .open()
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", port_name, e)))?;

        port.write_data_terminal_ready(false)
            .and_then(|_| port.write_request_to_send(false))
            .map_err(|e| {
                SerialError::ConnectionFailed(format!("{}: failed to clear DTR/RTS: {}", port_name, e))
            })?;

        self.port = Some(Box::new(NativePort {
            port,
            settings: self.settings,
        }));
        self.port_name = Some(port_name.to_string());

        log::info!("Connected to device on {}", port_name);
        Ok(())
    }

    /// Close the port. Safe to call on a link that is already closed.
    pub fn disconnect(&mut self) {
        if self.port.take().is_some() {
            if let Some(name) = &self.port_name {
                log::info!("Disconnected from {}", name);
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Name of the port this link was last opened on
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        port.send_data(data).await
    }

    pub async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        port.read_available(buf).await
    }

    /// Drop any backlog so a new command never sees a stale response
    pub fn reset_input_buffer(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        port.clear_input()
    }
}

impl fmt::Debug for SerialInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialInterface")
            .field("port_name", &self.port_name)
            .field("connected", &self.is_connected())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}
