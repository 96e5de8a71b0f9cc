use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FrameAssembler, Result, SerialError, SerialInterface};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// A single firmware command with its optional payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    #[serde(rename = "command")]
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SerialError::ProtocolError("Command name must not be empty".to_string()));
        }
        Ok(Self { name, data: None })
    }

    /// Attach a payload. `params` must be a JSON object; an empty object or
    /// `null` leaves the payload off the wire entirely.
    pub fn with_params(mut self, params: Value) -> Result<Self> {
        self.data = match params {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            Value::Object(map) => Some(map),
            other => {
                return Err(SerialError::ProtocolError(format!(
                    "Command parameters must be a JSON object, got {}",
                    other
                )))
            }
        };
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }
}

/// Wire wrapper around the commands of one request.
///
/// The firmware accepts batches, but this client always sends exactly one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandEnvelope {
    commands: Vec<Command>,
}

impl CommandEnvelope {
    pub fn single(command: Command) -> Self {
        Self {
            commands: vec![command],
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Encode as one newline-terminated JSON line
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| SerialError::ProtocolError(format!("Failed to encode command: {}", e)))?;
        line.push('\n');
        Ok(line)
    }
}

/// The client could not complete the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolError {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failure,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBody {
    pub status: ResultStatus,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub result: ResultBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub results: Vec<CommandResult>,
}

/// Outcome of one exchange: either the device's results or the reason the
/// exchange never completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Error(ProtocolError),
    Results(ResultEnvelope),
}

impl Response {
    pub fn error_message(message: impl Into<String>) -> Self {
        Response::Error(ProtocolError {
            error: message.into(),
        })
    }

    pub fn not_connected() -> Self {
        Self::error_message(SerialError::NotConnected.to_string())
    }

    pub fn timeout() -> Self {
        Self::error_message(SerialError::Timeout.to_string())
    }

    pub fn communication(err: &SerialError) -> Self {
        Self::error_message(format!("Communication error: {}", err))
    }

    /// Interpret a framed message. Anything that is neither an error nor a
    /// results envelope becomes a protocol error.
    pub fn from_message(message: Value) -> Self {
        match serde_json::from_value::<Response>(message) {
            Ok(response) => response,
            Err(e) => Self::error_message(format!("Malformed response: {}", e)),
        }
    }

    /// True for any transport failure, and for a result whose status is not
    /// `success`. An envelope with no results counts as failed.
    pub fn has_failed(&self) -> bool {
        match self {
            Response::Error(_) => true,
            Response::Results(_) => self.status() != Some(ResultStatus::Success),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Response::Error(e) => Some(&e.error),
            Response::Results(_) => None,
        }
    }

    pub fn first_result(&self) -> Option<&ResultBody> {
        match self {
            Response::Error(_) => None,
            Response::Results(envelope) => envelope.results.first().map(|r| &r.result),
        }
    }

    pub fn status(&self) -> Option<ResultStatus> {
        self.first_result().map(|r| r.status)
    }

    pub fn data(&self) -> Option<&Value> {
        self.first_result().map(|r| &r.data)
    }

    /// Typed lookup of `key` in the first result's data object
    pub fn data_field<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.data()?.get(key)?.clone();
        serde_json::from_value(value).ok()
    }
}

/// Request/response client bound to one serial link
#[derive(Debug)]
pub struct CommandClient {
    interface: SerialInterface,
    assembler: FrameAssembler,
    default_timeout: Duration,
}

impl CommandClient {
    pub fn new(interface: SerialInterface) -> Self {
        Self {
            interface,
            assembler: FrameAssembler::new(),
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn connect(&mut self, port_name: &str) -> Result<()> {
        self.interface.connect(port_name)
    }

    pub fn disconnect(&mut self) {
        self.interface.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.interface.is_connected()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.interface.port_name()
    }

    pub fn interface(&self) -> &SerialInterface {
        &self.interface
    }

    /// Send `command` with optional `params` and wait for its response.
    ///
    /// Transport failures come back as `Response::Error`; nothing here
    /// returns `Err`. One write per call, no retries.
    pub async fn send(
        &mut self,
        command: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Response {
        let command = match Command::new(command)
            .and_then(|c| c.with_params(params.unwrap_or(Value::Null)))
        {
            Ok(command) => command,
            Err(e) => return Response::error_message(e.to_string()),
        };
        self.send_command(command, timeout).await
    }

    pub async fn send_command(&mut self, command: Command, timeout: Option<Duration>) -> Response {
        if !self.interface.is_connected() {
            return Response::not_connected();
        }

        let name = command.name().to_string();
        let line = match CommandEnvelope::single(command).to_line() {
            Ok(line) => line,
            Err(e) => return Response::error_message(e.to_string()),
        };

        if let Err(e) = self.interface.reset_input_buffer() {
            log::error!("Failed to clear input before '{}': {}", name, e);
            return Response::communication(&e);
        }

        log::debug!("Sending command: {}", line.trim_end());
        if let Err(e) = self.interface.send_data(line.as_bytes()).await {
            log::error!("Failed to send '{}': {}", name, e);
            return Response::communication(&e);
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        match self.assembler.assemble(&mut self.interface, timeout).await {
            Ok(Some(message)) => {
                log::debug!("Received response to '{}': {}", name, message);
                Response::from_message(message)
            }
            Ok(None) => {
                log::warn!("Command '{}' timeout after {:?}", name, timeout);
                Response::timeout()
            }
            Err(e) => {
                log::error!("Reading response to '{}' failed: {}", name, e);
                Response::communication(&e)
            }
        }
    }
}
