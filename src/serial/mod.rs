pub mod frame;
pub mod interface;
pub mod protocol;

pub use frame::FrameAssembler;
pub use interface::{LinkSettings, SerialInterface, SerialPortIO};
pub use protocol::{
    Command, CommandClient, CommandEnvelope, CommandResult, ProtocolError, Response, ResultBody,
    ResultEnvelope, ResultStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Device Not Connected")]
    NotConnected,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Command timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
