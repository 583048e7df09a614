//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
///
/// A read that produces no line before its deadline is not an error; it is
/// reported as `Ok(None)` by [`LineTransport::read_line`](super::LineTransport::read_line).
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Port is not open")]
    NotOpen,

    #[error("Port is already open")]
    AlreadyOpen,

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
