//! Serial Line Protocol
//!
//! Implements the checksummed, line-oriented text protocol spoken by the
//! controller firmware.
//!
//! Every command travels as one ASCII line `PAYLOAD|XX\n`, where `XX` is the
//! additive checksum of the payload in uppercase hex. Responses are free-form
//! ASCII lines terminated by `\n` (optionally `\r\n`).

pub mod channel;
pub mod framing;
pub mod observer;
pub mod serial;
mod error;
mod session;
mod transport;

pub use channel::ByteChannel;
pub use error::ProtocolError;
pub use framing::{build_frame, compute_checksum, is_framed, normalize_input, Frame, FrameBreakdown};
pub use observer::{NoopObserver, TracingObserver, TrafficObserver};
pub use serial::{list_ports, PortInfo};
pub use session::{
    CommandMode, CommandSession, Exchange, SessionConfig, TelemetryStop,
};
pub use transport::{
    LineTransport, ReadTimeout, ResponseClass, TrafficCounters, TransportConfig,
};

/// Default baud rate of the controller firmware
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default base timeout for a line read in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Deadline for the measurement command in milliseconds.
/// The firmware measures for about 15s before it answers.
pub const EXTENDED_TIMEOUT_MS: u64 = 17_000;

/// Write timeout in milliseconds
pub const WRITE_TIMEOUT_MS: u64 = 1000;

/// Inter-byte read timeout in milliseconds
pub const INTER_BYTE_TIMEOUT_MS: u64 = 50;

/// Delay after opening the port while the board resets, in milliseconds
pub const SETTLE_DELAY_MS: u64 = 1200;

/// Pause after every written line so the firmware input buffer keeps up
pub const INTER_COMMAND_DELAY_MS: u64 = 2;

/// Separator between payload and checksum in a frame
pub const FRAME_SEPARATOR: char = '|';
