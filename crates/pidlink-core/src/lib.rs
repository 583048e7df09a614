//! # pidlink Core Library
//!
//! Core functionality for the pidlink serial command client.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Checksummed `PAYLOAD|XX` command framing
//! - A deadline-bounded, line-oriented transport over a serial byte channel
//! - A command session that picks read timeouts per command and drives the
//!   streaming telemetry and extended measurement modes
//!
//! ## Example
//!
//! ```rust,ignore
//! use pidlink_core::protocol::{CommandSession, LineTransport, SessionConfig, TransportConfig};
//!
//! let mut transport = LineTransport::new(TransportConfig::for_port("/dev/ttyACM0"));
//! transport.open()?;
//!
//! let mut session = CommandSession::new(transport, SessionConfig::default());
//! let exchange = session.exchange("PING")?;
//! println!("{:?}", exchange.lines());
//! ```

pub mod config;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ClientConfig;
    pub use crate::protocol::{
        build_frame, compute_checksum, CommandSession, Exchange, Frame, LineTransport,
        ProtocolError, ReadTimeout, ResponseClass, SessionConfig, TransportConfig,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
