//! Command session
//!
//! Sequences request/response exchanges over a [`LineTransport`]: frames
//! outgoing commands, remembers the last one sent, and picks how long to
//! wait for the answer.
//!
//! Two commands switch the device into special modes:
//! - the telemetry trigger (`TEST`) makes it stream lines until the stop
//!   command (`STOP`) arrives;
//! - the measurement trigger (`START`) makes it measure for ~15s before it
//!   answers, followed by an optional informational line.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{
    framing::{build_frame, is_framed, normalize_input},
    LineTransport, ProtocolError, ReadTimeout, ResponseClass, FRAME_SEPARATOR,
};

/// How the session drives a command after sending it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandMode {
    /// One reply line, short timeout
    Standard,
    /// Acknowledgement, then streamed telemetry until stopped
    Telemetry,
    /// One long-latency measurement line, then an optional trailing line
    Measurement,
}

impl CommandMode {
    /// Response class the transport should plan for
    pub fn response_class(&self) -> ResponseClass {
        match self {
            CommandMode::Standard => ResponseClass::ShortAck,
            CommandMode::Telemetry => ResponseClass::Streaming,
            CommandMode::Measurement => ResponseClass::LongMeasurement,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Command name that starts streaming telemetry
    pub telemetry_command: String,
    /// Command name that starts the long measurement
    pub measurement_command: String,
    /// Command that ends streaming telemetry
    pub stop_command: String,
    /// Wait for an ordinary reply in milliseconds
    pub response_timeout_ms: u64,
    /// Wait per telemetry poll in milliseconds
    pub telemetry_poll_ms: u64,
    /// Pause after an empty telemetry poll in milliseconds
    pub telemetry_idle_ms: u64,
    /// Wait for the stop acknowledgement in milliseconds
    pub stop_ack_timeout_ms: u64,
    /// Wait for the line following a measurement result in milliseconds
    pub trailing_line_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            telemetry_command: "TEST".to_string(),
            measurement_command: "START".to_string(),
            stop_command: "STOP".to_string(),
            response_timeout_ms: 2000,
            telemetry_poll_ms: 300,
            telemetry_idle_ms: 50,
            stop_ack_timeout_ms: 2000,
            trailing_line_timeout_ms: 500,
        }
    }
}

impl SessionConfig {
    /// Classify a command (framed or not) by case-insensitive name prefix
    pub fn classify(&self, command: &str) -> CommandMode {
        let name = command
            .split(FRAME_SEPARATOR)
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase();
        let triggered = |trigger: &str| {
            let trigger = trigger.trim();
            !trigger.is_empty() && name.starts_with(&trigger.to_ascii_uppercase())
        };

        if triggered(&self.measurement_command) {
            CommandMode::Measurement
        } else if triggered(&self.telemetry_command) {
            CommandMode::Telemetry
        } else {
            CommandMode::Standard
        }
    }

    fn response_timeout(&self) -> ReadTimeout {
        ReadTimeout::Fixed(Duration::from_millis(self.response_timeout_ms))
    }

    fn telemetry_poll(&self) -> ReadTimeout {
        ReadTimeout::Fixed(Duration::from_millis(self.telemetry_poll_ms))
    }

    fn stop_ack_timeout(&self) -> ReadTimeout {
        ReadTimeout::Fixed(Duration::from_millis(self.stop_ack_timeout_ms))
    }

    fn trailing_line_timeout(&self) -> ReadTimeout {
        ReadTimeout::Fixed(Duration::from_millis(self.trailing_line_timeout_ms))
    }
}

/// Outcome of one request/response exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Line as written to the wire (without terminator)
    pub frame: String,
    /// Mode the command was handled in
    pub mode: CommandMode,
    /// Received lines in arrival order; empty when the device stayed silent
    pub lines: Vec<String>,
}

impl Exchange {
    /// Received lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether the device answered at all
    pub fn has_response(&self) -> bool {
        !self.lines.is_empty()
    }
}

/// Result of ending telemetry mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryStop {
    /// Stop frame as written
    pub frame: String,
    /// Acknowledgement, if one arrived in time
    pub ack: Option<String>,
}

/// Request/response orchestration over one transport
pub struct CommandSession {
    transport: LineTransport,
    config: SessionConfig,
    /// Most recently written line, post-framing
    last_command_sent: Option<String>,
}

impl CommandSession {
    /// Create a session over a transport (open or not)
    pub fn new(transport: LineTransport, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            last_command_sent: None,
        }
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Underlying transport
    pub fn transport(&self) -> &LineTransport {
        &self.transport
    }

    /// Underlying transport, mutably (for draining, closing, ...)
    pub fn transport_mut(&mut self) -> &mut LineTransport {
        &mut self.transport
    }

    /// Most recently written line, post-framing
    pub fn last_command_sent(&self) -> Option<&str> {
        self.last_command_sent.as_deref()
    }

    /// Mode of the command in flight
    pub fn command_mode(&self) -> CommandMode {
        self.last_command_sent
            .as_deref()
            .map(|cmd| self.config.classify(cmd))
            .unwrap_or(CommandMode::Standard)
    }

    /// Response class of the command in flight
    pub fn expected_response(&self) -> ResponseClass {
        self.command_mode().response_class()
    }

    /// Normalize `raw` and frame it unless it already carries a checksum
    pub fn prepare(raw: &str) -> String {
        let payload = normalize_input(raw);
        if is_framed(&payload) {
            payload
        } else {
            build_frame(&payload)
        }
    }

    /// Write a command and remember it. Returns the line as written.
    pub fn send(&mut self, raw: &str) -> Result<String, ProtocolError> {
        let frame = Self::prepare(raw);
        self.transport.write_line(&frame)?;
        self.last_command_sent = Some(frame.clone());
        Ok(frame)
    }

    /// Read one line with the deadline the command in flight calls for
    pub fn read_response(&mut self) -> Result<Option<String>, ProtocolError> {
        let expected = self.expected_response();
        self.transport.read_line(ReadTimeout::Expected(expected))
    }

    /// Collect the reply to the command in flight.
    ///
    /// - standard commands: one line within the response timeout
    /// - telemetry trigger: the acknowledgement only; continue with
    ///   [`follow_telemetry`](Self::follow_telemetry)
    /// - measurement trigger: the result within the extended deadline, then
    ///   one more line if it shows up within the trailing timeout
    pub fn receive_reply(&mut self) -> Result<Vec<String>, ProtocolError> {
        let mut lines = Vec::new();
        match self.command_mode() {
            CommandMode::Standard | CommandMode::Telemetry => {
                let timeout = self.config.response_timeout();
                lines.extend(self.transport.read_line(timeout)?);
            }
            CommandMode::Measurement => {
                if let Some(result) = self.read_response()? {
                    lines.push(result);
                    let timeout = self.config.trailing_line_timeout();
                    lines.extend(self.transport.read_line(timeout)?);
                }
            }
        }
        Ok(lines)
    }

    /// Send a command and collect its reply
    pub fn exchange(&mut self, raw: &str) -> Result<Exchange, ProtocolError> {
        let frame = self.send(raw)?;
        let mode = self.command_mode();
        let lines = self.receive_reply()?;

        tracing::debug!("exchange: {} -> {} line(s) ({:?})", frame, lines.len(), mode);
        Ok(Exchange { frame, mode, lines })
    }

    /// Pass streamed telemetry lines to `on_line` until `cancel` is set,
    /// then stop streaming.
    ///
    /// `cancel` is checked between polls; a poll already in progress is
    /// allowed to finish. If a read fails, the stop command is still sent
    /// (best effort) and the read error is returned.
    pub fn follow_telemetry<F>(
        &mut self,
        cancel: &AtomicBool,
        mut on_line: F,
    ) -> Result<TelemetryStop, ProtocolError>
    where
        F: FnMut(&str),
    {
        let poll = self.config.telemetry_poll();
        let idle = Duration::from_millis(self.config.telemetry_idle_ms);

        while !cancel.load(Ordering::SeqCst) {
            match self.transport.read_line(poll) {
                Ok(Some(line)) => on_line(&line),
                Ok(None) => std::thread::sleep(idle),
                Err(e) => {
                    // Still try to silence the device; report the read failure
                    tracing::warn!("follow_telemetry: read failed: {}, sending stop", e);
                    if let Err(stop_err) = self.stop_telemetry() {
                        tracing::debug!("follow_telemetry: stop failed: {} (ignored)", stop_err);
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!("follow_telemetry: cancelled, sending stop");
        self.stop_telemetry()
    }

    /// Send the stop command, wait for one acknowledgement, then drop any
    /// telemetry still buffered. The buffer is reset even if sending fails.
    pub fn stop_telemetry(&mut self) -> Result<TelemetryStop, ProtocolError> {
        let outcome = self.send_stop();
        self.transport.discard_input();
        outcome
    }

    fn send_stop(&mut self) -> Result<TelemetryStop, ProtocolError> {
        let stop_command = self.config.stop_command.clone();
        let frame = self.send(&stop_command)?;
        let ack = self.transport.read_line(self.config.stop_ack_timeout())?;
        Ok(TelemetryStop { frame, ack })
    }

    /// Close the transport. Safe to call more than once.
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        self.transport.close()
    }
}
