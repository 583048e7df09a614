//! Line transport
//!
//! Owns the byte channel and turns it into one-line-at-a-time I/O with
//! deadline semantics.

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use super::{
    framing::ascii_bytes, serial, ByteChannel, NoopObserver, ProtocolError, TrafficObserver,
    DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS, EXTENDED_TIMEOUT_MS, INTER_BYTE_TIMEOUT_MS,
    INTER_COMMAND_DELAY_MS, SETTLE_DELAY_MS, WRITE_TIMEOUT_MS,
};

/// Upper bound on lines thrown away by [`LineTransport::drain_stale_input`],
/// so a device that is still streaming cannot stall start-up forever.
const MAX_DRAINED_LINES: usize = 256;

/// How long the device is expected to take before answering a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseClass {
    /// Sub-second acknowledgement
    ShortAck,
    /// Multi-second measurement result
    LongMeasurement,
    /// Continuous telemetry lines
    Streaming,
}

/// Deadline policy for a single [`LineTransport::read_line`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTimeout {
    /// Wait exactly this long
    Fixed(Duration),
    /// Derive the wait from the response class of the command in flight
    Expected(ResponseClass),
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Base read timeout in milliseconds
    pub timeout_ms: u64,
    /// Read timeout for long measurements in milliseconds
    pub extended_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
    /// Inter-byte read timeout in milliseconds
    pub inter_byte_timeout_ms: u64,
    /// Wait after opening the port in milliseconds
    pub settle_delay_ms: u64,
    /// Pause after every written line in milliseconds
    pub inter_command_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            extended_timeout_ms: EXTENDED_TIMEOUT_MS,
            write_timeout_ms: WRITE_TIMEOUT_MS,
            inter_byte_timeout_ms: INTER_BYTE_TIMEOUT_MS,
            settle_delay_ms: SETTLE_DELAY_MS,
            inter_command_delay_ms: INTER_COMMAND_DELAY_MS,
        }
    }
}

impl TransportConfig {
    /// Defaults for the given port
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Resolve a read policy to a concrete wait
    pub fn resolve_timeout(&self, timeout: ReadTimeout) -> Duration {
        match timeout {
            ReadTimeout::Fixed(duration) => duration,
            ReadTimeout::Expected(ResponseClass::LongMeasurement) => {
                Duration::from_millis(self.extended_timeout_ms)
            }
            ReadTimeout::Expected(ResponseClass::ShortAck | ResponseClass::Streaming) => {
                // A zero base timeout would make every default read expire immediately
                let base = if self.timeout_ms == 0 {
                    DEFAULT_TIMEOUT_MS
                } else {
                    self.timeout_ms
                };
                Duration::from_millis(base)
            }
        }
    }
}

/// Cumulative traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCounters {
    /// Bytes written, terminators included
    pub tx_bytes: u64,
    /// Bytes read, terminators and discarded partial lines included
    pub rx_bytes: u64,
    /// Lines written
    pub tx_lines: u64,
    /// Complete lines received
    pub rx_lines: u64,
}

/// Line-oriented transport over a [`ByteChannel`]
///
/// At most one channel is held at a time. Every I/O method fails with
/// [`ProtocolError::NotOpen`] before `open` and after `close`. The channel is
/// closed when the transport is dropped.
pub struct LineTransport {
    /// Open channel handle
    channel: Option<Box<dyn ByteChannel>>,
    /// Transport configuration
    config: TransportConfig,
    /// Traffic event sink
    observer: Box<dyn TrafficObserver>,
    counters: TrafficCounters,
}

impl LineTransport {
    /// Create a transport (not yet open) that reports traffic nowhere
    pub fn new(config: TransportConfig) -> Self {
        Self::with_observer(config, Box::new(NoopObserver))
    }

    /// Create a transport (not yet open) reporting traffic to `observer`
    pub fn with_observer(config: TransportConfig, observer: Box<dyn TrafficObserver>) -> Self {
        Self {
            channel: None,
            config,
            observer,
            counters: TrafficCounters::default(),
        }
    }

    /// Transport configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Whether a channel is currently held
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Cumulative tx/rx counters
    pub fn counters(&self) -> TrafficCounters {
        self.counters
    }

    /// Open the configured serial port
    pub fn open(&mut self) -> Result<(), ProtocolError> {
        if self.is_open() {
            return Err(ProtocolError::AlreadyOpen);
        }
        let channel = serial::open_port(&self.config)?;
        self.attach(channel);
        tracing::debug!(
            "open: {} @ {} baud",
            self.config.port_name,
            self.config.baud_rate
        );
        Ok(())
    }

    /// Take ownership of an already opened channel
    pub fn open_with(&mut self, channel: Box<dyn ByteChannel>) -> Result<(), ProtocolError> {
        if self.is_open() {
            return Err(ProtocolError::AlreadyOpen);
        }
        self.attach(channel);
        tracing::debug!("open: attached injected channel");
        Ok(())
    }

    fn attach(&mut self, mut channel: Box<dyn ByteChannel>) {
        if let Err(e) = channel.clear_input_buffer() {
            tracing::debug!("open: failed to clear input buffer: {} (continuing)", e);
        }
        if let Err(e) = channel.clear_output_buffer() {
            tracing::debug!("open: failed to clear output buffer: {} (continuing)", e);
        }

        // Opening the port toggles DTR on most boards, which resets them
        std::thread::sleep(Duration::from_millis(self.config.settle_delay_ms));

        self.channel = Some(channel);
    }

    /// Close the channel. Closing a closed transport is a no-op.
    ///
    /// The handle is released even when the channel reports an error.
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        if let Some(mut channel) = self.channel.take() {
            channel.close()?;
            tracing::debug!("close: port closed");
        }
        Ok(())
    }

    /// Write one line terminated by exactly one `\n`.
    ///
    /// Trailing CR/LF in `line` are replaced; non-ASCII characters are dropped.
    pub fn write_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotOpen)?;

        let text = line.trim_end_matches(['\r', '\n']);
        let mut data: Vec<u8> = ascii_bytes(text).collect();
        data.push(b'\n');

        channel.write_all(&data)?;
        channel.flush()?;

        self.observer.on_transmit(text, &data);
        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(data.len() as u64);
        self.counters.tx_lines = self.counters.tx_lines.saturating_add(1);

        std::thread::sleep(Duration::from_millis(self.config.inter_command_delay_ms));
        Ok(())
    }

    /// Read one line, waiting at most as long as `timeout` resolves to.
    ///
    /// Returns `Ok(None)` when the deadline passes without a terminator; any
    /// bytes accumulated so far are discarded.
    pub fn read_line(&mut self, timeout: ReadTimeout) -> Result<Option<String>, ProtocolError> {
        let wait = self.config.resolve_timeout(timeout);
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotOpen)?;

        let deadline = Instant::now() + wait;
        let mut line: Vec<u8> = Vec::new();
        let mut byte = [0u8; 1];

        while Instant::now() < deadline {
            match channel.read(&mut byte) {
                Ok(0) => continue,
                Ok(_) => {
                    self.counters.rx_bytes = self.counters.rx_bytes.saturating_add(1);
                    if byte[0] != b'\n' {
                        line.push(byte[0]);
                        continue;
                    }
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    let text: String = line
                        .iter()
                        .filter(|b| b.is_ascii())
                        .map(|&b| b as char)
                        .collect();
                    self.observer.on_receive(&text);
                    self.counters.rx_lines = self.counters.rx_lines.saturating_add(1);
                    return Ok(Some(text));
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.observer.on_timeout(wait, line.len());
        Ok(None)
    }

    /// Throw away whatever the device sent but nobody read yet.
    ///
    /// Best effort: failures are logged and swallowed.
    pub fn discard_input(&mut self) {
        match self.channel.as_mut() {
            Some(channel) => {
                if let Err(e) = channel.clear_input_buffer() {
                    tracing::debug!("discard_input: {} (ignored)", e);
                }
            }
            None => tracing::debug!("discard_input: port not open (ignored)"),
        }
    }

    /// Read and drop lines until one poll of `poll` yields nothing, then
    /// reset the input buffer. Returns the number of lines dropped.
    ///
    /// Best effort: failures are logged and swallowed.
    pub fn drain_stale_input(&mut self, poll: Duration) -> usize {
        let mut drained = 0;
        while drained < MAX_DRAINED_LINES {
            match self.read_line(ReadTimeout::Fixed(poll)) {
                Ok(Some(line)) => {
                    tracing::debug!("drain_stale_input: dropped {:?}", line);
                    drained += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("drain_stale_input: {} (ignored)", e);
                    break;
                }
            }
        }
        if drained == MAX_DRAINED_LINES {
            tracing::warn!(
                "drain_stale_input: device still talking after {} lines, giving up",
                drained
            );
        }
        self.discard_input();
        drained
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("drop: failed to close port: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.extended_timeout_ms, 17_000);
        assert_eq!(config.write_timeout_ms, 1000);
        assert_eq!(config.inter_byte_timeout_ms, 50);
        assert_eq!(config.settle_delay_ms, 1200);
        assert_eq!(config.inter_command_delay_ms, 2);
    }

    #[test]
    fn test_resolve_timeout() {
        let config = TransportConfig::default();
        assert_eq!(
            config.resolve_timeout(ReadTimeout::Expected(ResponseClass::LongMeasurement)),
            Duration::from_secs(17)
        );
        assert_eq!(
            config.resolve_timeout(ReadTimeout::Expected(ResponseClass::ShortAck)),
            Duration::from_secs(1)
        );
        assert_eq!(
            config.resolve_timeout(ReadTimeout::Expected(ResponseClass::Streaming)),
            Duration::from_secs(1)
        );
        assert_eq!(
            config.resolve_timeout(ReadTimeout::Fixed(Duration::from_millis(300))),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn test_zero_base_timeout_falls_back() {
        let config = TransportConfig {
            timeout_ms: 0,
            ..TransportConfig::default()
        };
        assert_eq!(
            config.resolve_timeout(ReadTimeout::Expected(ResponseClass::ShortAck)),
            Duration::from_millis(DEFAULT_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_unopened_transport() {
        let mut transport = LineTransport::new(TransportConfig::for_port("COM16"));
        assert!(!transport.is_open());
        assert!(matches!(
            transport.write_line("PING|2E"),
            Err(ProtocolError::NotOpen)
        ));
        assert!(matches!(
            transport.read_line(ReadTimeout::Fixed(Duration::ZERO)),
            Err(ProtocolError::NotOpen)
        ));
        assert!(transport.close().is_ok());
        transport.discard_input();
        assert_eq!(transport.drain_stale_input(Duration::ZERO), 0);
        assert_eq!(transport.counters(), TrafficCounters::default());
    }

    #[test]
    fn test_config_partial_json() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"port_name": "COM16", "baud_rate": 115200}"#).unwrap();
        assert_eq!(config.port_name, "COM16");
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.extended_timeout_ms, EXTENDED_TIMEOUT_MS);
    }
}
