//! Shared test doubles: a scripted in-memory byte channel and a recording
//! traffic observer.

#![allow(dead_code)]

use pidlink_core::protocol::{ByteChannel, LineTransport, TrafficObserver, TransportConfig};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Observable state behind a [`ScriptedChannel`]
#[derive(Default)]
pub struct ChannelState {
    /// Bytes the "device" has sent and nobody read yet
    pub incoming: VecDeque<u8>,
    /// Everything written by the transport
    pub written: Vec<u8>,
    /// Replies pushed into `incoming`, one per written line
    pub replies: VecDeque<Vec<u8>>,
    /// Error returned by `read` instead of `Ok(0)` when nothing is pending
    pub idle_error: Option<ErrorKind>,
    /// Error returned by the next `read` whatever is pending
    pub read_failure: Option<ErrorKind>,
    pub fail_clear: bool,
    pub fail_close: bool,
    pub input_clears: usize,
    pub output_clears: usize,
    pub closes: usize,
}

/// In-memory [`ByteChannel`] whose device side is scripted by the test
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    pub state: Arc<Mutex<ChannelState>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `bytes` available for reading
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.state.lock().unwrap().incoming.extend(bytes);
    }

    /// Queue the device's answer to the next written line
    pub fn reply_with(&self, bytes: &[u8]) {
        self.state.lock().unwrap().replies.push_back(bytes.to_vec());
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().unwrap().written).into_owned()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().incoming.len()
    }

    pub fn boxed(&self) -> Box<dyn ByteChannel> {
        Box::new(self.clone())
    }
}

impl Read for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.read_failure.take() {
            return Err(io::Error::new(kind, "scripted read failure"));
        }
        if let Some(byte) = state.incoming.pop_front() {
            buf[0] = byte;
            return Ok(1);
        }
        let idle_error = state.idle_error;
        drop(state);

        // Behave like a port with a short inter-byte timeout
        std::thread::sleep(Duration::from_millis(1));
        match idle_error {
            Some(kind) => Err(io::Error::new(kind, "no data")),
            None => Ok(0),
        }
    }
}

impl Write for ScriptedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.written.extend_from_slice(buf);
        for _ in buf.iter().filter(|&&b| b == b'\n') {
            if let Some(reply) = state.replies.pop_front() {
                state.incoming.extend(reply);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteChannel for ScriptedChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_clear {
            return Err(io::Error::other("clear not supported"));
        }
        state.incoming.clear();
        state.input_clears += 1;
        Ok(())
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_clear {
            return Err(io::Error::other("clear not supported"));
        }
        state.output_clears += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        if state.fail_close {
            return Err(io::Error::other("device vanished"));
        }
        Ok(())
    }
}

/// Observer that records every event as a short string
#[derive(Clone, Default)]
pub struct RecordingObserver {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl TrafficObserver for RecordingObserver {
    fn on_transmit(&self, line: &str, bytes: &[u8]) {
        self.events
            .lock()
            .unwrap()
            .push(format!("tx {} ({} bytes)", line, bytes.len()));
    }

    fn on_receive(&self, line: &str) {
        self.events.lock().unwrap().push(format!("rx {}", line));
    }

    fn on_timeout(&self, _waited: Duration, partial: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("timeout ({} partial)", partial));
    }
}

/// Transport settings with every delay shortened for tests
pub fn fast_config() -> TransportConfig {
    TransportConfig {
        port_name: "scripted".to_string(),
        timeout_ms: 50,
        extended_timeout_ms: 400,
        settle_delay_ms: 0,
        inter_command_delay_ms: 0,
        ..TransportConfig::default()
    }
}

/// Open transport over a fresh scripted channel
pub fn open_transport(config: TransportConfig) -> (LineTransport, ScriptedChannel) {
    let channel = ScriptedChannel::new();
    let mut transport = LineTransport::new(config);
    transport.open_with(channel.boxed()).unwrap();
    (transport, channel)
}

/// Open transport over a fresh scripted channel, reporting to a recorder
pub fn observed_transport(
    config: TransportConfig,
) -> (LineTransport, ScriptedChannel, RecordingObserver) {
    let channel = ScriptedChannel::new();
    let observer = RecordingObserver::default();
    let mut transport = LineTransport::with_observer(config, Box::new(observer.clone()));
    transport.open_with(channel.boxed()).unwrap();
    (transport, channel, observer)
}
