//! Traffic observers
//!
//! The line transport reports every transmitted frame, received line and
//! expired read to a [`TrafficObserver`] supplied at construction. The
//! default observer does nothing; [`TracingObserver`] forwards the events to
//! `tracing` at debug level, including a hex dump of transmitted bytes.

use std::time::Duration;

/// Receives transport traffic events
pub trait TrafficObserver: Send {
    /// A line was written; `bytes` is exactly what went to the channel
    fn on_transmit(&self, _line: &str, _bytes: &[u8]) {}

    /// A complete line was received
    fn on_receive(&self, _line: &str) {}

    /// A read expired after `waited` with `partial` unterminated bytes discarded
    fn on_timeout(&self, _waited: Duration, _partial: usize) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TrafficObserver for NoopObserver {}

/// Observer that logs traffic through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TrafficObserver for TracingObserver {
    fn on_transmit(&self, line: &str, bytes: &[u8]) {
        tracing::debug!(target: "pidlink::traffic", "[TX] {}  ({})", line.trim(), hex_dump(bytes));
    }

    fn on_receive(&self, line: &str) {
        tracing::debug!(target: "pidlink::traffic", "[RX] {}", line);
    }

    fn on_timeout(&self, waited: Duration, partial: usize) {
        tracing::debug!(
            target: "pidlink::traffic",
            "[RX TIMEOUT] no line after {}ms ({} partial bytes dropped)",
            waited.as_millis(),
            partial
        );
    }
}

/// Space separated uppercase hex, e.g. `50 49 4E 47`
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
