//! Byte channel abstraction
//!
//! The line transport talks to the device through a [`ByteChannel`]: a duplex
//! byte stream with buffer control. The serial port is the production
//! backend; tests inject in-memory channels.

use std::io::{self, Read, Write};

/// Abstraction for the duplex byte stream under the line transport
///
/// `read` must return within a short bounded wait. `Ok(0)`, or an error of
/// kind `TimedOut`, `WouldBlock` or `Interrupted`, means "no byte available
/// yet" and is polled again until the transport's deadline.
pub trait ByteChannel: Read + Write + Send {
    /// Discard bytes received but not yet read
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Discard bytes written but not yet transmitted
    fn clear_output_buffer(&mut self) -> io::Result<()>;

    /// Release the underlying device. Called at most once.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "serial")]
pub use self::serial_channel::SerialChannel;

#[cfg(feature = "serial")]
mod serial_channel {
    use serialport::SerialPort;
    use std::io::{self, Read, Write};
    use std::time::Duration;

    use super::ByteChannel;

    /// Serial port wrapper implementing [`ByteChannel`]
    ///
    /// `serialport` has a single timeout for both directions, so the channel
    /// switches to the write timeout around each write and back afterwards.
    pub struct SerialChannel {
        port: Box<dyn SerialPort>,
        read_timeout: Duration,
        write_timeout: Duration,
    }

    impl SerialChannel {
        /// Wrap an opened port. `read_timeout` should already be set on it.
        pub fn new(port: Box<dyn SerialPort>, read_timeout: Duration, write_timeout: Duration) -> Self {
            Self {
                port,
                read_timeout,
                write_timeout,
            }
        }

        fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.port.set_timeout(timeout).map_err(io::Error::other)
        }
    }

    impl Read for SerialChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.port.read(buf)
        }
    }

    impl Write for SerialChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.set_timeout(self.write_timeout)?;
            let written = self.port.write(buf);
            // The bytes are gone either way; a stale timeout only slows reads
            if let Err(e) = self.set_timeout(self.read_timeout) {
                tracing::warn!("serial: failed to restore read timeout: {}", e);
            }
            written
        }

        fn flush(&mut self) -> io::Result<()> {
            self.port.flush()
        }
    }

    impl ByteChannel for SerialChannel {
        fn clear_input_buffer(&mut self) -> io::Result<()> {
            self.port
                .clear(serialport::ClearBuffer::Input)
                .map_err(io::Error::other)
        }

        fn clear_output_buffer(&mut self) -> io::Result<()> {
            self.port
                .clear(serialport::ClearBuffer::Output)
                .map_err(io::Error::other)
        }

        // The descriptor itself is released when the port is dropped.
    }

}
