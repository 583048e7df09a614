//! Operator console
//!
//! A small REPL over a [`CommandSession`]. Local commands (`help`, `ports`,
//! `crc`, `quit`) are handled here; everything else goes to the device.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use pidlink_core::protocol::{list_ports, CommandMode, CommandSession, Frame};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often the prompt loop looks at the interrupt flag while idle
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

const HELP: &str = "
=== Device commands ===
PING                 -> should answer: PONG
ECHO(txt)            -> answers: txt (e.g. ECHO(hello))
M(10) / R(5) / V(3)  -> legacy commands (ACK)
S / I / B / STOP     -> control; B/STOP ends TEST or PID
---------------------------
TARGET(x)            -> set the setpoint (distance from the sensor)
PID(kp,ki,kd)        -> set the PID gains
ZERO(x)              -> set the servo zero position
TEST                 -> PID tuning mode (streaming telemetry, Ctrl+C stops)
START                -> graded run (PID + MAE, takes ~15s)
---------------------------
help                 -> show this list
ports                -> list serial ports
crc <text>           -> show payload, checksum and frame for <text>
quit / exit / q      -> leave
";

/// Whether the REPL keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Interactive console writing to `out`
pub struct Console<W: Write> {
    session: CommandSession,
    out: W,
    /// Set by the Ctrl+C handler
    interrupt: Arc<AtomicBool>,
}

impl<W: Write> Console<W> {
    pub fn new(session: CommandSession, out: W, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            session,
            out,
            interrupt,
        }
    }

    /// Read commands from `input` until quit, end of input or Ctrl+C
    pub fn run(&mut self, input: Receiver<String>) -> anyhow::Result<()> {
        writeln!(self.out, "help, ports, quit")?;
        loop {
            write!(self.out, "> ")?;
            self.out.flush()?;

            let raw = loop {
                if self.interrupt.load(Ordering::SeqCst) {
                    writeln!(self.out)?;
                    return Ok(());
                }
                match input.recv_timeout(INTERRUPT_POLL) {
                    Ok(raw) => break raw,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return Ok(()),
                }
            };

            if self.handle_line(&raw)? == Flow::Quit {
                return Ok(());
            }
        }
    }

    /// Handle one line of operator input
    pub fn handle_line(&mut self, raw: &str) -> anyhow::Result<Flow> {
        let cmd = raw.trim();
        if cmd.is_empty() {
            return Ok(Flow::Continue);
        }

        let upper = cmd.to_ascii_uppercase();
        match upper.as_str() {
            "QUIT" | "EXIT" | "Q" => return Ok(Flow::Quit),
            "HELP" => {
                writeln!(self.out, "{}", HELP)?;
                return Ok(Flow::Continue);
            }
            "PORTS" => {
                self.show_ports()?;
                return Ok(Flow::Continue);
            }
            _ => {}
        }
        if let Some(text) = upper.strip_prefix("CRC ").map(|_| &cmd[4..]) {
            self.show_crc(text)?;
            return Ok(Flow::Continue);
        }

        // Device errors end this command, not the console
        if let Err(e) = self.run_command(cmd) {
            tracing::warn!("command {:?} failed: {:#}", cmd, e);
            writeln!(self.out, "error: {:#}", e)?;
        }
        Ok(Flow::Continue)
    }

    fn show_ports(&mut self) -> anyhow::Result<()> {
        for port in list_ports() {
            match &port.product {
                Some(product) => writeln!(self.out, "{}  ({})", port.name, product)?,
                None => writeln!(self.out, "{}", port.name)?,
            }
        }
        Ok(())
    }

    fn show_crc(&mut self, text: &str) -> anyhow::Result<()> {
        let breakdown = Frame::new(text).breakdown();
        writeln!(self.out, "payload : {}", breakdown.payload)?;
        writeln!(self.out, "crc     : {}", breakdown.checksum_hex)?;
        writeln!(self.out, "frame   : {}", breakdown.frame)?;
        Ok(())
    }

    fn run_command(&mut self, cmd: &str) -> anyhow::Result<()> {
        let frame = self.session.send(cmd)?;
        writeln!(self.out, "-> {}", frame)?;

        let mode = self.session.command_mode();
        if mode == CommandMode::Measurement {
            writeln!(
                self.out,
                "(waiting for the MAE result... this can take ~15s, Ctrl+C quits after it)"
            )?;
            self.out.flush()?;
        }

        let lines = self.session.receive_reply()?;
        if lines.is_empty() {
            writeln!(self.out, "<- (no response)")?;
        }
        for line in &lines {
            writeln!(self.out, "<- {}", line)?;
        }

        if mode == CommandMode::Telemetry {
            self.follow_telemetry()?;
        }
        Ok(())
    }

    fn follow_telemetry(&mut self) -> anyhow::Result<()> {
        // A Ctrl+C already pending from the acknowledgement wait stops at once
        writeln!(
            self.out,
            "(telemetry active - Ctrl+C to stop, one pressed while waiting stops it now)"
        )?;
        self.out.flush()?;

        let out = &mut self.out;
        let mut write_error = None;
        let outcome = self.session.follow_telemetry(&self.interrupt, |line| {
            if write_error.is_none() {
                write_error = writeln!(out, "<- {}", line).and_then(|_| out.flush()).err();
            }
        });
        // This Ctrl+C was for the telemetry, not for the console
        self.interrupt.store(false, Ordering::SeqCst);

        writeln!(self.out, "\n(streaming interrupted)")?;
        match outcome {
            Ok(stop) => {
                writeln!(self.out, "-> {}", stop.frame)?;
                match stop.ack {
                    Some(ack) => writeln!(self.out, "<- {}", ack)?,
                    None => writeln!(self.out, "<- (no response to STOP)")?,
                }
            }
            Err(e) => writeln!(self.out, "error while streaming: {}", e)?,
        }
        writeln!(self.out, "(TEST mode finished)\n")?;

        if let Some(e) = write_error {
            return Err(e.into());
        }
        Ok(())
    }

    /// Close the port and hand back the output
    pub fn shutdown(mut self) -> W {
        if let Err(e) = self.session.close() {
            tracing::warn!("failed to close port cleanly: {}", e);
        }
        self.out
    }
}
