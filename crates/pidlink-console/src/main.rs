//! pidlink operator console
//!
//! Usage:
//!   pidlink [OPTIONS] <PORT>
//!
//! Options:
//!   --baud RATE        Baud rate (default: 9600)
//!   --timeout-ms MS    Base read timeout (default: 1000)
//!   --config FILE      JSON configuration file
//!   --debug            Log TX/RX traffic to stderr

mod cli;
mod console;

use anyhow::Context;
use clap::Parser;
use pidlink_core::protocol::{
    CommandSession, LineTransport, NoopObserver, TracingObserver, TrafficObserver,
};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use cli::Args;
use console::Console;

/// Extra quiet time after opening before stale output is drained
const STARTUP_QUIET: Duration = Duration::from_millis(1000);

/// Poll used while draining stale output at start-up
const STARTUP_DRAIN_POLL: Duration = Duration::from_millis(200);

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let config = args.client_config()?;
    // Installed before opening so a Ctrl+C during start-up still closes the port
    let interrupt = install_interrupt_handler()?;
    let observer: Box<dyn TrafficObserver> = if args.debug {
        Box::new(TracingObserver)
    } else {
        Box::new(NoopObserver)
    };

    let mut transport = LineTransport::with_observer(config.transport.clone(), observer);
    transport
        .open()
        .with_context(|| format!("failed to open {}", config.transport.port_name))?;
    println!(
        "Opened {} @ {} baud",
        config.transport.port_name, config.transport.baud_rate
    );

    if !interrupt.load(Ordering::SeqCst) {
        std::thread::sleep(STARTUP_QUIET);
        let drained = transport.drain_stale_input(STARTUP_DRAIN_POLL);
        tracing::debug!("startup: dropped {} stale line(s)", drained);
        println!("(port ready, input buffer cleared)\n");
    }

    let session = CommandSession::new(transport, config.session);
    let mut console = Console::new(session, std::io::stdout(), interrupt);
    let outcome = console.run(spawn_stdin_reader());

    // The port is closed whatever happened above
    console.shutdown();
    println!("Port closed.");
    outcome
}

/// Route Ctrl+C into a flag the console polls instead of killing the process
fn install_interrupt_handler() -> anyhow::Result<Arc<AtomicBool>> {
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("failed to install Ctrl+C handler")?;
    Ok(interrupt)
}

fn init_tracing(debug: bool) {
    let default = if debug {
        "warn,pidlink_core=debug,pidlink=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read stdin lines on their own thread so the console can notice Ctrl+C
/// while waiting at the prompt. The channel disconnects at end of input.
fn spawn_stdin_reader() -> crossbeam_channel::Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
