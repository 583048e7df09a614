//! Command-line arguments

use anyhow::Context;
use clap::Parser;
use pidlink_core::config::ClientConfig;
use std::path::PathBuf;

/// Interactive client for the ball-and-beam PID controller firmware
#[derive(Debug, Parser)]
#[command(name = "pidlink", version, about)]
pub struct Args {
    /// Serial port, e.g. COM16 or /dev/ttyACM0
    pub port: String,

    /// Baud rate [default: 9600]
    #[arg(long)]
    pub baud: Option<u32>,

    /// Base read timeout in milliseconds [default: 1000]
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log every transmitted and received line to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Merge the configuration file (if any) with the command-line flags
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ClientConfig::default(),
        };

        config.transport.port_name = self.port.clone();
        if let Some(baud) = self.baud {
            config.transport.baud_rate = baud;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.transport.timeout_ms = timeout_ms;
        }
        Ok(config)
    }
}
