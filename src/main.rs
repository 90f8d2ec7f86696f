//! Example ECU simulator CLI.
//!
//! Reads one hex-encoded request frame per line from stdin, feeds it through
//! [`uds_ecu_sim::Simulator::process`], and writes the hex-encoded response to
//! stdout. A thin stand-in for a real transport (CAN/ISO-TP, DoIP, ...),
//! which this binary leaves entirely to its caller.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use uds_ecu_sim::config::EcuConfig;
use uds_ecu_sim::Simulator;

#[derive(Parser, Debug)]
#[command(name = "uds-ecu-sim")]
#[command(about = "Desk-side UDS ECU simulator: hex frames in on stdin, hex frames out on stdout")]
struct Args {
    /// Configuration file path (TOML format). Falls back to a small built-in
    /// identity configuration when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "uds_ecu_sim=debug" } else { "uds_ecu_sim=info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => {
            info!(path, "loading configuration");
            EcuConfig::load_toml(path).with_context(|| format!("failed to load config from {path}"))?
        }
        None => EcuConfig::default_identity(),
    };

    info!(id = %config.id, "starting UDS ECU simulator");

    let mut simulator = Simulator::new(&config);
    simulator.start_supervisor();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read request line")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let request = match hex::decode(trimmed) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(%err, line = trimmed, "invalid hex request, skipping");
                continue;
            }
        };
        let response = simulator.process(&request);
        writeln!(stdout, "{}", hex::encode_upper(response)).context("failed to write response")?;
        stdout.flush().context("failed to flush stdout")?;
    }

    simulator.stop_supervisor().await;
    Ok(())
}
