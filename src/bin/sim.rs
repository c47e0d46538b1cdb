//! SolsTiS Simulator Binary
//!
//! Runs the instrument simulator so the CLI can be tried without hardware.

use clap::Parser;
use solstis::network::Simulator;
use tracing_subscriber::{fmt, EnvFilter};

/// SolsTiS instrument simulator
#[derive(Parser, Debug)]
#[command(name = "solstis-sim")]
#[command(about = "Simulated SolsTiS laser controller")]
#[command(version)]
struct Args {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listen port
    #[arg(short, long, default_value = "39933")]
    port: u16,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,solstis=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    let listen = format!("{}:{}", args.host, args.port);

    tracing::info!("SolsTiS Simulator v{}", solstis::VERSION);

    let mut simulator = match Simulator::bind(&listen) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start simulator: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Simulated wavelength: {} nm", simulator.wavelength());

    // Runs until the process is killed
    simulator.run();

    tracing::info!("Simulator stopped");
}
