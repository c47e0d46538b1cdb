//! SolsTiS CLI Client
//!
//! Command-line interface for driving a SolsTiS laser controller.

use std::net::IpAddr;

use clap::{Parser, Subcommand, ValueEnum};
use solstis::{Config, SolstisClient, SolstisError};
use tracing_subscriber::{fmt, EnvFilter};

/// SolsTiS CLI
#[derive(Parser, Debug)]
#[command(name = "solstis-cli")]
#[command(about = "CLI for the SolsTiS tunable laser controller")]
#[command(version)]
struct Args {
    /// Instrument host (overrides SOLSTIS_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Instrument port (overrides SOLSTIS_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Local address to connect from (overrides SOLSTIS_CLIENT_IP)
    #[arg(long)]
    client_ip: Option<IpAddr>,

    /// Reply timeout in milliseconds, 0 waits forever
    /// (overrides SOLSTIS_READ_TIMEOUT_MS)
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Echo text through the instrument
    Ping {
        #[arg(default_value = "hello")]
        text: String,
    },

    /// Tune to a wavelength (nm) with the wavelength meter
    SetWave {
        wavelength: f64,
    },

    /// Show the wavelength-meter tuning state
    PollWave,

    /// Engage the wavelength lock
    Lock,

    /// Release the wavelength lock
    Unlock,

    /// Stop wavelength-meter tuning
    StopWave,

    /// Tune to a wavelength (nm) from the wavelength table
    MoveWave {
        wavelength: f64,
    },

    /// Show the table-tuning state
    PollMove,

    /// Abort table tuning
    StopMove,

    /// Set a tuning element to a percentage of full scale
    Tune {
        #[arg(value_enum)]
        element: Element,

        /// Setting in percent (0-100)
        setting: f64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Element {
    Etalon,
    Cavity,
    FineCavity,
    Resonator,
    FineResonator,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,solstis=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> solstis::Result<()> {
    let config = build_config(&args)?;
    let mut client = SolstisClient::connect(&config)?;
    client.start_link()?;

    match args.command {
        Commands::Ping { text } => println!("{}", client.ping(&text)?),
        Commands::SetWave { wavelength } => {
            let reading = client.set_wave_m(wavelength)?;
            println!(
                "current wavelength: {} nm{}",
                reading.current_wavelength,
                if reading.extended_zone { " (extended zone)" } else { "" }
            );
        }
        Commands::PollWave => {
            let poll = client.poll_wave_m()?;
            println!("state: {:?}", poll.state);
            println!("current wavelength: {} nm", poll.current_wavelength);
            println!("lock engaged: {}", poll.lock_engaged);
            println!("extended zone: {}", poll.extended_zone);
        }
        Commands::Lock => client.lock_wave_m(true)?,
        Commands::Unlock => client.lock_wave_m(false)?,
        Commands::StopWave => println!("current wavelength: {} nm", client.stop_wave_m()?),
        Commands::MoveWave { wavelength } => client.move_wave_t(wavelength)?,
        Commands::PollMove => {
            let poll = client.poll_move_wave_t()?;
            println!("state: {:?}", poll.state);
            println!("current wavelength: {} nm", poll.current_wavelength);
        }
        Commands::StopMove => client.stop_move_wave_t()?,
        Commands::Tune { element, setting } => match element {
            Element::Etalon => client.tune_etalon(setting)?,
            Element::Cavity => client.tune_cavity(setting)?,
            Element::FineCavity => client.fine_tune_cavity(setting)?,
            Element::Resonator => client.tune_resonator(setting)?,
            Element::FineResonator => client.fine_tune_resonator(setting)?,
        },
    }

    client.close();
    Ok(())
}

/// Environment first, then command-line overrides
fn build_config(args: &Args) -> Result<Config, SolstisError> {
    let config = apply_args(Config::from_env()?, args);
    tracing::debug!("Using instrument at {}", config.endpoint().remote());
    Ok(config)
}

fn apply_args(mut config: Config, args: &Args) -> Config {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ip) = args.client_ip {
        config.client_address = Some(ip);
    }
    if let Some(ms) = args.timeout_ms {
        config.read_timeout = (ms > 0).then(|| std::time::Duration::from_millis(ms));
    }
    config
}
