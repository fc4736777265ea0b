use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use tally::config::DEFAULT_CONFIG_FILE;
use tally::{Config, Service, TransportKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tally-sender",
    version,
    about = "Cycle TSL UMD tally states through configured sources"
)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Receiver host (overrides server_config.ip)
    #[arg(long)]
    host: Option<String>,

    /// Receiver port (overrides server_config.port)
    #[arg(long, short)]
    port: Option<u16>,

    /// Transport: udp or tcp (overrides server_config.transport)
    #[arg(long, short, value_parser = parse_transport)]
    transport: Option<TransportKind>,

    /// Milliseconds between messages
    #[arg(long, short = 'i')]
    interval_ms: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_transport(s: &str) -> Result<TransportKind, String> {
    s.parse().map_err(|e: tally::TallyError| e.to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let mut config = Config::load_or_default(&args.config);
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(transport) = args.transport {
        config.server.transport = transport;
    }
    if let Some(ms) = args.interval_ms {
        config.send_interval = Duration::from_millis(ms);
    }

    tracing::info!(target: "tally::config", "script version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(target: "tally::config", "server address: {}", config.server.endpoint());
    tracing::info!(target: "tally::config", "transport method: {}", config.server.transport);

    let (stop_tx, stop_rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        tracing::error!(error = %e, "failed to install signal handler");
        return ExitCode::FAILURE;
    }

    let mut service = Service::from_config(config);
    if let Err(e) = service.start() {
        tracing::error!(error = %e, "failed to start TSL connection");
        return ExitCode::FAILURE;
    }

    let _ = stop_rx.recv();
    tracing::info!(target: "tally::config", "process exiting");
    service.stop();

    ExitCode::SUCCESS
}
