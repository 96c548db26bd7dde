// nrfgated - Radio gateway daemon
//
//   nrfgated --config /etc/nrfgate/gateway.json
//   nrfgated --host 127.0.0.1 --port 8081 --channel 42 --log-level debug

use clap::Parser;
use nrfgate::config::{GatewayConfig, Overrides};
use nrfgate::gateway::{Gateway, GatewaySettings};
use nrfgate::radio::SimulatedRadio;
use nrfgate::storage::PairingDb;
use nrfgate::upstream::UpstreamConnector;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Gateway between radio devices and the local upstream service
#[derive(Parser, Debug)]
#[command(name = "nrfgated")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON format)
    #[arg(short, long, default_value = "/etc/nrfgate/gateway.json")]
    config: PathBuf,

    /// Pairing database directory
    #[arg(short, long)]
    nodes: Option<PathBuf>,

    /// Upstream host; connects over TCP instead of the local socket
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Upstream TCP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Radio channel (0-125); out of range falls back to the config file
    #[arg(short = 'C', long, allow_hyphen_values = true)]
    channel: Option<i32>,

    /// Transmit power in dBm (0, -6, -12, -18)
    #[arg(short, long, allow_hyphen_values = true)]
    tx_power: Option<i32>,

    /// SPI device of the transceiver
    #[arg(short, long)]
    spi: Option<String>,

    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = args.config;
    let mut config = GatewayConfig::load(&config_path)?;
    Overrides {
        channel: args.channel,
        tx_power: args.tx_power,
        spi: args.spi,
        host: args.host,
        port: args.port,
        pairing_db: args.nodes,
    }
    .apply(&mut config);
    let radio_config = config.radio_config()?;

    // Everything runs on this one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let connector = UpstreamConnector::resolve(config.upstream.clone()).await?;
        let store = PairingDb::open(&config.gateway.pairing_db)?;

        info!(
            config = %config_path.display(),
            upstream = %config.upstream,
            pairings = %config.gateway.pairing_db.display(),
            "starting nrfgated v{}",
            env!("CARGO_PKG_VERSION")
        );
        warn!("no transceiver driver built in, using the simulated radio");

        let mut gateway = Gateway::new(
            SimulatedRadio::new(),
            radio_config,
            connector,
            GatewaySettings::from_config(&config),
        )
        .with_pairing_store(Box::new(store));
        gateway.start()?;

        let handle = gateway.handle();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received, stopping gateway...");
            handle.shutdown().await.ok();
        });

        gateway.run().await?;
        info!("gateway stopped");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
