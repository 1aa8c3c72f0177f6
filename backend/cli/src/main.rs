mod config;
mod config_cmd;
mod scan_cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use labelscan_config::{config_dir, config_file_path, load_and_prepare, LabelScanConfig};
use labelscan_core::ScanTransport;
use labelscan_gateway::{start_server, GatewayState};
use labelscan_logging::init_logger;
use labelscan_transport::HttpTransport;

#[derive(Parser)]
#[command(name = "labelscan")]
#[command(about = "LabelScan: multi-photo product label reader")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.labelscan/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Capture label photos from files and upload them as one scan
    Scan {
        /// Image files in capture order (front first in labeled mode)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Let the auto-capture timer take the first photo
        #[arg(long)]
        auto: bool,
    },
    /// Check whether the scan server is reachable
    Health,
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: config_cmd::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli
        .config
        .unwrap_or_else(|| config_file_path(&config_dir()));

    if let Commands::Config { action } = &cli.command {
        init_logger(None::<PathBuf>, "warn");
        return config_cmd::run(action, &path).await;
    }

    let config = load_and_prepare(&path).await?;
    init_logging(&config);

    match cli.command {
        Commands::Serve { port } => run_server(&config, port).await,
        Commands::Scan { files, auto } => scan_cmd::run(&config, files, auto).await,
        Commands::Health => check_health(&config).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(config: &LabelScanConfig) {
    let logging = config.logging.clone().unwrap_or_default();
    let level = logging.level.unwrap_or_else(|| "info".into());
    init_logger(logging.dir.map(PathBuf::from), &level);
}

async fn run_server(config: &LabelScanConfig, port: Option<u16>) -> Result<()> {
    let addr = config::bind_addr(config, port)?;
    let limits = config::scan_limits(config);
    let extractor = config::build_extractor(config)?;
    info!(
        %addr,
        extractor = extractor.name(),
        max_slots = limits.max_slots,
        workers = limits.workers,
        "Starting LabelScan server"
    );
    start_server(addr, GatewayState::new(extractor, limits)).await
}

async fn check_health(config: &LabelScanConfig) -> Result<()> {
    let settings = config::transport_settings(config);
    let base_url = settings.base_url.clone();
    let transport = HttpTransport::new(settings)?;
    if transport.check_health().await {
        println!("LabelScan server at {base_url} is reachable");
        Ok(())
    } else {
        anyhow::bail!("LabelScan server at {base_url} is not reachable")
    }
}
