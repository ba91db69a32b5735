use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use vescread::{BleTransport, Config, SessionManager, SpeedUnit, TerminalDashboard};

/// Show live VESC telemetry read over Bluetooth Low Energy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device to connect to, or "scan"
    #[arg(short, long)]
    address: Option<String>,

    /// Speed unit: kmh or mph
    #[arg(short, long)]
    unit: Option<String>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(address) = &args.address {
        config.address = address.clone();
    }
    if let Some(unit) = &args.unit {
        config.unit = unit.parse::<SpeedUnit>()?;
    }
    config.validate()?;

    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    log::info!(
        "Target: {}, {} cells ({}V - {}V), unit {}",
        config.fixed_address().unwrap_or("scan"),
        config.cell_series,
        config.cell_min,
        config.cell_max,
        config.unit.label()
    );

    let transport = BleTransport::new().await?;
    let mut session = SessionManager::new(&config, transport, TerminalDashboard::new())?;

    session
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
