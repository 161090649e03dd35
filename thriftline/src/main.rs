use anyhow::{Context, Result};
use clap::Parser;

use thriftline_client::ThriftFacade;
use thriftline_core::{ClientConfig, Resolved};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path of the config file; with no file, defaults plus the
    /// THRIFTCLIENT_* environment are used
    #[clap(short, long, value_parser)]
    config: Option<String>,
    /// Open and close the configured transport once
    #[clap(long)]
    probe: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            ClientConfig::load(path).with_context(|| format!("loading config file {path}"))?
        }
        None => ClientConfig::default(),
    };
    config.overlay_env()?;

    let resolved = Resolved::from_config(&config)?;
    println!("{}", serde_json::to_string_pretty(&resolved)?);

    // constructing a facade validates the plan against this build: protocol
    // availability, tls support, platform socket support
    let facade = ThriftFacade::new(&resolved, |_i, _o| ())?;
    tracing::info!("configuration resolved");

    if args.probe {
        let transport = facade.transport();
        transport.open().context("opening transport")?;
        transport.close().context("closing transport")?;
        tracing::info!("probe succeeded");
    }
    Ok(())
}
