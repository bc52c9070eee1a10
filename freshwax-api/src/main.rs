use std::path::PathBuf;

use clap::Parser;

use freshwax_core::{logging, Config};

#[derive(Debug, Parser)]
#[command(name = "freshwax", about = "Freshwax broadcast core")]
struct Args {
    /// Path to a TOML config file; defaults to ./freshwax.toml if present.
    #[arg(short, long, env = "FRESHWAX_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen port.
    #[arg(short, long, env = "FRESHWAX_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.http_port = port;
    }

    logging::init(&config.logging)?;
    tracing::info!(?config, "configuration loaded");

    freshwax_api::server::run(config).await
}
