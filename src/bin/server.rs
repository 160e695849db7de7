//! metric-server: accepts metric batches over REST and gRPC and keeps the
//! aggregate in memory, a snapshot file or PostgreSQL.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use metric_track::cli::ServerArgs;
use metric_track::config::render;
use metric_track::logging::setup_logging;
use metric_track::server::{self, config::ServerConfig};
use metric_track::signal::shutdown_on_signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    let config = ServerConfig::resolve(&args)?;

    if args.check_config {
        if let Err(e) = config.validate() {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }
    if args.show_config {
        println!("{}", render(&config, args.config_format)?);
        return Ok(());
    }
    if let Err(e) = config.validate() {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(args.log_level)?;
    info!("Starting metric-server {}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    server::run(config, cancel).await?;
    Ok(())
}
