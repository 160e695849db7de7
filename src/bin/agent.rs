//! metric-agent: samples runtime and host metrics and reports them to a
//! metric-server over REST or gRPC.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use metric_track::agent::{self, config::AgentConfig};
use metric_track::cli::AgentArgs;
use metric_track::config::render;
use metric_track::logging::setup_logging;
use metric_track::signal::shutdown_on_signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = AgentArgs::parse();
    let config = AgentConfig::resolve(&args)?;

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
    info!("Starting metric-agent {}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    agent::run(config, cancel).await?;
    info!("metric-agent stopped gracefully");
    Ok(())
}
