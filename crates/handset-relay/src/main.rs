//! handset relay service.
//!
//!   handset-relay --bind 0.0.0.0:3002

use clap::Parser;
use handset_relay::RelayConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("handset_relay=info".parse()?))
        .init();

    let config = RelayConfig::parse();
    tracing::info!("Starting relay on {}", config.bind);
    handset_relay::serve(config).await?;
    Ok(())
}
