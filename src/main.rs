use anyhow::Result;

use beamstream::config::StreamConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = StreamConfig::from_args()?;
    beamstream::session::run(config).await?;
    Ok(())
}
