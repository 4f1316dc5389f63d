use std::sync::Arc;

use anyhow::Context;

use storefront_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storefront_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(config = ?config, "starting storefront api");

    let bind = config.bind;
    let services = storefront_api::app::build_services(config)
        .await
        .context("failed to initialise the store")?;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    storefront_api::app::serve(listener, Arc::new(services)).await?;
    Ok(())
}
