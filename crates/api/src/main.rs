use anyhow::Context;

use catering_api::{app, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    catering_observability::init(config.log_format);
    for warning in &config.warnings {
        tracing::warn!("{warning}");
    }

    let services = app::services::build_services(&config).await?;
    let router = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router).await?;
    Ok(())
}
