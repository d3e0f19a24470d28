use epcis_api::app::build_app;
use epcis_api::config::RepositoryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    epcis_observability::init_tracing();

    let config = RepositoryConfig::load()?;
    let bind_address = config.bind_address.clone();

    let (router, services) = build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_address}: {e}"));

    tracing::info!("listening on {}", listener.local_addr()?);

    let shutdown = shutdown_signal();
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;

    services.supervisor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
