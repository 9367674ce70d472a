use std::sync::Arc;

use relish_api::{
    api::{create_router, AppState},
    config::Config,
    db::{
        create_pool, create_redis_client, Cache, CatalogWriter, MemoryCatalog, PostgresCatalog,
        SnapshotSource,
    },
    services::{
        CacheCoordinator, NarrativeService, OllamaGenerator, SnapshotLoader, WriteGateway,
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relish_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Catalog store: a JSON file when configured, PostgreSQL otherwise
    let (source, writer): (Arc<dyn SnapshotSource>, Arc<dyn CatalogWriter>) =
        match &config.catalog_file {
            Some(path) => {
                let catalog = Arc::new(MemoryCatalog::from_file(path).await?);
                (catalog.clone() as Arc<dyn SnapshotSource>, catalog as Arc<dyn CatalogWriter>)
            }
            None => {
                let pool = create_pool(&config.database_url, config.load_timeout())?;
                if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                    tracing::warn!(error = %e, "Migrations not applied, continuing without them");
                }
                let catalog = Arc::new(PostgresCatalog::new(pool));
                (catalog.clone() as Arc<dyn SnapshotSource>, catalog as Arc<dyn CatalogWriter>)
            }
        };

    let (cache, cache_handle) = match &config.redis_url {
        Some(url) => {
            let (cache, handle) = Cache::new(create_redis_client(url)?);
            (Some(cache), Some(handle))
        }
        None => {
            tracing::info!("REDIS_URL not set, narrative responses will not be cached");
            (None, None)
        }
    };

    let coordinator = Arc::new(CacheCoordinator::new(
        SnapshotLoader::new(source, config.load_timeout()),
        config.snapshot_ttl(),
    ));
    let warm = coordinator.get_snapshot().await;
    tracing::info!(
        generation = warm.generation,
        degraded = warm.degraded,
        places = warm.places.len(),
        "Catalog warmed"
    );
    drop(warm);

    let generator = OllamaGenerator::new(config.llm_url.clone(), config.llm_model.clone());
    let narrative = NarrativeService::new(
        Arc::new(generator),
        cache,
        config.llm_model.clone(),
        config.narrative_cache_ttl_secs,
    );
    let writes = WriteGateway::new(writer, coordinator.clone());

    let app = create_router(AppState::new(coordinator, writes, narrative));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
