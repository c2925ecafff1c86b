//! Service wiring: picks the store adapter and loads the catalog seed.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use catering_infra::{CatalogStore, FulfillmentService, FulfillmentStore, InMemoryStore, PostgresStore};
use catering_inventory::CatalogSeed;

use crate::config::{AppConfig, StoreConfig};

pub async fn build_services(config: &AppConfig) -> anyhow::Result<FulfillmentService> {
    let store: Arc<dyn FulfillmentStore> = match &config.store {
        StoreConfig::InMemory => {
            tracing::info!("using in-memory store");
            Arc::new(InMemoryStore::new())
        }
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresStore::connect(database_url, *max_connections)
                .await
                .context("connecting to postgres")?;
            store.ensure_schema().await.context("applying schema")?;
            tracing::info!(max_connections, "using postgres store");
            Arc::new(store)
        }
    };

    if let Some(path) = &config.catalog_seed {
        let seed = load_seed(path)?;
        store
            .seed(&seed)
            .await
            .with_context(|| format!("seeding catalog from {}", path.display()))?;
        tracing::info!(
            ingredients = seed.ingredients.len(),
            dishes = seed.dishes.len(),
            menus = seed.menus.len(),
            "catalog seeded"
        );
    }

    Ok(FulfillmentService::new(store))
}

pub fn load_seed(path: &Path) -> anyhow::Result<CatalogSeed> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog seed {}", path.display()))?;
    let seed: CatalogSeed = serde_json::from_str(&raw)
        .with_context(|| format!("parsing catalog seed {}", path.display()))?;
    seed.validate()
        .map_err(|e| anyhow::anyhow!("invalid catalog seed {}: {e}", path.display()))?;
    Ok(seed)
}
