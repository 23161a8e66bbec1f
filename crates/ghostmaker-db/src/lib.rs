//! Asset metadata persistence
//!
//! `MetadataStore` is the record store for `MediaAsset`s. `InMemoryMetadataStore` backs
//! tests and single-node runs; `PgMetadataStore` is the production backend.

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::InMemoryMetadataStore;
pub use postgres::PgMetadataStore;
pub use store::{AssetUpdate, MetadataError, MetadataResult, MetadataStore};

use ghostmaker_core::{MetadataBackend, MetadataConfig};
use std::sync::Arc;

/// Create the metadata store selected by configuration, running migrations for Postgres.
pub async fn create_metadata_store(
    config: &MetadataConfig,
) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config.backend {
        MetadataBackend::Memory => Ok(Arc::new(InMemoryMetadataStore::new())),
        MetadataBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                MetadataError::Config("DATABASE_URL not configured".to_string())
            })?;
            let store = PgMetadataStore::connect(url, config.max_connections).await?;
            store.migrate().await?;
            tracing::info!("Connected to Postgres metadata store");
            Ok(Arc::new(store))
        }
    }
}
