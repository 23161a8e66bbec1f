use async_trait::async_trait;
use ghostmaker_core::models::{AssetId, AssetStatus, MediaAsset};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::store::{AssetUpdate, MetadataError, MetadataResult, MetadataStore};

/// In-process metadata store. Every operation takes the single write lock, which makes
/// `insert_if_absent` and `compare_and_update` atomic.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    assets: RwLock<HashMap<AssetId, MediaAsset>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.assets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assets.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, id: &AssetId) -> MetadataResult<Option<MediaAsset>> {
        Ok(self.assets.read().await.get(id).cloned())
    }

    async fn insert_if_absent(&self, asset: &MediaAsset) -> MetadataResult<bool> {
        let mut assets = self.assets.write().await;
        if assets.contains_key(&asset.id) {
            return Ok(false);
        }
        assets.insert(asset.id.clone(), asset.clone());
        Ok(true)
    }

    async fn update(&self, id: &AssetId, update: AssetUpdate) -> MetadataResult<MediaAsset> {
        let mut assets = self.assets.write().await;
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| MetadataError::NotFound(id.to_string()))?;
        update.apply(asset);
        Ok(asset.clone())
    }

    async fn compare_and_update(
        &self,
        id: &AssetId,
        expected: &[AssetStatus],
        update: AssetUpdate,
    ) -> MetadataResult<Option<MediaAsset>> {
        let mut assets = self.assets.write().await;
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| MetadataError::NotFound(id.to_string()))?;
        if !expected.contains(&asset.status) {
            return Ok(None);
        }
        update.apply(asset);
        Ok(Some(asset.clone()))
    }

    async fn list_by_status(&self, status: AssetStatus) -> MetadataResult<Vec<MediaAsset>> {
        let mut assets: Vec<MediaAsset> = self
            .assets
            .read()
            .await
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(assets)
    }
}
