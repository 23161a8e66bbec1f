use async_trait::async_trait;
use ghostmaker_core::models::{AssetId, AssetStatus, MediaAsset, Manifest, ProcessingJob, Rendition};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Executor, PgPool, Postgres, Row};
use std::time::Duration;

use crate::store::{AssetUpdate, MetadataError, MetadataResult, MetadataStore};

const SELECT_ASSET: &str = "SELECT project_id, media_id, original_key, kind, status, version, \
     size_bytes, width, height, visual_digest, content_digest, renditions, manifest, error, job, \
     uploaded_at, processed_at, updated_at FROM media_assets";

const UPSERT_ASSET: &str = "INSERT INTO media_assets (project_id, media_id, original_key, kind, \
     status, version, size_bytes, width, height, visual_digest, content_digest, renditions, \
     manifest, error, job, uploaded_at, processed_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
     ON CONFLICT (project_id, media_id) DO UPDATE SET \
     original_key = EXCLUDED.original_key, kind = EXCLUDED.kind, status = EXCLUDED.status, \
     version = EXCLUDED.version, size_bytes = EXCLUDED.size_bytes, width = EXCLUDED.width, \
     height = EXCLUDED.height, visual_digest = EXCLUDED.visual_digest, \
     content_digest = EXCLUDED.content_digest, renditions = EXCLUDED.renditions, \
     manifest = EXCLUDED.manifest, error = EXCLUDED.error, job = EXCLUDED.job, \
     processed_at = EXCLUDED.processed_at, updated_at = EXCLUDED.updated_at";

/// Postgres-backed metadata store. Manifests and renditions are stored as JSONB.
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> MetadataResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> MetadataResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn upsert<'e, E>(executor: E, asset: &MediaAsset) -> MetadataResult<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(UPSERT_ASSET)
            .bind(&asset.id.project_id)
            .bind(&asset.id.media_id)
            .bind(&asset.original_key)
            .bind(asset.kind.to_string())
            .bind(asset.status.to_string())
            .bind(to_i32(asset.version)?)
            .bind(i64::try_from(asset.size_bytes).map_err(|_| corrupt("size_bytes"))?)
            .bind(asset.width.map(to_i32).transpose()?)
            .bind(asset.height.map(to_i32).transpose()?)
            .bind(&asset.visual_digest)
            .bind(&asset.content_digest)
            .bind(Json(&asset.renditions))
            .bind(asset.manifest.as_ref().map(Json))
            .bind(&asset.error)
            .bind(asset.job.as_ref().map(Json))
            .bind(asset.uploaded_at)
            .bind(asset.processed_at)
            .bind(asset.updated_at)
            .execute(executor)
            .await?;
        Ok(())
    }

    async fn locked_update(
        &self,
        id: &AssetId,
        expected: Option<&[AssetStatus]>,
        update: AssetUpdate,
    ) -> MetadataResult<Option<MediaAsset>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "{} WHERE project_id = $1 AND media_id = $2 FOR UPDATE",
            SELECT_ASSET
        ))
        .bind(&id.project_id)
        .bind(&id.media_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut asset = match row {
            Some(row) => row_to_asset(&row)?,
            None => return Err(MetadataError::NotFound(id.to_string())),
        };

        if let Some(expected) = expected {
            if !expected.contains(&asset.status) {
                tx.rollback().await?;
                return Ok(None);
            }
        }

        update.apply(&mut asset);
        Self::upsert(&mut *tx, &asset).await?;
        tx.commit().await?;
        Ok(Some(asset))
    }
}

fn corrupt(field: &str) -> MetadataError {
    MetadataError::Corrupt(format!("{} out of range", field))
}

fn to_i32(value: u32) -> MetadataResult<i32> {
    i32::try_from(value).map_err(|_| corrupt("integer column"))
}

fn to_u32(value: i32, field: &str) -> MetadataResult<u32> {
    u32::try_from(value).map_err(|_| corrupt(field))
}

fn row_to_asset(row: &PgRow) -> MetadataResult<MediaAsset> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let width: Option<i32> = row.try_get("width")?;
    let height: Option<i32> = row.try_get("height")?;
    let size_bytes: i64 = row.try_get("size_bytes")?;
    let renditions: Json<Vec<Rendition>> = row.try_get("renditions")?;
    let manifest: Option<Json<Manifest>> = row.try_get("manifest")?;
    let job: Option<Json<ProcessingJob>> = row.try_get("job")?;

    Ok(MediaAsset {
        id: AssetId::new(
            row.try_get::<String, _>("project_id")?,
            row.try_get::<String, _>("media_id")?,
        ),
        original_key: row.try_get("original_key")?,
        kind: kind
            .parse()
            .map_err(|e: anyhow::Error| MetadataError::Corrupt(e.to_string()))?,
        status: status
            .parse()
            .map_err(|e: anyhow::Error| MetadataError::Corrupt(e.to_string()))?,
        version: to_u32(row.try_get("version")?, "version")?,
        size_bytes: u64::try_from(size_bytes).map_err(|_| corrupt("size_bytes"))?,
        width: width.map(|w| to_u32(w, "width")).transpose()?,
        height: height.map(|h| to_u32(h, "height")).transpose()?,
        visual_digest: row.try_get("visual_digest")?,
        content_digest: row.try_get("content_digest")?,
        renditions: renditions.0,
        manifest: manifest.map(|m| m.0),
        error: row.try_get("error")?,
        job: job.map(|j| j.0),
        uploaded_at: row.try_get("uploaded_at")?,
        processed_at: row.try_get("processed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "select"))]
    async fn get(&self, id: &AssetId) -> MetadataResult<Option<MediaAsset>> {
        let row = sqlx::query(&format!(
            "{} WHERE project_id = $1 AND media_id = $2",
            SELECT_ASSET
        ))
        .bind(&id.project_id)
        .bind(&id.media_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_asset).transpose()
    }

    #[tracing::instrument(skip(self, asset), fields(db.table = "media_assets", db.operation = "insert", asset_id = %asset.id))]
    async fn insert_if_absent(&self, asset: &MediaAsset) -> MetadataResult<bool> {
        let result = sqlx::query(
            "INSERT INTO media_assets (project_id, media_id, original_key, kind, status, version, \
             size_bytes, renditions, uploaded_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (project_id, media_id) DO NOTHING",
        )
        .bind(&asset.id.project_id)
        .bind(&asset.id.media_id)
        .bind(&asset.original_key)
        .bind(asset.kind.to_string())
        .bind(asset.status.to_string())
        .bind(to_i32(asset.version)?)
        .bind(i64::try_from(asset.size_bytes).map_err(|_| corrupt("size_bytes"))?)
        .bind(Json(&asset.renditions))
        .bind(asset.uploaded_at)
        .bind(asset.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "media_assets", db.operation = "update"))]
    async fn update(&self, id: &AssetId, update: AssetUpdate) -> MetadataResult<MediaAsset> {
        self.locked_update(id, None, update)
            .await?
            .ok_or_else(|| MetadataError::NotFound(id.to_string()))
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "media_assets", db.operation = "update"))]
    async fn compare_and_update(
        &self,
        id: &AssetId,
        expected: &[AssetStatus],
        update: AssetUpdate,
    ) -> MetadataResult<Option<MediaAsset>> {
        self.locked_update(id, Some(expected), update).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "select"))]
    async fn list_by_status(&self, status: AssetStatus) -> MetadataResult<Vec<MediaAsset>> {
        let rows = sqlx::query(&format!(
            "{} WHERE status = $1 ORDER BY project_id, media_id",
            SELECT_ASSET
        ))
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_asset).collect()
    }
}
