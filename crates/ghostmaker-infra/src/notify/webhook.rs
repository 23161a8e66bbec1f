//! Signed webhook delivery

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghostmaker_core::models::AssetId;
use ghostmaker_core::{AppError, NotificationConfig, NotificationSink, PipelineOutcome};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::{Duration, Instant};

pub const SIGNATURE_HEADER: &str = "X-Ghostmaker-Signature";
const EVENT_NAME: &str = "asset.processed";

#[derive(Debug, Clone)]
pub struct WebhookNotifierConfig {
    pub url: String,
    pub secret: Option<String>,
    pub timeout: Duration,
}

impl WebhookNotifierConfig {
    /// `None` when no webhook URL is configured.
    pub fn from_config(config: &NotificationConfig) -> Option<Self> {
        config.webhook_url.as_ref().map(|url| Self {
            url: url.clone(),
            secret: config.webhook_secret.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    event: &'static str,
    project_id: &'a str,
    media_id: &'a str,
    #[serde(flatten)]
    outcome: &'a PipelineOutcome,
    timestamp: DateTime<Utc>,
}

/// `v1={hex(hmac_sha256(secret, body))}`
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|e| e.to_string())?;
    mac.update(body);
    Ok(format!("v1={}", hex::encode(mac.finalize().into_bytes())))
}

/// POSTs a JSON body per outcome to one configured endpoint. No retries.
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    config: WebhookNotifierConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookNotifierConfig) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create webhook HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            config,
        })
    }

    fn body(asset_id: &AssetId, outcome: &PipelineOutcome) -> Result<Vec<u8>, String> {
        serde_json::to_vec(&WebhookPayload {
            event: EVENT_NAME,
            project_id: &asset_id.project_id,
            media_id: &asset_id.media_id,
            outcome,
            timestamp: Utc::now(),
        })
        .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    #[tracing::instrument(skip(self, outcome), fields(asset_id = %asset_id, url = %self.config.url))]
    async fn notify(&self, asset_id: &AssetId, outcome: &PipelineOutcome) -> Result<(), String> {
        let start = Instant::now();
        let body = Self::body(asset_id, outcome)?;

        let mut request = self
            .http_client
            .post(&self.config.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.config.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| format!("webhook delivery failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("webhook endpoint returned {}", status));
        }

        tracing::debug!(
            status = status.as_u16(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Webhook delivered"
        );
        Ok(())
    }
}
