//! Generative Call Client
//!
//! Wraps a [`GenerativeBackend`] with the resilience rules every call shares:
//!
//! - **Throttling**: up to `max_attempts` tries, sleeping
//!   `throttle_backoff × attempt` (plus jitter) between them
//! - **Transient/network**: one extra try after `transient_backoff`
//! - **Auth/bad request**: surfaced immediately
//! - **Post-call delay**: a fixed pause after every success to stay under
//!   steady-state rate limits
//!
//! One client is created per subcall; it carries no mutable call state, so
//! concurrent workers never share anything through it but the backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::provider::{
    ContentPart, ContextHandle, EffortLevel, GenerationRequest, GenerationResponse, MediaAsset,
    SharedBackend, UploadRequest,
};
use super::timeout::with_timeout;
use crate::config::LlmConfig;
use crate::constants::client as client_constants;
use crate::types::{ForgeError, Result};

/// Attempt budget and pacing for one logical call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub transient_retries: u32,
    pub throttle_backoff: Duration,
    pub transient_backoff: Duration,
    pub post_call_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            transient_retries: client_constants::TRANSIENT_RETRIES,
            throttle_backoff: Duration::from_secs(config.throttle_backoff_secs),
            transient_backoff: Duration::from_secs(config.transient_backoff_secs),
            post_call_delay: Duration::from_millis(config.post_call_delay_ms),
        }
    }

    /// Same attempt budget with every sleep removed
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            transient_retries: client_constants::TRANSIENT_RETRIES,
            throttle_backoff: Duration::ZERO,
            transient_backoff: Duration::ZERO,
            post_call_delay: Duration::ZERO,
        }
    }

    /// Backoff after the `attempt`-th throttled try (1-based)
    fn throttle_delay(&self, attempt: u32) -> Duration {
        let base = self.throttle_backoff * attempt;
        base + random_jitter(base)
    }
}

/// Client for one logical generation call
pub struct GenerativeClient {
    backend: SharedBackend,
    policy: RetryPolicy,
    timeout: Duration,
}

impl GenerativeClient {
    pub fn new(backend: SharedBackend, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            backend,
            policy,
            timeout,
        }
    }

    /// Upload the shared artifact referenced by later requests.
    ///
    /// Single attempt: any failure is fatal for the run.
    pub async fn upload_shared_context(&self, path: &Path) -> Result<ContextHandle> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            ForgeError::SharedContext(format!("cannot read {}: {}", path.display(), e))
        })?;

        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shared_context".to_string());

        let request = UploadRequest {
            display_name,
            mime_type: mime_for(path).to_string(),
            data,
        };

        with_timeout(self.timeout, self.backend.upload(request), "shared context upload")
            .await
            .map_err(|e| match e {
                ForgeError::SharedContext(_) => e,
                other => ForgeError::SharedContext(other.to_string()),
            })
    }

    /// Generate text from instructions plus optional shared context and attachments.
    ///
    /// Missing attachment files are logged and skipped.
    pub async fn generate(
        &self,
        shared_context: Option<&ContextHandle>,
        instructions: &str,
        attachments: &[PathBuf],
        effort: EffortLevel,
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(attachments.len() + 2);

        if let Some(handle) = shared_context {
            parts.push(ContentPart::FileRef(handle.clone()));
        }

        for path in attachments {
            match tokio::fs::read(path).await {
                Ok(data) => parts.push(ContentPart::Inline {
                    mime_type: mime_for(path).to_string(),
                    data,
                }),
                Err(e) => warn!("Attachment {} skipped: {}", path.display(), e),
            }
        }

        parts.push(ContentPart::Text(instructions.to_string()));

        let request = GenerationRequest {
            parts,
            effort: Some(effort),
            want_media: false,
        };

        let response = self.call_with_retry(&request, "generate").await?;
        if response.text.trim().is_empty() {
            warn!("Service returned empty text");
        }
        Ok(response.text)
    }

    /// Ask the media model for a binary asset.
    ///
    /// A response without an asset is `Ok(None)`, not an error.
    pub async fn generate_media(&self, instructions: &str) -> Result<Option<MediaAsset>> {
        let request = GenerationRequest {
            parts: vec![ContentPart::Text(instructions.to_string())],
            effort: None,
            want_media: true,
        };

        let response = self.call_with_retry(&request, "generate media").await?;
        let asset = response.media.into_iter().next();
        if asset.is_none() {
            warn!("Media request returned no asset");
        }
        Ok(asset)
    }

    async fn call_with_retry(
        &self,
        request: &GenerationRequest,
        operation: &str,
    ) -> Result<GenerationResponse> {
        let mut attempt: u32 = 0;
        let mut transient_used: u32 = 0;

        loop {
            attempt += 1;

            debug!(
                provider = self.backend.name(),
                attempt,
                max_attempts = self.policy.max_attempts,
                "{}",
                operation
            );

            let result = with_timeout(
                self.timeout,
                self.backend.generate_content(request),
                operation,
            )
            .await;

            let err = match result {
                Ok(response) => {
                    debug!(total_ms = response.total_ms, "{} succeeded", operation);
                    if !self.policy.post_call_delay.is_zero() {
                        sleep(self.policy.post_call_delay).await;
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            let category = err.category();

            if err.is_cancelled() || category.is_fatal() {
                return Err(err);
            }

            if category.is_throttling() {
                if attempt >= self.policy.max_attempts {
                    warn!(attempts = attempt, "Throttling persisted, giving up");
                    return Err(err);
                }
                let wait = self.policy.throttle_delay(attempt);
                info!(
                    attempt,
                    wait_secs = wait.as_secs(),
                    "Throttled, waiting before retry"
                );
                sleep(wait).await;
                continue;
            }

            if category.is_transient() && transient_used < self.policy.transient_retries {
                transient_used += 1;
                warn!(error = %err, category = %category, "Transient failure, retrying once");
                sleep(self.policy.transient_backoff).await;
                continue;
            }

            return Err(err);
        }
    }
}

/// Mime type guessed from the file extension
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "json" => "application/json",
        "md" => "text/markdown",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Random jitter up to a quarter of the base delay
fn random_jitter(base_delay: Duration) -> Duration {
    let max_jitter_ms = (base_delay.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    let jitter_ms = rand::rng().random_range(0..max_jitter_ms);
    Duration::from_millis(jitter_ms)
}
