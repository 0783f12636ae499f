//! Generative Service Abstraction
//!
//! Defines the `GenerativeBackend` trait: exactly one request/response
//! exchange with the content service, with no retry logic of its own.
//! Resilience lives one level up in [`crate::ai::client::GenerativeClient`].
//!
//! ## Modules
//!
//! - `gemini`: REST implementation for the Gemini API

mod gemini;
#[cfg(test)]
pub(crate) mod mock;

pub use gemini::GeminiBackend;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::types::{ForgeError, Result};

// =============================================================================
// Request / Response Types
// =============================================================================

/// How much computation the service should spend on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EffortLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl EffortLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for EffortLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a shared artifact already uploaded to the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHandle {
    /// Service-side resource name
    pub name: String,
    /// URI requests reference the artifact by
    pub uri: String,
    pub mime_type: String,
}

/// One piece of request content
#[derive(Debug, Clone)]
pub enum ContentPart {
    /// Previously uploaded shared context
    FileRef(ContextHandle),
    /// Media inlined into the request
    Inline { mime_type: String, data: Vec<u8> },
    /// Instruction text
    Text(String),
}

/// A single generation request
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub parts: Vec<ContentPart>,
    pub effort: Option<EffortLevel>,
    /// Ask the media model for a binary asset alongside text
    pub want_media: bool,
}

impl GenerationRequest {
    /// Text of all instruction parts, joined
    pub fn instruction_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of inlined attachments
    pub fn attachment_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, ContentPart::Inline { .. }))
            .count()
    }

    pub fn has_shared_context(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, ContentPart::FileRef(_)))
    }
}

/// Binary asset produced by the service (e.g. a diagram)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl MediaAsset {
    /// File extension matching the mime type
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

/// Service response
#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    pub text: String,
    pub media: Vec<MediaAsset>,
    /// Wall-clock time of the exchange in milliseconds
    pub total_ms: u64,
}

/// Artifact to upload once per run
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub display_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Resolved provider settings for one run
///
/// The credential is held as a `SecretString` and redacted in debug output.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Provider type: "gemini"
    pub provider: String,
    pub model: String,
    pub media_model: String,
    pub api_base: String,
    pub timeout_secs: u64,
    pub api_key: SecretString,
}

impl ProviderConfig {
    pub fn from_llm_config(config: &LlmConfig, api_key: SecretString) -> Self {
        Self {
            provider: config.provider.clone(),
            model: config.model.clone(),
            media_model: config.media_model.clone(),
            api_base: config.api_base.clone(),
            timeout_secs: config.timeout_secs,
            api_key,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("media_model", &self.media_model)
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Backend Trait
// =============================================================================

/// One raw exchange with the generative service
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Upload a shared artifact and return its handle
    async fn upload(&self, request: UploadRequest) -> Result<ContextHandle>;

    /// Perform a single generation exchange
    async fn generate_content(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Text model in use
    fn model(&self) -> &str;
}

/// Shared backend type
pub type SharedBackend = Arc<dyn GenerativeBackend>;

/// Create a backend from configuration
pub fn create_backend(config: &ProviderConfig) -> Result<SharedBackend> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiBackend::new(config.clone())?)),
        _ => Err(ForgeError::Config(format!(
            "Unknown provider: {}. Supported: gemini",
            config.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effort_level_serde() {
        let json = serde_json::to_string(&EffortLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
        let parsed: EffortLevel = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, EffortLevel::Low);
    }

    #[test]
    fn test_request_introspection() {
        let request = GenerationRequest {
            parts: vec![
                ContentPart::FileRef(ContextHandle {
                    name: "files/abc".into(),
                    uri: "https://example/files/abc".into(),
                    mime_type: "application/pdf".into(),
                }),
                ContentPart::Inline {
                    mime_type: "image/png".into(),
                    data: vec![1, 2, 3],
                },
                ContentPart::Text("Write the chapter".into()),
            ],
            effort: Some(EffortLevel::Low),
            want_media: false,
        };

        assert!(request.has_shared_context());
        assert_eq!(request.attachment_count(), 1);
        assert_eq!(request.instruction_text(), "Write the chapter");
    }

    #[test]
    fn test_provider_config_debug_redacts_key() {
        let config = ProviderConfig::from_llm_config(
            &LlmConfig::default(),
            SecretString::from("super-secret".to_string()),
        );
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = ProviderConfig::from_llm_config(
            &LlmConfig::default(),
            SecretString::from("k".to_string()),
        );
        config.provider = "nope".into();
        assert!(matches!(create_backend(&config), Err(ForgeError::Config(_))));
    }
}
