//! Gemini API Backend
//!
//! Generative backend using the Gemini REST API (`generateContent` and the
//! resumable File API upload). Performs a single exchange per call; the
//! client wrapping it owns retries.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use super::{
    ContentPart, ContextHandle, GenerationRequest, GenerationResponse, GenerativeBackend,
    MediaAsset, ProviderConfig, UploadRequest,
};
use crate::constants::network as net_constants;
use crate::types::{ErrorClassifier, ForgeError, Result};

const PROVIDER_NAME: &str = "gemini";
const API_VERSION: &str = "v1beta";

/// Gemini backend with secure API key handling
pub struct GeminiBackend {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: Url,
    model: String,
    media_model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .field("model", &self.model)
            .field("media_model", &self.media_model)
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(ForgeError::Config(
                "Gemini API key is empty. Pass --api-key or set GEMINI_API_KEY".to_string(),
            ));
        }

        let mut api_base = Url::parse(&config.api_base)
            .map_err(|e| {
                ForgeError::Config(format!("Invalid api_base '{}': {}", config.api_base, e))
            })?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS))
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key,
            api_base,
            model: config.model,
            media_model: config.media_model,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .map_err(|e| ForgeError::Config(format!("Invalid endpoint '{}': {}", path, e)))
    }

    fn build_request(request: &GenerationRequest) -> GenerateContentRequest {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::FileRef(handle) => WirePart {
                    file_data: Some(FileData {
                        mime_type: handle.mime_type.clone(),
                        file_uri: handle.uri.clone(),
                    }),
                    ..Default::default()
                },
                ContentPart::Inline { mime_type, data } => WirePart {
                    inline_data: Some(InlineData {
                        mime_type: mime_type.clone(),
                        data: BASE64.encode(data),
                    }),
                    ..Default::default()
                },
                ContentPart::Text(text) => WirePart {
                    text: Some(text.clone()),
                    ..Default::default()
                },
            })
            .collect();

        let generation_config = GenerationConfig {
            thinking_config: request.effort.map(|effort| ThinkingConfig {
                thinking_level: effort.as_str().to_string(),
            }),
            response_modalities: request
                .want_media
                .then(|| vec!["TEXT".to_string(), "IMAGE".to_string()]),
        };

        GenerateContentRequest {
            contents: vec![WireContent {
                role: "user".to_string(),
                parts,
            }],
            generation_config,
        }
    }

    fn parse_response(body: GenerateContentResponse) -> Result<GenerationResponse> {
        let parts = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        let mut text = String::new();
        let mut media = Vec::new();

        for part in parts {
            if part.thought.unwrap_or(false) {
                continue;
            }
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(inline) = part.inline_data
                && inline.mime_type.starts_with("image/")
            {
                let data = BASE64.decode(inline.data.as_bytes()).map_err(|e| {
                    ForgeError::Llm(ErrorClassifier::classify(
                        &format!("Undecodable inline data: {}", e),
                        PROVIDER_NAME,
                    ))
                })?;
                media.push(MediaAsset {
                    mime_type: inline.mime_type,
                    data,
                });
            }
        }

        Ok(GenerationResponse {
            text,
            media,
            total_ms: 0,
        })
    }

    async fn error_from_response(response: reqwest::Response) -> ForgeError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ForgeError::Llm(ErrorClassifier::classify_http_status(
            status.as_u16(),
            &format!("Gemini API error ({}): {}", status, body),
            PROVIDER_NAME,
        ))
    }

    fn transport_error(context: &str, err: reqwest::Error) -> ForgeError {
        ForgeError::Llm(ErrorClassifier::classify(
            &format!("{}: {}", context, err),
            PROVIDER_NAME,
        ))
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn upload(&self, request: UploadRequest) -> Result<ContextHandle> {
        info!(
            "Uploading shared context '{}' ({} KB)",
            request.display_name,
            request.data.len() / 1024
        );

        let start_url = self.endpoint(&format!("upload/{}/files", API_VERSION))?;
        let start = self
            .client
            .post(start_url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", request.data.len())
            .header("X-Goog-Upload-Header-Content-Type", &request.mime_type)
            .json(&serde_json::json!({ "file": { "display_name": request.display_name } }))
            .send()
            .await
            .map_err(|e| Self::transport_error("Upload start failed", e))?;

        if !start.status().is_success() {
            return Err(Self::error_from_response(start).await);
        }

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ForgeError::SharedContext("Upload session returned no upload URL".to_string())
            })?;

        let finish = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(request.data)
            .send()
            .await
            .map_err(|e| Self::transport_error("Upload failed", e))?;

        if !finish.status().is_success() {
            return Err(Self::error_from_response(finish).await);
        }

        let body: UploadResponse = finish
            .json()
            .await
            .map_err(|e| Self::transport_error("Failed to parse upload response", e))?;

        info!("Shared context uploaded: {}", body.file.uri);

        Ok(ContextHandle {
            name: body.file.name,
            uri: body.file.uri,
            mime_type: body.file.mime_type.unwrap_or(request.mime_type),
        })
    }

    async fn generate_content(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let model = if request.want_media {
            &self.media_model
        } else {
            &self.model
        };

        debug!(
            model = %model,
            attachments = request.attachment_count(),
            shared_context = request.has_shared_context(),
            effort = ?request.effort,
            "Sending request to Gemini API"
        );

        let start_time = Instant::now();
        let url = self.endpoint(&format!("{}/models/{}:generateContent", API_VERSION, model))?;
        let body = Self::build_request(request);

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("Gemini request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Self::transport_error("Failed to parse Gemini response", e))?;

        let mut parsed = Self::parse_response(body)?;
        parsed.total_ms = start_time.elapsed().as_millis() as u64;
        Ok(parsed)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_level: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<WireContent>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    name: String,
    uri: String,
    mime_type: Option<String>,
}
