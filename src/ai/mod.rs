//! AI Integration Layer
//!
//! Generative service access for report generation: the raw backend
//! exchange, the resilient per-call client, and timeouts.

pub mod client;
pub mod provider;
pub mod timeout;

pub use client::{GenerativeClient, RetryPolicy, mime_for};
pub use provider::{
    ContentPart, ContextHandle, EffortLevel, GeminiBackend, GenerationRequest, GenerationResponse,
    GenerativeBackend, MediaAsset, ProviderConfig, SharedBackend, UploadRequest, create_backend,
};
pub use timeout::with_timeout;
