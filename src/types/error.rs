//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Provides error classification for the generative client's retry decisions.
//!
//! ## Error Categories
//!
//! - **RateLimit**: Service throttling (bounded retry with growing backoff)
//! - **Transient**: Temporary server issues (one extra retry)
//! - **Network**: Connectivity issues (treated like transient)
//! - **Auth**: Authentication failures (fail fast)
//! - **BadRequest**: Malformed request (fail fast)
//!
//! Cancellation is a terminal state of its own and never goes through
//! the classifier.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories used by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Throttled by the service - wait then retry
    RateLimit,
    /// Temporary server issues - retry once
    Transient,
    /// Network/connectivity issues - retry once
    Network,
    /// Authentication failed - fail fast
    Auth,
    /// Invalid request - fail fast
    BadRequest,
    /// Unknown error - treated as transient
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Network => write!(f, "NETWORK"),
            Self::Auth => write!(f, "AUTH"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Throttling-class errors get the full attempt budget
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::RateLimit)
    }

    /// Errors that deserve a single extra attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient | Self::Network | Self::Unknown)
    }

    /// Errors that must surface immediately
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth | Self::BadRequest)
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Service error with category and provider context
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Error category for retry decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
        }
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps raw service failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from the service
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("429")
            || lower.contains("resource_exhausted")
            || lower.contains("rate limit")
            || lower.contains("quota exceeded")
            || lower.contains("too many requests")
        {
            return LlmError::with_provider(ErrorCategory::RateLimit, message, provider);
        }

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("permission denied")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timed out")
            || lower.contains("timeout")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider);
        }

        if lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("unavailable")
            || lower.contains("overloaded")
            || lower.contains("internal")
        {
            return LlmError::with_provider(ErrorCategory::Transient, message, provider);
        }

        if lower.contains("400") || lower.contains("invalid_argument") {
            return LlmError::with_provider(ErrorCategory::BadRequest, message, provider);
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        match status {
            429 => LlmError::with_provider(ErrorCategory::RateLimit, message, provider),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 404 => LlmError::with_provider(ErrorCategory::BadRequest, message, provider),
            500..=599 => LlmError::with_provider(ErrorCategory::Transient, message, provider),
            _ => Self::classify(message, provider),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ForgeError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    // -------------------------------------------------------------------------
    // Service Errors
    // -------------------------------------------------------------------------
    /// Classified service error (after the client's retry budget)
    #[error("Generation error: {0}")]
    Llm(LlmError),

    /// Shared context upload failed; nothing that needs it can be generated
    #[error("Shared context unavailable: {0}")]
    SharedContext(String),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// Cooperative cancellation observed at a step boundary
    #[error("Pipeline cancelled by user")]
    Cancelled,

    #[error("A pipeline run is already in progress")]
    AlreadyRunning,

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Assembly failed: {0}")]
    Assembly(String),

    /// The background run panicked
    #[error("Internal error: {0}")]
    Internal(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<LlmError> for ForgeError {
    fn from(err: LlmError) -> Self {
        ForgeError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Category used by the retry policy
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Llm(e) => e.category,
            Self::Timeout { .. } => ErrorCategory::Network,
            Self::Io(_) => ErrorCategory::Network,
            Self::Json(_) => ErrorCategory::Transient,
            Self::Config(_) | Self::SharedContext(_) | Self::Plan(_) => ErrorCategory::BadRequest,
            _ => ErrorCategory::Unknown,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(ErrorCategory::Transient.to_string(), "TRANSIENT");
        assert_eq!(ErrorCategory::Auth.to_string(), "AUTH");
    }

    #[test]
    fn test_category_classes() {
        assert!(ErrorCategory::RateLimit.is_throttling());
        assert!(!ErrorCategory::RateLimit.is_transient());
        assert!(ErrorCategory::Transient.is_transient());
        assert!(ErrorCategory::Network.is_transient());
        assert!(ErrorCategory::Auth.is_fatal());
        assert!(ErrorCategory::BadRequest.is_fatal());
        assert!(!ErrorCategory::Unknown.is_fatal());
    }

    #[test]
    fn test_classify_resource_exhausted() {
        let err = ErrorClassifier::classify("RESOURCE_EXHAUSTED: quota", "gemini");
        assert_eq!(err.category, ErrorCategory::RateLimit);
    }

    #[test]
    fn test_classify_auth() {
        let err = ErrorClassifier::classify("API key not valid", "gemini");
        assert_eq!(err.category, ErrorCategory::Auth);
    }

    #[test]
    fn test_classify_network() {
        let err = ErrorClassifier::classify("Connection reset by peer", "gemini");
        assert_eq!(err.category, ErrorCategory::Network);
    }

    #[test]
    fn test_classify_unknown() {
        let err = ErrorClassifier::classify("Something weird happened", "test");
        assert_eq!(err.category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_classify_http_status() {
        let throttled = ErrorClassifier::classify_http_status(429, "slow down", "test");
        assert_eq!(throttled.category, ErrorCategory::RateLimit);

        let auth = ErrorClassifier::classify_http_status(403, "forbidden", "test");
        assert_eq!(auth.category, ErrorCategory::Auth);

        let server = ErrorClassifier::classify_http_status(503, "busy", "test");
        assert_eq!(server.category, ErrorCategory::Transient);
    }

    #[test]
    fn test_forge_error_category() {
        assert_eq!(
            ForgeError::timeout("call", Duration::from_secs(1)).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            ForgeError::Config("bad".into()).category(),
            ErrorCategory::BadRequest
        );
        assert!(ForgeError::Cancelled.is_cancelled());
        assert!(!ForgeError::AlreadyRunning.is_cancelled());
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::with_provider(ErrorCategory::RateLimit, "Too many requests", "gemini");
        assert_eq!(err.to_string(), "[gemini:RATE_LIMIT] Too many requests");

        let err_no_provider = LlmError::new(ErrorCategory::Network, "Connection failed");
        assert_eq!(err_no_provider.to_string(), "[NETWORK] Connection failed");
    }
}
