//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/reportforge/) and project (.reportforge/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{cache as cache_constants, client as client_constants};
use crate::constants::{network as net_constants, pipeline as pipeline_constants};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generative service settings
    pub llm: LlmConfig,

    /// Scheduling and cache policy
    pub pipeline: PipelineConfig,

    /// Filesystem locations
    pub paths: PathsConfig,
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ForgeError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        if self.llm.max_attempts == 0 {
            return Err(crate::types::ForgeError::Config(
                "llm.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(crate::types::ForgeError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.wave1_workers == 0 || self.pipeline.wave2_workers == 0 {
            return Err(crate::types::ForgeError::Config(
                "pipeline worker counts must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.synthesis_separator.trim().is_empty() {
            return Err(crate::types::ForgeError::Config(
                "pipeline.synthesis_separator must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

/// Generative service configuration
///
/// The API key is deliberately absent: it is passed to each run and never
/// written to disk by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider type: "gemini"
    pub provider: String,
    /// Text model
    pub model: String,
    /// Media (image) model
    pub media_model: String,
    /// Service endpoint
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per logical call
    pub max_attempts: u32,
    /// Base throttling backoff in seconds (multiplied by attempt index)
    pub throttle_backoff_secs: u64,
    /// Backoff before the single transient retry
    pub transient_backoff_secs: u64,
    /// Pause after each successful call in milliseconds
    pub post_call_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: client_constants::DEFAULT_MODEL.to_string(),
            media_model: client_constants::DEFAULT_MEDIA_MODEL.to_string(),
            api_base: client_constants::DEFAULT_API_BASE.to_string(),
            timeout_secs: net_constants::DEFAULT_TIMEOUT_SECS,
            max_attempts: client_constants::MAX_ATTEMPTS,
            throttle_backoff_secs: client_constants::THROTTLE_BACKOFF_SECS,
            transient_backoff_secs: client_constants::TRANSIENT_BACKOFF_SECS,
            post_call_delay_ms: client_constants::POST_CALL_DELAY_MS,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker ceiling for wave 1
    pub wave1_workers: usize,
    /// Worker ceiling for wave 2
    pub wave2_workers: usize,
    /// Cached fragments must exceed this many characters to be reused on resume
    pub min_cached_chars: usize,
    /// Separator between a synthesis introduction and its closing assessment
    pub synthesis_separator: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            wave1_workers: pipeline_constants::WAVE1_WORKERS,
            wave2_workers: pipeline_constants::WAVE2_WORKERS,
            min_cached_chars: pipeline_constants::MIN_CACHED_CHARS,
            synthesis_separator: pipeline_constants::SYNTHESIS_SEPARATOR.to_string(),
        }
    }
}

// =============================================================================
// Paths Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// One plain-text file per cache key
    pub cache_dir: PathBuf,
    /// Charts, diagrams and other attachable media
    pub media_dir: PathBuf,
    /// Assembled documents
    pub output_dir: PathBuf,
    /// Report plan (chapters, media specs)
    pub plan_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(cache_constants::DEFAULT_CACHE_DIR),
            media_dir: PathBuf::from(".reportforge/media"),
            output_dir: PathBuf::from(".reportforge/reports"),
            plan_file: PathBuf::from(".reportforge/plan.toml"),
        }
    }
}
