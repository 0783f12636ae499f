//! ReportForge - Segmented Multi-Chapter Report Generation
//!
//! Generates long structured reports through many small calls to a
//! generative content service. Every fragment is cached under a stable key,
//! so interrupted runs resume where they stopped and the final document can
//! be rebuilt offline.
//!
//! ## Core Features
//!
//! - **Two-Wave Chapters**: chapter sections in parallel, then one synthesis each
//! - **Resume / Assemble-Only**: cache-first execution modes
//! - **Bounded Retries**: throttling backoff and a single transient retry per call
//! - **Progress Stream**: typed events plus a lock-protected status snapshot
//! - **Cooperative Cancellation**: honored at step boundaries
//!
//! ## Quick Start
//!
//! ```ignore
//! use reportforge::{ConfigLoader, ExecutionMode, PipelineRunner, ReportPlan, RunnerDeps};
//!
//! let config = ConfigLoader::load()?;
//! let plan = ReportPlan::load(&config.paths.plan_file)?;
//! let runner = PipelineRunner::new(RunnerDeps::from_config(&config, plan));
//! let mut events = runner.start(api_key, ExecutionMode::Resume)?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event.kind);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: Generative service backend, retrying client, timeouts
//! - [`storage`]: Fragment cache
//! - [`report`]: Plan, scheduling, events and the pipeline runner
//! - [`config`]: Layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod report;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, LlmConfig, PathsConfig, PipelineConfig};

// Error Types
pub use types::{CacheKey, ErrorCategory, ForgeError, Result};

// Storage
pub use storage::{CacheStore, FileCacheStore, MemoryCacheStore, SharedCache};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use report::{
    ClientFactory, DocumentAssembler, EventKind, ExecutionMode, PipelineRunner, ProgressEvent,
    ReportPlan, RunnerDeps, StatusSnapshot,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{GenerativeBackend, GenerativeClient, RetryPolicy, with_timeout};
