//! Report Pipeline
//!
//! Segmented generation of a multi-chapter report:
//!
//! ```text
//! media → chapters (wave 1 → wave 2) → conclusions → executive summary → assembly
//! ```
//!
//! ## Modules
//!
//! - [`plan`]: Chapters, media specs and the step map
//! - [`prompts`]: Prompt construction per subcall kind
//! - [`subcall`]: Units of work within a wave
//! - [`executor`]: Cache-aware execution under a mode
//! - [`scheduler`]: Bounded two-wave fan-out
//! - [`events`]: Progress events and run status
//! - [`assembly`]: Final document output
//! - [`runner`]: Top-level run lifecycle

pub mod assembly;
pub mod chapter;
pub mod events;
pub mod executor;
pub mod plan;
pub mod prompts;
pub mod runner;
pub mod scheduler;
pub mod subcall;

pub use assembly::{AssemblyInput, DocumentAssembler, MarkdownAssembler};
pub use chapter::{ChapterResult, ChapterSections};
pub use events::{EventKind, ProgressEvent, ProgressTracker, StatusSnapshot};
pub use executor::{
    BackendClientFactory, ClientFactory, ConfiguredClientFactory, ExecutionMode, SubcallExecutor,
};
pub use plan::{ChapterConfig, MediaFile, MediaSpec, Phase, ReportPlan, StepInfo};
pub use prompts::{DefaultPrompts, PromptArgs, PromptBuilder, PromptParts};
pub use runner::{PipelineRunner, RunnerDeps};
pub use scheduler::{WaveOutput, WaveScheduler};
pub use subcall::{Subcall, Wave};
