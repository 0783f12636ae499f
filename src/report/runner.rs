//! Pipeline Runner
//!
//! Top-level state machine for one report: `idle → running → {done, error,
//! cancelled}`. A runner owns at most one background task at a time;
//! `start` returns immediately with the run's event stream, `status` and
//! `cancel` are safe to call from anywhere while it runs.
//!
//! ## Phases
//!
//! 0. Media generation (only when the plan declares media)
//! 1. Chapters, as two waves
//! 2. Conclusions
//! 3. Executive summary
//! 4. Assembly
//!
//! Any unrecovered error ends the run; there is no retry at this level. A
//! panic in the background task ends it the same way, as an `error` event.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::assembly::{AssemblyInput, DocumentAssembler, MarkdownAssembler};
use super::chapter::report_text;
use super::events::{ProgressEvent, ProgressTracker, StatusSnapshot};
use super::executor::{ClientFactory, ConfiguredClientFactory, ExecutionMode, SubcallExecutor};
use super::plan::{ASSEMBLY_KEY, CONCLUSIONS_KEY, EXECUTIVE_SUMMARY_KEY, Phase, ReportPlan};
use super::prompts::{DefaultPrompts, PromptArgs, PromptBuilder};
use super::scheduler::WaveScheduler;
use super::subcall::Subcall;
use crate::ai::EffortLevel;
use crate::config::{Config, PipelineConfig};
use crate::storage::{FileCacheStore, SharedCache};
use crate::types::{CacheKey, ForgeError, Result};

/// Collaborators injected into a runner
#[derive(Clone)]
pub struct RunnerDeps {
    pub clients: Arc<dyn ClientFactory>,
    pub cache: SharedCache,
    pub plan: Arc<ReportPlan>,
    pub pipeline: PipelineConfig,
    pub assembler: Arc<dyn DocumentAssembler>,
    pub prompts: Arc<dyn PromptBuilder>,
}

impl RunnerDeps {
    /// Production wiring: Gemini clients, file cache, Markdown output
    pub fn from_config(config: &Config, plan: ReportPlan) -> Self {
        let prompts = DefaultPrompts::new(
            plan.role.as_deref(),
            config.pipeline.synthesis_separator.clone(),
        );
        Self {
            clients: Arc::new(ConfiguredClientFactory::new(config.llm.clone())),
            cache: Arc::new(FileCacheStore::new(&config.paths.cache_dir)),
            plan: Arc::new(plan),
            pipeline: config.pipeline.clone(),
            assembler: Arc::new(MarkdownAssembler::new(&config.paths.output_dir)),
            prompts: Arc::new(prompts),
        }
    }
}

pub struct PipelineRunner {
    deps: RunnerDeps,
    tracker: Arc<ProgressTracker>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineRunner {
    pub fn new(deps: RunnerDeps) -> Self {
        let tracker = Arc::new(ProgressTracker::new(&deps.plan));
        Self {
            deps,
            tracker,
            task: Mutex::new(None),
        }
    }

    pub fn plan(&self) -> &ReportPlan {
        &self.deps.plan
    }

    /// Spawn a run and return its event stream.
    ///
    /// Rejected with `AlreadyRunning` while another run is in flight. Must be
    /// called from within a tokio runtime.
    pub fn start(
        &self,
        credential: SecretString,
        mode: ExecutionMode,
    ) -> Result<mpsc::Receiver<ProgressEvent>> {
        let events = self.tracker.begin_run()?;

        let deps = self.deps.clone();
        let tracker = Arc::clone(&self.tracker);
        let handle = tokio::spawn(async move {
            let run = execute_run(&deps, &tracker, credential, mode);
            let outcome = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(result) => result.map(|path| path.display().to_string()),
                Err(payload) => Err(ForgeError::Internal(panic_message(payload.as_ref()))),
            };

            match &outcome {
                Ok(path) => info!("Pipeline finished: {}", path),
                Err(ForgeError::Cancelled) => warn!("Pipeline cancelled"),
                Err(e) => error!("Pipeline failed: {}", e),
            }
            tracker.finish(&outcome);
        });

        *self.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        Ok(events)
    }

    /// Request cooperative cancellation at the next step boundary
    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.tracker.cancel();
    }

    pub fn status(&self) -> StatusSnapshot {
        self.tracker.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.tracker.is_running()
    }

    /// Wait for the background task of the current run, if any
    pub async fn wait(&self) {
        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!("Pipeline task ended abnormally: {}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("pipeline panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("pipeline panicked: {}", s)
    } else {
        "pipeline panicked".to_string()
    }
}

#[instrument(skip_all, fields(mode = %mode, chapters = deps.plan.chapters.len()))]
async fn execute_run(
    deps: &RunnerDeps,
    tracker: &Arc<ProgressTracker>,
    credential: SecretString,
    mode: ExecutionMode,
) -> Result<PathBuf> {
    let plan = &deps.plan;
    info!(
        "Report '{}': {} steps, mode {}",
        plan.title,
        tracker.total_steps(),
        mode
    );

    let executor = Arc::new(
        SubcallExecutor::new(
            Arc::clone(&deps.cache),
            Arc::clone(&deps.clients),
            Arc::clone(&deps.prompts),
            credential,
            mode,
            deps.pipeline.min_cached_chars,
        )
        .with_shared_context(plan.shared_context.clone()),
    );
    let scheduler = WaveScheduler::new(Arc::clone(&executor), Arc::clone(tracker), &deps.pipeline);

    // Phase 0: media
    let mut media = Vec::new();
    if !plan.media.is_empty() {
        tracker.begin_phase(Phase::MediaGeneration, None)?;
        for spec in &plan.media {
            let key = spec.key();
            tracker.begin_step(&key)?;
            if let Some(path) = executor.execute_media(spec).await {
                media.push(path);
            }
            tracker.complete_step(&key);
        }
        tracker.complete_phase(Phase::MediaGeneration, None);
    }

    // Phase 1: chapters
    let chapters = scheduler.run_chapters(&plan.chapters).await?;
    let body = report_text(&chapters);

    // Phase 2: conclusions
    tracker.begin_phase(Phase::Conclusions, None)?;
    let conclusions = scheduler
        .run_step(&Subcall::global(
            CONCLUSIONS_KEY,
            PromptArgs::Conclusions {
                report_text: body.clone(),
            },
            EffortLevel::High,
        ))
        .await?;
    tracker.complete_phase(Phase::Conclusions, None);

    // Phase 3: executive summary
    tracker.begin_phase(Phase::ExecutiveSummary, None)?;
    let executive_summary = scheduler
        .run_step(&Subcall::global(
            EXECUTIVE_SUMMARY_KEY,
            PromptArgs::ExecutiveSummary {
                report_text: body,
                conclusions: conclusions.clone(),
            },
            EffortLevel::Low,
        ))
        .await?;
    tracker.complete_phase(Phase::ExecutiveSummary, None);

    // Phase 4: assembly
    tracker.begin_phase(Phase::Assembly, None)?;
    let key = CacheKey::new(ASSEMBLY_KEY);
    tracker.begin_step(&key)?;
    let input = AssemblyInput {
        title: plan.title.clone(),
        executive_summary,
        chapters,
        conclusions,
        media,
    };
    let path = deps.assembler.assemble(&input).await?;
    tracker.complete_step(&key);
    tracker.complete_phase(Phase::Assembly, None);

    Ok(path)
}
