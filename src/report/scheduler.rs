//! Wave Scheduler
//!
//! Runs the chapter phase as two barrier-synchronized waves:
//!
//! 1. Every independent leaf subcall (context, data, media discussion of
//!    every chapter), fanned out across at most `wave1_workers`
//! 2. One synthesis per chapter over that chapter's wave-1 text, fanned out
//!    across at most `wave2_workers`
//!
//! Wave 2 starts only after wave 1 fully drains. Each subcall gets its own
//! client from the executor; the cache and the progress tracker are the only
//! shared state.
//!
//! ## Failure and cancellation
//!
//! Cancellation is observed when a step is entered, never mid-call. Once a
//! wave sees a failure it stops starting new subcalls but lets in-flight ones
//! finish, then reports the first real error (or `Cancelled` if that is all
//! it saw).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use futures::stream;
use tracing::{info, instrument, warn};

use super::chapter::{ChapterResult, ChapterSections};
use super::events::ProgressTracker;
use super::executor::SubcallExecutor;
use super::plan::{ChapterConfig, Phase};
use super::subcall::{Subcall, Wave};
use crate::config::PipelineConfig;
use crate::types::{CacheKey, ForgeError, Result};

/// Text produced by one wave, by cache key
#[derive(Debug, Default)]
pub struct WaveOutput {
    texts: HashMap<CacheKey, String>,
}

impl WaveOutput {
    pub fn get(&self, key: &CacheKey) -> Option<&str> {
        self.texts.get(key).map(String::as_str)
    }

    /// Text for `key`, empty when the step did not run
    pub fn text(&self, key: &CacheKey) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

pub struct WaveScheduler {
    executor: Arc<SubcallExecutor>,
    tracker: Arc<ProgressTracker>,
    wave1_workers: usize,
    wave2_workers: usize,
    separator: String,
}

impl WaveScheduler {
    pub fn new(
        executor: Arc<SubcallExecutor>,
        tracker: Arc<ProgressTracker>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            executor,
            tracker,
            wave1_workers: config.wave1_workers,
            wave2_workers: config.wave2_workers,
            separator: config.synthesis_separator.clone(),
        }
    }

    /// Run one step with its start/complete events
    #[instrument(skip_all, fields(key = %subcall.key, chapter = ?subcall.chapter))]
    pub async fn run_step(&self, subcall: &Subcall) -> Result<String> {
        self.tracker.begin_step(&subcall.key)?;
        let text = self.executor.run_subcall(subcall).await?;
        self.tracker.complete_step(&subcall.key);
        Ok(text)
    }

    /// Fan a wave out across the worker pool and wait for all of it.
    ///
    /// Every subcall must belong to `wave`; a stray one fails the wave before
    /// anything starts.
    #[instrument(skip(self, subcalls), fields(subcalls = subcalls.len()))]
    pub async fn run_wave(&self, wave: Wave, subcalls: Vec<Subcall>) -> Result<WaveOutput> {
        if let Some(stray) = subcalls.iter().find(|s| s.wave != Some(wave)) {
            return Err(ForgeError::Plan(format!(
                "{} does not belong to wave {}",
                stray.key,
                wave.as_u8()
            )));
        }

        let cap = match wave {
            Wave::First => self.wave1_workers,
            Wave::Second => self.wave2_workers,
        };
        let width = cap.min(subcalls.len()).max(1);
        info!("Wave {}: {} subcalls, {} workers", wave.as_u8(), subcalls.len(), width);

        let halted = AtomicBool::new(false);
        let mut stream = stream::iter(subcalls)
            .map(|subcall| {
                let halted = &halted;
                async move {
                    if halted.load(Ordering::SeqCst) {
                        return Err(ForgeError::Cancelled);
                    }
                    let text = self.run_step(&subcall).await?;
                    Ok((subcall.key, text))
                }
            })
            .buffer_unordered(width);

        let mut output = WaveOutput::default();
        let mut failure: Option<ForgeError> = None;

        while let Some(result) = stream.next().await {
            match result {
                Ok((key, text)) => {
                    output.texts.insert(key, text);
                }
                Err(e) => {
                    halted.store(true, Ordering::SeqCst);
                    let replace = match &failure {
                        None => true,
                        Some(existing) => existing.is_cancelled() && !e.is_cancelled(),
                    };
                    if replace {
                        failure = Some(e);
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(output),
        }
    }

    /// Both chapter waves, returning chapters in plan order
    #[instrument(skip_all, fields(chapters = chapters.len()))]
    pub async fn run_chapters(&self, chapters: &[ChapterConfig]) -> Result<Vec<ChapterResult>> {
        let shared = self.executor.has_shared_context();

        let mut wave1 = Vec::new();
        for chapter in chapters {
            let context_text = read_material(chapter.context_file.as_deref(), "background").await;
            let data_text = match chapter.data_file.as_deref() {
                Some(path) => read_material(Some(path), "data").await,
                None => String::new(),
            };
            wave1.extend(Subcall::chapter_leaves(
                chapter,
                context_text,
                data_text,
                shared,
            ));
        }

        self.tracker.begin_phase(Phase::Chapters, Some(Wave::First.as_u8()))?;
        let first = self.run_wave(Wave::First, wave1).await?;
        self.tracker.complete_phase(Phase::Chapters, Some(Wave::First.as_u8()));

        let mut results: Vec<ChapterResult> = chapters
            .iter()
            .map(|c| {
                let mut result = ChapterResult::new(c.number, c.title.clone());
                result.sections = ChapterSections {
                    context: first.text(&c.context_key()),
                    data: first.text(&c.data_key()),
                    media: first.text(&c.media_key()),
                };
                result
            })
            .collect();

        let wave2 = chapters
            .iter()
            .zip(&results)
            .map(|(c, r)| Subcall::synthesis(c, r.sections.clone()))
            .collect();

        self.tracker.begin_phase(Phase::Chapters, Some(Wave::Second.as_u8()))?;
        let second = self.run_wave(Wave::Second, wave2).await?;
        self.tracker.complete_phase(Phase::Chapters, Some(Wave::Second.as_u8()));

        for (chapter, result) in chapters.iter().zip(results.iter_mut()) {
            result.apply_synthesis(&second.text(&chapter.synthesis_key()), &self.separator);
        }

        info!(
            "Chapters complete: {} subcalls in 2 waves",
            first.len() + second.len()
        );
        Ok(results)
    }
}

/// Read chapter input material; absence degrades to a marker text
async fn read_material(path: Option<&Path>, what: &str) -> String {
    let Some(path) = path else {
        return format!("(No {} material provided for this chapter)", what);
    };
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Chapter {} material {} unavailable: {}", what, path.display(), e);
            format!("(No {} material available for this chapter)", what)
        }
    }
}
