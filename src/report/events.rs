//! Progress Events
//!
//! Typed progress stream for one pipeline run, plus the lock-protected run
//! state behind `status()`.
//!
//! ## Delivery
//!
//! Events go into a bounded `tokio::sync::mpsc` channel created per run.
//! Its capacity is derived from the plan's step count, so a send never
//! finds the channel full. The receiver may be dropped at any time; events
//! are then discarded and the run carries on.
//!
//! ## Atomicity
//!
//! Every state transition and its event happen under one lock, so a status
//! snapshot can never observe a completed count that disagrees with the
//! events already sent.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::plan::{Phase, ReportPlan, StepInfo};
use crate::constants::pipeline as pipeline_constants;
use crate::types::{CacheKey, ForgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PhaseStart,
    PhaseComplete,
    StepStart,
    StepComplete,
    Error,
    Cancelled,
    Done,
}

/// Immutable record of one state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<CacheKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Wave number for chapter-phase events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<u32>,
    pub completed_count: usize,
    pub total_count: usize,
    pub elapsed_secs: f64,
    pub timestamp: DateTime<Utc>,
    /// Error text, or the output path on `done`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Point-in-time view of the run
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub cancelled: bool,
    pub current_step: Option<CacheKey>,
    pub current_phase: Option<Phase>,
    pub completed_steps: Vec<CacheKey>,
    pub total_steps: usize,
    /// 0.0 to 1.0
    pub progress: f64,
    pub elapsed_secs: f64,
    pub error: Option<String>,
}

/// Channel bound that fits every event one run of `total_steps` can emit
pub fn channel_capacity(total_steps: usize) -> usize {
    // One extra phase pair for the second chapter wave
    total_steps * pipeline_constants::EVENTS_PER_STEP
        + (Phase::COUNT + 1) * 2
        + pipeline_constants::EVENT_CHANNEL_SLACK
}

#[derive(Default)]
struct RunState {
    running: bool,
    current_step: Option<CacheKey>,
    current_phase: Option<Phase>,
    completed: Vec<CacheKey>,
    started_at: Option<Instant>,
    /// Frozen once the run ends
    final_elapsed: Option<Duration>,
    error: Option<String>,
    sender: Option<mpsc::Sender<ProgressEvent>>,
}

impl RunState {
    fn elapsed(&self) -> Duration {
        self.final_elapsed
            .or_else(|| self.started_at.map(|t| t.elapsed()))
            .unwrap_or_default()
    }
}

/// Run state shared by the background task and status queries
pub struct ProgressTracker {
    steps: HashMap<CacheKey, StepInfo>,
    total_steps: usize,
    cancelled: AtomicBool,
    state: Mutex<RunState>,
}

impl ProgressTracker {
    pub fn new(plan: &ReportPlan) -> Self {
        let steps: HashMap<CacheKey, StepInfo> = plan
            .steps()
            .into_iter()
            .map(|s| (s.key.clone(), s))
            .collect();
        Self {
            total_steps: steps.len(),
            steps,
            cancelled: AtomicBool::new(false),
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Reset for a new run and attach its event channel.
    ///
    /// Rejected while a run is in flight; the in-flight state is untouched.
    pub fn begin_run(&self) -> Result<mpsc::Receiver<ProgressEvent>> {
        let mut state = self.lock();
        if state.running {
            return Err(ForgeError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel(channel_capacity(self.total_steps));
        self.cancelled.store(false, Ordering::SeqCst);
        *state = RunState {
            running: true,
            started_at: Some(Instant::now()),
            sender: Some(tx),
            ..Default::default()
        };
        Ok(rx)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Enter a step; fails with `Cancelled` instead once cancellation is requested
    pub fn begin_step(&self, key: &CacheKey) -> Result<()> {
        let mut state = self.lock();
        if self.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }
        state.current_step = Some(key.clone());
        let event = self.event(&state, EventKind::StepStart, Some(key), None, None);
        Self::emit(&state, event);
        Ok(())
    }

    /// Record a finished step and announce it in one critical section
    pub fn complete_step(&self, key: &CacheKey) {
        let mut state = self.lock();
        if state.current_step.as_ref() == Some(key) {
            state.current_step = None;
        }
        state.completed.push(key.clone());
        let event = self.event(&state, EventKind::StepComplete, Some(key), None, None);
        Self::emit(&state, event);
    }

    pub fn begin_phase(&self, phase: Phase, wave: Option<u8>) -> Result<()> {
        let mut state = self.lock();
        if self.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }
        state.current_phase = Some(phase);
        let event = self.event(&state, EventKind::PhaseStart, None, Some(phase), wave);
        Self::emit(&state, event);
        Ok(())
    }

    pub fn complete_phase(&self, phase: Phase, wave: Option<u8>) {
        let state = self.lock();
        let event = self.event(&state, EventKind::PhaseComplete, None, Some(phase), wave);
        Self::emit(&state, event);
    }

    /// Leave the running state with the run's outcome and close the stream
    pub fn finish(&self, outcome: &Result<String>) {
        let mut state = self.lock();
        state.running = false;
        state.current_step = None;
        state.final_elapsed = Some(state.elapsed());

        let (kind, message) = match outcome {
            Ok(output) => (EventKind::Done, Some(output.clone())),
            Err(ForgeError::Cancelled) => (EventKind::Cancelled, None),
            Err(e) => {
                state.error = Some(e.to_string());
                (EventKind::Error, Some(e.to_string()))
            }
        };

        let mut event = self.event(&state, kind, None, state.current_phase, None);
        event.message = message;
        Self::emit(&state, event);
        state.sender = None;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.lock();
        let progress = if self.total_steps == 0 {
            0.0
        } else {
            state.completed.len() as f64 / self.total_steps as f64
        };
        StatusSnapshot {
            running: state.running,
            cancelled: self.is_cancelled(),
            current_step: state.current_step.clone(),
            current_phase: state.current_phase,
            completed_steps: state.completed.clone(),
            total_steps: self.total_steps,
            progress,
            elapsed_secs: state.elapsed().as_secs_f64(),
            error: state.error.clone(),
        }
    }

    fn event(
        &self,
        state: &RunState,
        kind: EventKind,
        step: Option<&CacheKey>,
        phase: Option<Phase>,
        wave: Option<u8>,
    ) -> ProgressEvent {
        let info = step.and_then(|k| self.steps.get(k));
        ProgressEvent {
            kind,
            step: step.cloned(),
            label: info
                .map(|i| i.label.clone())
                .or_else(|| phase.map(|p| p.name().to_string())),
            phase: phase.or_else(|| info.map(|i| i.phase)),
            wave,
            chapter: info.and_then(|i| i.chapter),
            completed_count: state.completed.len(),
            total_count: self.total_steps,
            elapsed_secs: state.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
            message: None,
        }
    }

    fn emit(state: &RunState, event: ProgressEvent) {
        if let Some(sender) = &state.sender
            && let Err(e) = sender.try_send(event)
        {
            debug!("Progress event dropped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ReportPlan {
        toml::from_str(
            r#"
title = "T"
[[chapters]]
number = 1
title = "One"
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_step_events_carry_counts() {
        let tracker = ProgressTracker::new(&plan());
        let mut rx = tracker.begin_run().unwrap();
        let key = CacheKey::new("ch1_a_context");

        tracker.begin_step(&key).unwrap();
        tracker.complete_step(&key);

        let start = rx.recv().await.unwrap();
        assert_eq!(start.kind, EventKind::StepStart);
        assert_eq!(start.chapter, Some(1));
        assert_eq!(start.phase, Some(Phase::Chapters));
        assert_eq!(start.completed_count, 0);

        let done = rx.recv().await.unwrap();
        assert_eq!(done.kind, EventKind::StepComplete);
        assert_eq!(done.completed_count, 1);
        assert_eq!(done.total_count, tracker.total_steps());
    }

    #[tokio::test]
    async fn test_current_step_cleared_when_it_completes() {
        let tracker = ProgressTracker::new(&plan());
        let _rx = tracker.begin_run().unwrap();
        let context = CacheKey::new("ch1_a_context");
        let synthesis = CacheKey::new("ch1_d_synthesis");

        tracker.begin_step(&context).unwrap();
        assert_eq!(tracker.snapshot().current_step, Some(context.clone()));
        tracker.complete_step(&context);
        assert_eq!(tracker.snapshot().current_step, None);

        // Completing an older step leaves the newer one current
        tracker.begin_step(&context).unwrap();
        tracker.begin_step(&synthesis).unwrap();
        tracker.complete_step(&context);
        assert_eq!(tracker.snapshot().current_step, Some(synthesis));
    }

    #[tokio::test]
    async fn test_second_begin_run_rejected_while_running() {
        let tracker = ProgressTracker::new(&plan());
        let _rx = tracker.begin_run().unwrap();
        tracker.complete_step(&CacheKey::new("ch1_a_context"));

        assert!(matches!(tracker.begin_run(), Err(ForgeError::AlreadyRunning)));
        assert_eq!(tracker.snapshot().completed_steps.len(), 1);
        assert!(tracker.snapshot().running);
    }

    #[tokio::test]
    async fn test_cancel_blocks_new_steps() {
        let tracker = ProgressTracker::new(&plan());
        let mut rx = tracker.begin_run().unwrap();
        tracker.cancel();

        assert!(matches!(
            tracker.begin_step(&CacheKey::new("ch1_a_context")),
            Err(ForgeError::Cancelled)
        ));
        tracker.finish(&Err(ForgeError::Cancelled));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Cancelled);
        assert!(rx.recv().await.is_none());

        let status = tracker.snapshot();
        assert!(!status.running);
        assert!(status.cancelled);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_finish_with_error_records_text() {
        let tracker = ProgressTracker::new(&plan());
        let _rx = tracker.begin_run().unwrap();
        tracker.finish(&Err(ForgeError::Plan("broken".into())));

        let status = tracker.snapshot();
        assert!(status.error.unwrap().contains("broken"));

        // A finished run can be replaced
        assert!(tracker.begin_run().is_ok());
        assert!(tracker.snapshot().error.is_none());
    }

    #[test]
    fn test_event_serializes_type_tag() {
        let event = ProgressEvent {
            kind: EventKind::PhaseComplete,
            step: None,
            label: None,
            phase: Some(Phase::Chapters),
            wave: Some(2),
            chapter: None,
            completed_count: 3,
            total_count: 5,
            elapsed_secs: 1.5,
            timestamp: Utc::now(),
            message: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase_complete");
        assert_eq!(json["phase"], 1);
        assert_eq!(json["wave"], 2);
        assert!(json.get("step").is_none());
    }

    #[test]
    fn test_channel_capacity_covers_all_events() {
        let plan = plan();
        let total = plan.total_steps();
        assert!(channel_capacity(total) >= total * 2 + Phase::COUNT * 2 + 2);
    }
}
