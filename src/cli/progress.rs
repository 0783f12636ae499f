//! Console Progress Rendering
//!
//! Turns the pipeline's event stream into one styled console line per event.

use console::style;
use tokio::sync::mpsc;

use crate::report::{EventKind, ProgressEvent};

pub struct ConsoleRenderer {
    show_bar: bool,
    bar_width: usize,
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self {
            show_bar: true,
            bar_width: 24,
        }
    }

    pub fn with_bar(mut self, show: bool) -> Self {
        self.show_bar = show;
        self
    }

    /// Print events until the run closes its stream
    pub async fn drain(&self, mut events: mpsc::Receiver<ProgressEvent>) {
        while let Some(event) = events.recv().await {
            if let Some(line) = self.render(&event) {
                if event.kind == EventKind::Error {
                    eprintln!("{}", line);
                } else {
                    println!("{}", line);
                }
            }
        }
    }

    /// One console line for an event, or `None` when it is not worth showing
    pub fn render(&self, event: &ProgressEvent) -> Option<String> {
        let counter = format!("[{}/{}]", event.completed_count, event.total_count);

        let line = match event.kind {
            EventKind::PhaseStart => {
                let phase = event.phase?;
                let wave = event
                    .wave
                    .map(|w| format!(" (wave {})", w))
                    .unwrap_or_default();
                format!(
                    "\n{} {}{}",
                    style(format!("Phase {}:", phase.as_u8())).bold(),
                    style(phase.name()).bold(),
                    wave
                )
            }
            EventKind::PhaseComplete => return None,
            EventKind::StepStart => format!(
                "  {} {} {}",
                style("→").cyan(),
                style(counter).dim(),
                self.step_label(event)
            ),
            EventKind::StepComplete => {
                let bar = if self.show_bar {
                    format!(
                        " {}",
                        render_progress_bar(
                            event.completed_count,
                            event.total_count,
                            self.bar_width
                        )
                    )
                } else {
                    String::new()
                };
                format!(
                    "  {} {} {}{}",
                    style("✓").green(),
                    style(counter).dim(),
                    self.step_label(event),
                    bar
                )
            }
            EventKind::Error => format!(
                "\n{} Pipeline failed after {}: {}",
                style("✗").red(),
                format_duration(event.elapsed_secs as u64),
                event.message.as_deref().unwrap_or("unknown error")
            ),
            EventKind::Cancelled => format!(
                "\n{} Cancelled after {} ({} of {} steps done)",
                style("⚠").yellow(),
                format_duration(event.elapsed_secs as u64),
                event.completed_count,
                event.total_count
            ),
            EventKind::Done => format!(
                "\n{} Report ready in {}: {}",
                style("✓").green().bold(),
                format_duration(event.elapsed_secs as u64),
                event.message.as_deref().unwrap_or_default()
            ),
        };

        Some(line)
    }

    fn step_label(&self, event: &ProgressEvent) -> String {
        match (&event.label, &event.step) {
            (Some(label), _) => label.clone(),
            (None, Some(step)) => step.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Render a simple progress bar
pub(crate) fn render_progress_bar(completed: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return format!("[{}]", " ".repeat(width));
    }

    let progress = (completed as f32 / total as f32).min(1.0);
    let filled = (progress * width as f32) as usize;
    let empty = width.saturating_sub(filled);

    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format duration as human-readable string
pub(crate) fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Phase;
    use crate::types::CacheKey;
    use chrono::Utc;

    fn event(kind: EventKind) -> ProgressEvent {
        ProgressEvent {
            kind,
            step: None,
            label: None,
            phase: None,
            wave: None,
            chapter: None,
            completed_count: 3,
            total_count: 10,
            elapsed_secs: 95.0,
            timestamp: Utc::now(),
            message: None,
        }
    }

    #[test]
    fn test_render_step_uses_label() {
        console::set_colors_enabled(false);
        let mut e = event(EventKind::StepComplete);
        e.step = Some(CacheKey::new("ch2_b_data"));
        e.label = Some("Ch. 2: Data".into());

        let line = ConsoleRenderer::new().with_bar(false).render(&e).unwrap();
        assert!(line.contains("[3/10]"));
        assert!(line.contains("Ch. 2: Data"));
    }

    #[test]
    fn test_render_phase_start_with_wave() {
        console::set_colors_enabled(false);
        let mut e = event(EventKind::PhaseStart);
        e.phase = Some(Phase::Chapters);
        e.wave = Some(2);

        let line = ConsoleRenderer::new().render(&e).unwrap();
        assert!(line.contains("Chapter Generation (wave 2)"));
    }

    #[test]
    fn test_phase_complete_is_silent() {
        let mut e = event(EventKind::PhaseComplete);
        e.phase = Some(Phase::Assembly);
        assert!(ConsoleRenderer::new().render(&e).is_none());
    }

    #[test]
    fn test_render_done_shows_output_and_duration() {
        console::set_colors_enabled(false);
        let mut e = event(EventKind::Done);
        e.message = Some("reports/audit.md".into());

        let line = ConsoleRenderer::new().render(&e).unwrap();
        assert!(line.contains("1m 35s"));
        assert!(line.ends_with("reports/audit.md"));
    }

    #[test]
    fn test_progress_bar_render() {
        assert_eq!(render_progress_bar(0, 10, 10), "[░░░░░░░░░░]");
        assert_eq!(render_progress_bar(5, 10, 10), "[█████░░░░░]");
        assert_eq!(render_progress_bar(10, 10, 10), "[██████████]");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3700), "1h 1m");
    }
}
