//! Generate Command
//!
//! Runs the report pipeline in the foreground.
//!
//! Commands:
//! - generate: Regenerate every fragment
//! - generate --resume: Reuse substantial cached fragments
//! - generate --assemble-only: Rebuild the document from cache, offline

use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use secrecy::SecretString;
use tracing::debug;

use crate::cli::progress::ConsoleRenderer;
use crate::cli::util::CommandContext;
use crate::report::{ExecutionMode, PipelineRunner, RunnerDeps};
use crate::types::{ForgeError, Result};

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Plan file override
    pub plan: Option<PathBuf>,
    /// Service credential; only optional in assemble-only mode
    pub api_key: Option<String>,
    pub mode: ExecutionMode,
    /// Output directory override
    pub output: Option<PathBuf>,
}

/// How a foreground run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Cancelled,
    Failed,
}

pub async fn run(options: GenerateOptions) -> Result<RunOutcome> {
    let ctx = CommandContext::load(options.plan)?;
    let mut config = ctx.config.clone();
    if let Some(output) = options.output {
        config.paths.output_dir = output;
    }
    let plan = ctx.plan()?;

    let credential = credential(options.api_key, options.mode)?;

    println!(
        "{} {} ({} chapters, {} steps, mode {})",
        style("ReportForge").bold(),
        style(&plan.title).cyan(),
        plan.chapters.len(),
        plan.total_steps(),
        options.mode
    );

    let runner = Arc::new(PipelineRunner::new(RunnerDeps::from_config(&config, plan)));
    let events = runner.start(credential, options.mode)?;

    let interrupt = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "\n{} Stopping after the current step...",
                    style("⚠").yellow()
                );
                runner.cancel();
            }
        })
    };

    ConsoleRenderer::new().drain(events).await;
    runner.wait().await;
    interrupt.abort();

    let status = runner.status();
    debug!(?status, "Run finished");

    Ok(if status.error.is_some() {
        RunOutcome::Failed
    } else if status.cancelled {
        RunOutcome::Cancelled
    } else {
        RunOutcome::Done
    })
}

fn credential(api_key: Option<String>, mode: ExecutionMode) -> Result<SecretString> {
    match api_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => Ok(SecretString::from(key)),
        None if mode.uses_network() => Err(ForgeError::Config(
            "API key required: pass --api-key or set GEMINI_API_KEY".to_string(),
        )),
        None => Ok(SecretString::from(String::new())),
    }
}
