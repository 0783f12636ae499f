//! Status Command
//!
//! Shows which steps of the plan are already materialized: cached text
//! fragments, media files on disk and the assembled document.

use std::path::Path;

use serde::Serialize;

use crate::cli::util::CommandContext;
use crate::config::Config;
use crate::report::{MarkdownAssembler, Phase, ReportPlan};
use crate::storage::CacheStore;
use crate::types::{CacheKey, Result};

#[derive(Debug, Clone, Serialize)]
pub struct StepStatus {
    pub key: CacheKey,
    pub label: String,
    pub phase: Phase,
    pub materialized: bool,
    /// Cached characters for text steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chars: Option<usize>,
}

pub async fn run(plan: Option<std::path::PathBuf>, format: &str) -> Result<()> {
    let ctx = CommandContext::load(plan)?;
    let plan = ctx.plan()?;
    let steps = collect(&plan, &ctx.config, &ctx.cache()).await?;
    let done = steps.iter().filter(|s| s.materialized).count();

    if format == "json" {
        let status = serde_json::json!({
            "title": plan.title,
            "materialized": done,
            "total": steps.len(),
            "steps": steps,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", plan.title);
    println!("══════════════════════════════════════");
    let mut phase = None;
    for step in &steps {
        if phase != Some(step.phase) {
            phase = Some(step.phase);
            println!("\n{}", step.phase);
        }
        let mark = if step.materialized { "✓" } else { "·" };
        match step.chars {
            Some(chars) if step.materialized => {
                println!("  {} {:<28} {} chars", mark, step.key.as_str(), chars)
            }
            _ => println!("  {} {}", mark, step.key.as_str()),
        }
    }
    println!("\n{}/{} steps materialized", done, steps.len());

    Ok(())
}

pub async fn collect(
    plan: &ReportPlan,
    config: &Config,
    cache: &dyn CacheStore,
) -> Result<Vec<StepStatus>> {
    let assembler = MarkdownAssembler::new(&config.paths.output_dir);
    let mut statuses = Vec::new();

    for step in plan.steps() {
        let (materialized, chars) = match step.phase {
            Phase::MediaGeneration => {
                let output = plan
                    .media
                    .iter()
                    .find(|m| m.key() == step.key)
                    .map(|m| m.output.as_path());
                (output.is_some_and(Path::exists), None)
            }
            Phase::Assembly => (assembler.document_path(&plan.title).exists(), None),
            _ => {
                let chars = cache
                    .get(&step.key)
                    .await?
                    .map(|text| text.trim().chars().count())
                    .filter(|&n| n > 0);
                (chars.is_some(), chars)
            }
        };

        statuses.push(StepStatus {
            key: step.key,
            label: step.label,
            phase: step.phase,
            materialized,
            chars,
        });
    }

    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCacheStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_collect_reports_cached_and_missing() {
        let temp_dir = TempDir::new().unwrap();
        let plan: ReportPlan = toml::from_str(&format!(
            r#"
title = "Audit"

[[chapters]]
number = 1
title = "One"

[[media]]
name = "diagram"
instructions = "draw"
output = "{}"
"#,
            temp_dir.path().join("diagram.png").display()
        ))
        .unwrap();
        std::fs::write(temp_dir.path().join("diagram.png"), b"png").unwrap();

        let mut config = Config::default();
        config.paths.output_dir = temp_dir.path().join("reports");
        let cache = MemoryCacheStore::new()
            .with_fragment("ch1_a_context", "Background text")
            .with_fragment("conclusions", "   ");

        let steps = collect(&plan, &config, &cache).await.unwrap();
        let by_key = |k: &str| steps.iter().find(|s| s.key.as_str() == k).unwrap();

        assert!(by_key("media_diagram").materialized);
        assert_eq!(by_key("ch1_a_context").chars, Some(15));
        assert!(!by_key("ch1_d_synthesis").materialized);
        assert!(!by_key("conclusions").materialized);
        assert!(!by_key("assembly").materialized);
    }
}
