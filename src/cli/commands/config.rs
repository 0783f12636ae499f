//! Config Command
//!
//! Manage ReportForge configuration.
//!
//! Usage:
//!   reportforge config show [-f json]
//!   reportforge config path
//!   reportforge config init [--force]

use std::path::Path;

use crate::config::ConfigLoader;
use crate::types::Result;

const SAMPLE_PLAN: &str = r#"# ReportForge report plan
# Relative paths resolve against this file's directory.

title = "Annual Operations Report"
# shared_context = "inputs/source.pdf"
role = "You are a senior analyst writing a formal technical report."

[[chapters]]
number = 1
title = "Background"
context_file = "context/ch1.md"
themes = ["scope", "history"]

[[chapters]]
number = 2
title = "Performance"
context_file = "context/ch2.md"
data_file = "data/ch2.md"
media_files = [{ path = "charts/ch2.png", caption = "Monthly performance" }]

[chapters.effort]
synthesis = "high"

# [[media]]
# name = "overview_diagram"
# instructions = "Draw a block diagram of the operation"
# output = "media/overview.png"
"#;

/// Show effective configuration
pub fn show(format: &str) -> Result<()> {
    ConfigLoader::show_config(format == "json")
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Initialize project configuration and a sample plan
pub fn init(force: bool) -> Result<()> {
    let root = std::env::current_dir()?;
    let dir = init_in(&root, force)?;

    println!("✓ Initialized project configuration");
    println!("  Directory: {}", dir.display());
    println!("  Config:    {}", dir.join("config.toml").display());
    println!("  Plan:      {}", dir.join("plan.toml").display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the plan's chapters and input files");
    println!("  2. Run 'reportforge generate' with GEMINI_API_KEY set");
    Ok(())
}

fn init_in(root: &Path, force: bool) -> Result<std::path::PathBuf> {
    let dir = ConfigLoader::init_project(root, force)?;
    let plan_path = dir.join("plan.toml");
    if !plan_path.exists() || force {
        std::fs::write(&plan_path, SAMPLE_PLAN)?;
    }
    Ok(dir)
}
