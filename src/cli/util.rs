//! CLI Common Utilities
//!
//! Shared config/plan/cache loading for command handlers.

use std::path::PathBuf;

use crate::config::{Config, ConfigLoader};
use crate::report::ReportPlan;
use crate::storage::FileCacheStore;
use crate::types::{ForgeError, Result};

/// Command execution context
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Loaded configuration
    pub config: Config,
    /// Plan file (CLI override or `paths.plan_file`)
    pub plan_path: PathBuf,
}

impl CommandContext {
    pub fn load(plan_override: Option<PathBuf>) -> Result<Self> {
        let config = ConfigLoader::load()?;
        let plan_path = plan_override.unwrap_or_else(|| config.paths.plan_file.clone());
        Ok(Self { config, plan_path })
    }

    pub fn plan(&self) -> Result<ReportPlan> {
        if !self.plan_path.exists() {
            return Err(ForgeError::Plan(format!(
                "plan file {} not found. Run 'reportforge config init' or pass --plan",
                self.plan_path.display()
            )));
        }
        ReportPlan::load(&self.plan_path)
    }

    pub fn cache(&self) -> FileCacheStore {
        FileCacheStore::new(&self.config.paths.cache_dir)
    }
}
