//! Report Plan
//!
//! The statically configured shape of a report: chapters, the media assets
//! generated before them, and the fixed global steps after them. Loaded from
//! a TOML file; relative paths resolve against the plan file's directory.
//!
//! The plan also owns the step map: every step identifier (which doubles as
//! the cache key), its label, phase and chapter, in execution order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ai::EffortLevel;
use crate::types::{CacheKey, ForgeError, Result};

pub const CONCLUSIONS_KEY: &str = "conclusions";
pub const EXECUTIVE_SUMMARY_KEY: &str = "executive_summary";
pub const ASSEMBLY_KEY: &str = "assembly";

// =============================================================================
// Phases
// =============================================================================

/// Pipeline phase, numbered in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Phase {
    MediaGeneration = 0,
    Chapters = 1,
    Conclusions = 2,
    ExecutiveSummary = 3,
    Assembly = 4,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Self::MediaGeneration,
        Self::Chapters,
        Self::Conclusions,
        Self::ExecutiveSummary,
        Self::Assembly,
    ];

    /// Total number of phases
    pub const COUNT: usize = 5;

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MediaGeneration => "Media Generation",
            Self::Chapters => "Chapter Generation",
            Self::Conclusions => "Conclusions and Recommendations",
            Self::ExecutiveSummary => "Executive Summary",
            Self::Assembly => "Document Assembly",
        }
    }

    pub fn from_u8(phase: u8) -> Option<Self> {
        Self::ALL.get(phase as usize).copied()
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> u8 {
        phase.as_u8()
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Phase::from_u8(value).ok_or_else(|| format!("unknown phase {}", value))
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Plan Types
// =============================================================================

/// Attachable media file referenced by a chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub path: PathBuf,
    #[serde(default)]
    pub caption: String,
}

/// Effort hint per chapter step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterEffort {
    pub context: EffortLevel,
    pub data: EffortLevel,
    pub media: EffortLevel,
    pub synthesis: EffortLevel,
}

impl Default for ChapterEffort {
    fn default() -> Self {
        Self {
            context: EffortLevel::Low,
            data: EffortLevel::Low,
            media: EffortLevel::High,
            synthesis: EffortLevel::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterConfig {
    pub number: u32,
    pub title: String,
    /// Background material the context step expands on
    #[serde(default)]
    pub context_file: Option<PathBuf>,
    /// Pre-extracted data summary; the data step is skipped without it
    #[serde(default)]
    pub data_file: Option<PathBuf>,
    /// Media discussed by the media step; the step is skipped when empty
    #[serde(default)]
    pub media_files: Vec<MediaFile>,
    /// Points the chapter must address
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub effort: ChapterEffort,
    #[serde(default = "default_true")]
    pub uses_shared_context: bool,
}

fn default_true() -> bool {
    true
}

impl ChapterConfig {
    pub fn context_key(&self) -> CacheKey {
        CacheKey::new(format!("ch{}_a_context", self.number))
    }

    pub fn data_key(&self) -> CacheKey {
        CacheKey::new(format!("ch{}_b_data", self.number))
    }

    pub fn media_key(&self) -> CacheKey {
        CacheKey::new(format!("ch{}_c_media", self.number))
    }

    pub fn synthesis_key(&self) -> CacheKey {
        CacheKey::new(format!("ch{}_d_synthesis", self.number))
    }

    pub fn has_data(&self) -> bool {
        self.data_file.is_some()
    }

    pub fn has_media(&self) -> bool {
        !self.media_files.is_empty()
    }

    pub fn media_paths(&self) -> Vec<PathBuf> {
        self.media_files.iter().map(|m| m.path.clone()).collect()
    }

    /// Wave-1 step keys in declaration order
    pub fn wave1_keys(&self) -> Vec<CacheKey> {
        let mut keys = vec![self.context_key()];
        if self.has_data() {
            keys.push(self.data_key());
        }
        if self.has_media() {
            keys.push(self.media_key());
        }
        keys
    }
}

/// Binary asset produced during the media phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSpec {
    pub name: String,
    pub instructions: String,
    /// Where the asset is written
    pub output: PathBuf,
}

impl MediaSpec {
    pub fn key(&self) -> CacheKey {
        CacheKey::new(format!("media_{}", self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPlan {
    pub title: String,
    /// Large artifact uploaded once and referenced by chapter steps
    #[serde(default)]
    pub shared_context: Option<PathBuf>,
    /// Persona/preamble prepended to every prompt
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterConfig>,
    #[serde(default)]
    pub media: Vec<MediaSpec>,
}

/// One entry of the step map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepInfo {
    pub key: CacheKey,
    pub label: String,
    pub phase: Phase,
    pub chapter: Option<u32>,
}

impl ReportPlan {
    /// Load and validate a plan, resolving relative paths against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForgeError::Plan(format!("cannot read plan {}: {}", path.display(), e))
        })?;
        let mut plan: ReportPlan = toml::from_str(&content)?;

        if let Some(base) = path.parent() {
            plan.resolve_paths(base);
        }
        plan.validate()?;
        Ok(plan)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        if let Some(p) = self.shared_context.as_mut() {
            resolve(p);
        }
        for chapter in &mut self.chapters {
            if let Some(p) = chapter.context_file.as_mut() {
                resolve(p);
            }
            if let Some(p) = chapter.data_file.as_mut() {
                resolve(p);
            }
            for media in &mut chapter.media_files {
                resolve(&mut media.path);
            }
        }
        for spec in &mut self.media {
            resolve(&mut spec.output);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ForgeError::Plan("title must not be empty".to_string()));
        }
        if self.chapters.is_empty() {
            return Err(ForgeError::Plan("plan declares no chapters".to_string()));
        }

        let mut numbers = HashSet::new();
        for chapter in &self.chapters {
            if !numbers.insert(chapter.number) {
                return Err(ForgeError::Plan(format!(
                    "chapter {} declared twice",
                    chapter.number
                )));
            }
        }

        let mut names = HashSet::new();
        for spec in &self.media {
            if !spec.key().is_file_safe() {
                return Err(ForgeError::Plan(format!(
                    "media name '{}' may only use letters, digits, '_', '-' and '.'",
                    spec.name
                )));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(ForgeError::Plan(format!(
                    "media '{}' declared twice",
                    spec.name
                )));
            }
        }

        Ok(())
    }

    pub fn chapter(&self, number: u32) -> Option<&ChapterConfig> {
        self.chapters.iter().find(|c| c.number == number)
    }

    /// Every step in execution order
    pub fn steps(&self) -> Vec<StepInfo> {
        let mut steps = Vec::new();

        for spec in &self.media {
            steps.push(StepInfo {
                key: spec.key(),
                label: format!("Media: {}", spec.name),
                phase: Phase::MediaGeneration,
                chapter: None,
            });
        }

        for chapter in &self.chapters {
            let n = chapter.number;
            let mut push = |key: CacheKey, what: &str| {
                steps.push(StepInfo {
                    key,
                    label: format!("Ch. {}: {}", n, what),
                    phase: Phase::Chapters,
                    chapter: Some(n),
                });
            };
            push(chapter.context_key(), "Context");
            if chapter.has_data() {
                push(chapter.data_key(), "Data");
            }
            if chapter.has_media() {
                push(chapter.media_key(), "Media discussion");
            }
            push(chapter.synthesis_key(), "Synthesis");
        }

        for (key, phase) in [
            (CONCLUSIONS_KEY, Phase::Conclusions),
            (EXECUTIVE_SUMMARY_KEY, Phase::ExecutiveSummary),
            (ASSEMBLY_KEY, Phase::Assembly),
        ] {
            steps.push(StepInfo {
                key: CacheKey::new(key),
                label: phase.name().to_string(),
                phase,
                chapter: None,
            });
        }

        steps
    }

    pub fn total_steps(&self) -> usize {
        self.steps().len()
    }

    pub fn step_info(&self, key: &CacheKey) -> Option<StepInfo> {
        self.steps().into_iter().find(|s| &s.key == key)
    }

    /// Cache keys that hold generated text (media and assembly steps excluded)
    pub fn text_keys(&self) -> Vec<CacheKey> {
        self.steps()
            .into_iter()
            .filter(|s| !matches!(s.phase, Phase::MediaGeneration | Phase::Assembly))
            .map(|s| s.key)
            .collect()
    }
}
