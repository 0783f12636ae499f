//! Subcalls and Waves
//!
//! A subcall is one unit of generation work: its cache key, the arguments
//! its prompt is built from, an effort hint, and the chapter wave it runs in
//! (report-wide steps run outside both waves).

use serde::{Deserialize, Serialize};

use super::chapter::ChapterSections;
use super::plan::ChapterConfig;
use super::prompts::PromptArgs;

pub use crate::ai::EffortLevel;
pub use crate::types::CacheKey;

/// Barrier-synchronized batch a subcall belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Wave {
    /// Independent leaf subcalls
    First = 1,
    /// Per-chapter synthesis over the first wave's output
    Second = 2,
}

impl Wave {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone)]
pub struct Subcall {
    pub key: CacheKey,
    pub args: PromptArgs,
    pub effort: EffortLevel,
    /// `None` for report-wide steps
    pub wave: Option<Wave>,
    /// `None` for report-wide steps
    pub chapter: Option<u32>,
    pub uses_shared_context: bool,
}

impl Subcall {
    /// Wave-1 subcalls of a chapter: context always, data and media when configured
    pub fn chapter_leaves(
        chapter: &ChapterConfig,
        context_text: String,
        data_text: String,
        shared_context: bool,
    ) -> Vec<Subcall> {
        let uses_shared_context = shared_context && chapter.uses_shared_context;
        let leaf = |key: CacheKey, args: PromptArgs, effort: EffortLevel| Subcall {
            key,
            args,
            effort,
            wave: Some(Wave::First),
            chapter: Some(chapter.number),
            uses_shared_context,
        };

        let mut subcalls = vec![leaf(
            chapter.context_key(),
            PromptArgs::Context {
                chapter: chapter.clone(),
                context_text,
            },
            chapter.effort.context,
        )];

        if chapter.has_data() {
            subcalls.push(leaf(
                chapter.data_key(),
                PromptArgs::Data {
                    chapter: chapter.clone(),
                    data_text,
                },
                chapter.effort.data,
            ));
        }

        if chapter.has_media() {
            subcalls.push(leaf(
                chapter.media_key(),
                PromptArgs::Media {
                    chapter: chapter.clone(),
                },
                chapter.effort.media,
            ));
        }

        subcalls
    }

    /// Wave-2 synthesis of a chapter over its wave-1 sections
    pub fn synthesis(chapter: &ChapterConfig, sections: ChapterSections) -> Subcall {
        Subcall {
            key: chapter.synthesis_key(),
            args: PromptArgs::Synthesis {
                chapter: chapter.clone(),
                sections,
            },
            effort: chapter.effort.synthesis,
            wave: Some(Wave::Second),
            chapter: Some(chapter.number),
            uses_shared_context: false,
        }
    }

    /// Report-wide step outside the chapter waves
    pub fn global(key: impl Into<CacheKey>, args: PromptArgs, effort: EffortLevel) -> Subcall {
        Subcall {
            key: key.into(),
            args,
            effort,
            wave: None,
            chapter: None,
            uses_shared_context: false,
        }
    }
}
