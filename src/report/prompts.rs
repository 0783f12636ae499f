//! Prompt Builders
//!
//! A prompt builder turns typed step arguments into the parts of one
//! request: a system preamble, the section instructions, and the media files
//! to attach. The executor only ever sees `PromptParts`, so prompt wording
//! can be swapped without touching orchestration.

use std::path::PathBuf;

use super::chapter::ChapterSections;
use super::plan::{ChapterConfig, MediaSpec};
use crate::constants::pipeline as pipeline_constants;

/// Typed arguments for each kind of step
#[derive(Debug, Clone)]
pub enum PromptArgs {
    /// Chapter background from its context material
    Context {
        chapter: ChapterConfig,
        context_text: String,
    },
    /// Chapter data analysis from a pre-extracted summary
    Data {
        chapter: ChapterConfig,
        data_text: String,
    },
    /// Discussion of the chapter's attached media
    Media { chapter: ChapterConfig },
    /// Introduction and closing assessment over the chapter's wave-1 output
    Synthesis {
        chapter: ChapterConfig,
        sections: ChapterSections,
    },
    /// Report-wide conclusions
    Conclusions { report_text: String },
    /// Executive summary over chapters and conclusions
    ExecutiveSummary {
        report_text: String,
        conclusions: String,
    },
    /// Binary asset for the media phase
    MediaAsset { spec: MediaSpec },
}

impl PromptArgs {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Context { .. } => "context",
            Self::Data { .. } => "data",
            Self::Media { .. } => "media",
            Self::Synthesis { .. } => "synthesis",
            Self::Conclusions { .. } => "conclusions",
            Self::ExecutiveSummary { .. } => "executive_summary",
            Self::MediaAsset { .. } => "media_asset",
        }
    }
}

/// Built request content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptParts {
    pub system: String,
    pub section: String,
    pub attachments: Vec<PathBuf>,
}

impl PromptParts {
    /// System preamble and section instructions as one text
    pub fn instructions(&self) -> String {
        if self.system.is_empty() {
            return self.section.clone();
        }
        format!("{}\n\n---\n\n{}", self.system, self.section)
    }
}

/// Produces request content for a step
pub trait PromptBuilder: Send + Sync {
    fn build(&self, args: &PromptArgs) -> PromptParts;
}

/// Plain English prompts for technical reports
#[derive(Debug, Clone)]
pub struct DefaultPrompts {
    role: String,
    separator: String,
}

impl Default for DefaultPrompts {
    fn default() -> Self {
        Self::new(None, pipeline_constants::SYNTHESIS_SEPARATOR)
    }
}

impl DefaultPrompts {
    pub fn new(role: Option<&str>, separator: impl Into<String>) -> Self {
        let role = role
            .map(str::to_string)
            .unwrap_or_else(|| {
                "You are a senior technical reviewer writing one chapter of a formal report. \
                 Write in precise, neutral prose with Markdown headings at level ### or below. \
                 Base every statement on the material provided and flag gaps explicitly."
                    .to_string()
            });
        Self {
            role,
            separator: separator.into(),
        }
    }

    fn heading(chapter: &ChapterConfig) -> String {
        format!("## Chapter {}: {}", chapter.number, chapter.title)
    }

    fn themes(chapter: &ChapterConfig) -> String {
        if chapter.themes.is_empty() {
            return String::new();
        }
        let list = chapter
            .themes
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n### Points to address\n{}\n", list)
    }
}

impl PromptBuilder for DefaultPrompts {
    fn build(&self, args: &PromptArgs) -> PromptParts {
        match args {
            PromptArgs::Context {
                chapter,
                context_text,
            } => PromptParts {
                system: self.role.clone(),
                section: format!(
                    "{}\n\n### Background material\n{}\n{}\n### Task\n\
                     Write the background section of this chapter: the concepts, methods \
                     and criteria a reader needs before the analysis. Do not repeat the \
                     chapter heading.",
                    Self::heading(chapter),
                    context_text,
                    Self::themes(chapter)
                ),
                attachments: Vec::new(),
            },
            PromptArgs::Data { chapter, data_text } => PromptParts {
                system: self.role.clone(),
                section: format!(
                    "{}\n\n### Extracted data\n{}\n{}\n### Task\n\
                     Analyse the data above. Quote figures exactly, point out trends and \
                     anomalies, and state which conclusions the data does not support.",
                    Self::heading(chapter),
                    data_text,
                    Self::themes(chapter)
                ),
                attachments: Vec::new(),
            },
            PromptArgs::Media { chapter } => {
                let captions = chapter
                    .media_files
                    .iter()
                    .enumerate()
                    .map(|(i, m)| {
                        let caption = if m.caption.is_empty() {
                            m.path
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_default()
                        } else {
                            m.caption.clone()
                        };
                        format!("{}. {}", i + 1, caption)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                PromptParts {
                    system: self.role.clone(),
                    section: format!(
                        "{}\n\n### Attached figures\n{}\n\n### Task\n\
                         Discuss each attached figure in order: what it shows, what stands \
                         out, and how it bears on the chapter's questions.",
                        Self::heading(chapter),
                        captions
                    ),
                    attachments: chapter.media_paths(),
                }
            }
            PromptArgs::Synthesis { chapter, sections } => PromptParts {
                system: self.role.clone(),
                section: format!(
                    "{heading}\n\nThe sections already written for this chapter follow.\n\n\
                     --- BACKGROUND ---\n{context}\n\n--- DATA ANALYSIS ---\n{data}\n\n\
                     --- MEDIA DISCUSSION ---\n{media}\n\n### Task\n\
                     1. Write a chapter introduction of two or three paragraphs without a heading.\n\
                     2. Write the closing assessment, starting with \"### Closing Assessment\", \
                     ending in a verdict: COMPLIANT, NON-COMPLIANT or NEEDS ATTENTION.\n\n\
                     Separate the two parts with a line containing only: {separator}",
                    heading = Self::heading(chapter),
                    context = sections.context,
                    data = sections.data,
                    media = sections.media,
                    separator = self.separator
                ),
                attachments: Vec::new(),
            },
            PromptArgs::Conclusions { report_text } => PromptParts {
                system: self.role.clone(),
                section: format!(
                    "{}\n\n### Task\nWrite the report's conclusions and a prioritised list of \
                     recommendations, citing the chapter each one comes from.",
                    report_text
                ),
                attachments: Vec::new(),
            },
            PromptArgs::ExecutiveSummary {
                report_text,
                conclusions,
            } => PromptParts {
                system: self.role.clone(),
                section: format!(
                    "{}\n\n## Conclusions\n{}\n\n### Task\nWrite a one-page executive summary \
                     for a non-specialist decision maker.",
                    report_text, conclusions
                ),
                attachments: Vec::new(),
            },
            PromptArgs::MediaAsset { spec } => PromptParts {
                system: String::new(),
                section: spec.instructions.clone(),
                attachments: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::plan::{ChapterEffort, MediaFile};

    fn chapter() -> ChapterConfig {
        ChapterConfig {
            number: 3,
            title: "Calorific Value".into(),
            context_file: None,
            data_file: None,
            media_files: vec![MediaFile {
                path: PathBuf::from("charts/pcs.png"),
                caption: String::new(),
            }],
            themes: vec!["sampling frequency".into()],
            effort: ChapterEffort::default(),
            uses_shared_context: true,
        }
    }

    #[test]
    fn test_instructions_join_system_and_section() {
        let parts = PromptParts {
            system: "sys".into(),
            section: "sec".into(),
            attachments: vec![],
        };
        assert_eq!(parts.instructions(), "sys\n\n---\n\nsec");

        let bare = PromptParts {
            section: "only".into(),
            ..Default::default()
        };
        assert_eq!(bare.instructions(), "only");
    }

    #[test]
    fn test_media_prompt_attaches_files() {
        let parts = DefaultPrompts::default().build(&PromptArgs::Media { chapter: chapter() });
        assert_eq!(parts.attachments, vec![PathBuf::from("charts/pcs.png")]);
        assert!(parts.section.contains("1. pcs.png"));
    }

    #[test]
    fn test_synthesis_prompt_names_separator() {
        let prompts = DefaultPrompts::new(Some("Auditor"), "@@SPLIT@@");
        let parts = prompts.build(&PromptArgs::Synthesis {
            chapter: chapter(),
            sections: ChapterSections {
                context: "ctx".into(),
                data: "dat".into(),
                media: "med".into(),
            },
        });
        assert_eq!(parts.system, "Auditor");
        assert!(parts.section.contains("@@SPLIT@@"));
        assert!(parts.section.contains("--- DATA ANALYSIS ---\ndat"));
    }

    #[test]
    fn test_context_prompt_lists_themes() {
        let parts = DefaultPrompts::default().build(&PromptArgs::Context {
            chapter: chapter(),
            context_text: "material".into(),
        });
        assert!(parts.section.contains("- sampling frequency"));
        assert!(parts.section.starts_with("## Chapter 3: Calorific Value"));
    }
}
