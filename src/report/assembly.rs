//! Document Assembly
//!
//! Turns generated text into the final document. Richer formats plug in
//! through [`DocumentAssembler`]; the built-in assembler writes Markdown.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::chapter::ChapterResult;
use crate::types::{ForgeError, Result};

/// Everything the final document is built from
#[derive(Debug, Clone, Default)]
pub struct AssemblyInput {
    pub title: String,
    pub executive_summary: String,
    pub chapters: Vec<ChapterResult>,
    pub conclusions: String,
    /// Media assets that exist on disk
    pub media: Vec<PathBuf>,
}

#[async_trait]
pub trait DocumentAssembler: Send + Sync {
    /// Write the document and return its path
    async fn assemble(&self, input: &AssemblyInput) -> Result<PathBuf>;
}

/// Single Markdown file in `output_dir`
#[derive(Debug, Clone)]
pub struct MarkdownAssembler {
    output_dir: PathBuf,
}

impl MarkdownAssembler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Where the document for `title` is written
    pub fn document_path(&self, title: &str) -> PathBuf {
        self.output_dir.join(format!("{}.md", slug(title)))
    }

    pub fn render(input: &AssemblyInput) -> String {
        let mut doc = String::new();
        doc.push_str(&format!("# {}\n\n", input.title));

        doc.push_str("## Executive Summary\n\n");
        doc.push_str(input.executive_summary.trim());
        doc.push_str("\n\n");

        let mut chapters: Vec<&ChapterResult> = input.chapters.iter().collect();
        chapters.sort_by_key(|c| c.number);

        for chapter in chapters {
            doc.push_str(&format!("## {}. {}\n\n", chapter.number, chapter.title));
            for part in [
                &chapter.introduction,
                &chapter.sections.context,
                &chapter.sections.data,
                &chapter.sections.media,
                &chapter.assessment,
            ] {
                if !part.trim().is_empty() {
                    doc.push_str(part.trim());
                    doc.push_str("\n\n");
                }
            }
        }

        doc.push_str("## Conclusions and Recommendations\n\n");
        doc.push_str(input.conclusions.trim());
        doc.push('\n');

        if !input.media.is_empty() {
            doc.push_str("\n## Figures\n\n");
            for path in &input.media {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                doc.push_str(&format!("![{}]({})\n", name, path.display()));
            }
        }

        doc
    }
}

/// File-name-safe form of a title
fn slug(title: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() {
        "report".to_string()
    } else {
        slug
    }
}

#[async_trait]
impl DocumentAssembler for MarkdownAssembler {
    async fn assemble(&self, input: &AssemblyInput) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ForgeError::Assembly(format!("{}: {}", self.output_dir.display(), e)))?;

        let path = self.document_path(&input.title);
        tokio::fs::write(&path, Self::render(input))
            .await
            .map_err(|e| ForgeError::Assembly(format!("{}: {}", path.display(), e)))?;

        info!("Report written: {}", path.display());
        Ok(path)
    }
}
