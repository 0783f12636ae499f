//! Chapter Results
//!
//! A chapter is assembled from its wave-1 sections plus the two halves of
//! its synthesis: an introduction placed before the sections and a closing
//! assessment placed after them.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::pipeline::ASSESSMENT_HEADING;

/// Closing-assessment heading, tolerant of spacing and case
static ASSESSMENT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)###\s*closing\s+assessment").ok());

/// Wave-1 output of one chapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSections {
    pub context: String,
    pub data: String,
    pub media: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterResult {
    pub number: u32,
    pub title: String,
    pub introduction: String,
    pub sections: ChapterSections,
    pub assessment: String,
}

impl ChapterResult {
    pub fn new(number: u32, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            ..Default::default()
        }
    }

    /// Attach the synthesis output, split into introduction and assessment
    pub fn apply_synthesis(&mut self, synthesis: &str, separator: &str) {
        let (introduction, assessment) = parse_synthesis(synthesis, separator);
        self.introduction = introduction;
        self.assessment = assessment;
    }

    /// All parts combined, used as context for the global steps
    pub fn full_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.introduction.is_empty() {
            parts.push(self.introduction.clone());
        }
        if !self.sections.context.is_empty() {
            parts.push(format!("### Background\n{}", self.sections.context));
        }
        if !self.sections.data.is_empty() {
            parts.push(format!("### Data Analysis\n{}", self.sections.data));
        }
        if !self.sections.media.is_empty() {
            parts.push(format!("### Media Discussion\n{}", self.sections.media));
        }
        if !self.assessment.is_empty() {
            if assessment_heading(&self.assessment).is_some_and(|m| m.start() == 0) {
                parts.push(self.assessment.clone());
            } else {
                parts.push(format!("{}\n{}", ASSESSMENT_HEADING, self.assessment));
            }
        }
        parts.join("\n\n")
    }
}

/// Split synthesis output into (introduction, closing assessment).
///
/// Splits on the first `separator`; falls back to the closing-assessment
/// heading; otherwise the whole text is the introduction.
pub fn parse_synthesis(text: &str, separator: &str) -> (String, String) {
    if !separator.is_empty()
        && let Some((intro, assessment)) = text.split_once(separator)
    {
        return (intro.trim().to_string(), assessment.trim().to_string());
    }

    if let Some(m) = assessment_heading(text) {
        return (
            text[..m.start()].trim().to_string(),
            text[m.start()..].trim().to_string(),
        );
    }

    (text.trim().to_string(), String::new())
}

fn assessment_heading(text: &str) -> Option<regex::Match<'_>> {
    ASSESSMENT_PATTERN.as_ref()?.find(text)
}

/// All chapters as one document body, ordered by chapter number
pub fn report_text(chapters: &[ChapterResult]) -> String {
    let mut sorted: Vec<&ChapterResult> = chapters.iter().collect();
    sorted.sort_by_key(|c| c.number);
    sorted
        .iter()
        .map(|c| format!("## Chapter {}: {}\n{}", c.number, c.title, c.full_text()))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SEP: &str = "---SEPARATOR---";

    #[test]
    fn test_parse_with_separator() {
        let text = "Opening lines.\n---SEPARATOR---\n### Closing Assessment\nCompliant.";
        let (intro, assessment) = parse_synthesis(text, SEP);
        assert_eq!(intro, "Opening lines.");
        assert_eq!(assessment, "### Closing Assessment\nCompliant.");
    }

    #[test]
    fn test_parse_splits_on_first_separator_only() {
        let (intro, assessment) = parse_synthesis("a ---SEPARATOR--- b ---SEPARATOR--- c", SEP);
        assert_eq!(intro, "a");
        assert_eq!(assessment, "b ---SEPARATOR--- c");
    }

    #[test]
    fn test_parse_heading_fallback() {
        let (intro, assessment) =
            parse_synthesis("Intro paragraph.\n\n###  closing   ASSESSMENT\nNeeds attention.", SEP);
        assert_eq!(intro, "Intro paragraph.");
        assert!(assessment.starts_with("###  closing   ASSESSMENT"));
    }

    #[test]
    fn test_assessment_pattern_compiles_once() {
        assert!(ASSESSMENT_PATTERN.is_some());
        let first = assessment_heading("x ### Closing Assessment").map(|m| m.start());
        let second = assessment_heading("### closing assessment").map(|m| m.start());
        assert_eq!(first, Some(2));
        assert_eq!(second, Some(0));
    }

    #[test]
    fn test_parse_last_resort() {
        let (intro, assessment) = parse_synthesis("  just an introduction  ", SEP);
        assert_eq!(intro, "just an introduction");
        assert!(assessment.is_empty());
    }

    #[test]
    fn test_full_text_skips_empty_parts() {
        let mut chapter = ChapterResult::new(2, "Volumes");
        chapter.sections.context = "Background text".into();
        chapter.sections.data = "Data text".into();
        chapter.apply_synthesis("Intro ---SEPARATOR--- Verdict", SEP);

        assert_eq!(
            chapter.full_text(),
            "Intro\n\n### Background\nBackground text\n\n### Data Analysis\nData text\n\n### Closing Assessment\nVerdict"
        );
    }

    #[test]
    fn test_full_text_keeps_existing_heading() {
        let mut chapter = ChapterResult::new(1, "Overview");
        chapter.apply_synthesis("Intro\n### Closing Assessment\nCompliant.", SEP);

        let text = chapter.full_text();
        assert_eq!(text.matches("### Closing Assessment").count(), 1);
        assert!(text.ends_with("### Closing Assessment\nCompliant."));
    }

    #[test]
    fn test_report_text_orders_by_number() {
        let chapters = vec![ChapterResult::new(2, "Second"), ChapterResult::new(1, "First")];
        let text = report_text(&chapters);
        let first = text.find("Chapter 1: First").unwrap();
        let second = text.find("Chapter 2: Second").unwrap();
        assert!(first < second);
    }

    proptest! {
        #[test]
        fn prop_separator_split_preserves_both_halves(
            intro in "[a-zA-Z0-9 .,]{0,80}",
            assessment in "[a-zA-Z0-9 .,]{0,80}",
        ) {
            let text = format!("{}{}{}", intro, SEP, assessment);
            let (i, a) = parse_synthesis(&text, SEP);
            prop_assert_eq!(i, intro.trim());
            prop_assert_eq!(a, assessment.trim());
        }

        #[test]
        fn prop_parse_never_loses_text_without_markers(text in "[a-z ]{0,120}") {
            let (i, a) = parse_synthesis(&text, SEP);
            prop_assert_eq!(i, text.trim());
            prop_assert!(a.is_empty());
        }
    }
}
