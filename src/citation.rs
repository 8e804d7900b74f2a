//! Chapter/section provenance for answers.
//!
//! Purely structural: the extractor looks for markers such as `第3章「市場動向」`,
//! `第五節`, `Chapter 4` or `Section 2.1`. False negatives are expected and
//! surface as [`Citation::Unknown`].

use std::fmt;

use regex::Regex;
use serde::Serialize;

const NUMERAL: &str = r"[0-9０-９〇零一二三四五六七八九十百千]+";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceRef {
    pub chapter: Option<String>,
    pub section: Option<String>,
}

/// Outcome of citation extraction. `Unknown` is a valid result, not an error,
/// and is kept apart from a found reference so callers can say "source unclear".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Citation {
    Found(ProvenanceRef),
    Unknown,
}

impl Citation {
    pub fn is_found(&self) -> bool {
        matches!(self, Citation::Found(_))
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Citation::Found(reference) => {
                let parts: Vec<&str> = [reference.chapter.as_deref(), reference.section.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect();
                write!(f, "{}", parts.join(" "))
            }
            Citation::Unknown => write!(f, "source unclear"),
        }
    }
}

pub struct CitationExtractor {
    chapter: Regex,
    section: Regex,
}

impl Default for CitationExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CitationExtractor {
    pub fn new() -> Self {
        let chapter = format!(r"第{NUMERAL}章(?:[「『][^」』\n]*[」』])?|(?i:chapter)\s+[0-9]+");
        let section = format!(r"第{NUMERAL}節|(?i:section)\s+[0-9]+(?:\.[0-9]+)*");

        Self {
            chapter: Regex::new(&chapter).expect("chapter pattern is valid"),
            section: Regex::new(&section).expect("section pattern is valid"),
        }
    }

    /// Each marker kind is looked up in the answer first, then in the document.
    /// A lone chapter or lone section still counts as a citation.
    pub fn extract(&self, document: &str, answer: &str) -> Citation {
        let chapter =
            first_match(&self.chapter, answer).or_else(|| first_match(&self.chapter, document));
        let section =
            first_match(&self.section, answer).or_else(|| first_match(&self.section, document));

        if chapter.is_none() && section.is_none() {
            return Citation::Unknown;
        }
        Citation::Found(ProvenanceRef { chapter, section })
    }
}

fn first_match(pattern: &Regex, text: &str) -> Option<String> {
    pattern.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_section_joins_document_chapter() {
        let extractor = CitationExtractor::new();
        let document = "序文\n第3章「市場動向」\n本章では需要を扱う。第2節 価格";
        let answer = "需要は価格に左右されます（第5節）。";

        let citation = extractor.extract(document, answer);

        assert_eq!(
            citation,
            Citation::Found(ProvenanceRef {
                chapter: Some("第3章「市場動向」".to_string()),
                section: Some("第5節".to_string()),
            })
        );
        assert_eq!(citation.to_string(), "第3章「市場動向」 第5節");
    }

    #[test]
    fn answer_chapter_wins_over_document_chapter() {
        let extractor = CitationExtractor::new();
        let citation = extractor.extract("第1章 総論", "詳しくは第十二章を参照");

        assert_eq!(
            citation,
            Citation::Found(ProvenanceRef {
                chapter: Some("第十二章".to_string()),
                section: None,
            })
        );
    }

    #[test]
    fn partial_reference_from_document_only() {
        let extractor = CitationExtractor::new();
        let citation = extractor.extract("Intro\nSection 2.1 Pricing", "Prices rise.");

        assert_eq!(
            citation,
            Citation::Found(ProvenanceRef {
                chapter: None,
                section: Some("Section 2.1".to_string()),
            })
        );
        assert_eq!(citation.to_string(), "Section 2.1");
    }

    #[test]
    fn english_chapters_are_case_insensitive() {
        let extractor = CitationExtractor::new();
        let citation = extractor.extract("", "As CHAPTER 4 explains");
        assert!(citation.is_found());
        assert_eq!(citation.to_string(), "CHAPTER 4");
    }

    #[test]
    fn no_markers_is_unknown_not_empty() {
        let extractor = CitationExtractor::new();
        let citation = extractor.extract("plain text without structure", "an answer");

        assert_eq!(citation, Citation::Unknown);
        assert!(!citation.is_found());
        assert_eq!(citation.to_string(), "source unclear");
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(Citation::Unknown).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "unknown" }));

        let json = serde_json::to_value(Citation::Found(ProvenanceRef {
            chapter: Some("第1章".to_string()),
            section: None,
        }))
        .unwrap();
        assert_eq!(json["status"], "found");
        assert_eq!(json["chapter"], "第1章");
    }
}
