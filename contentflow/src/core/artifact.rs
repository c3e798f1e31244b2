//! The assembled article and its persisted form.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::job::JobId;
use super::report::QualityReport;
use crate::utils::Timestamp;

/// Heading level of an article section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeadingLevel {
    /// Title and introduction.
    H1,
    /// Top-level section.
    H2,
    /// Subsection of the preceding H2.
    H3,
}

impl fmt::Display for HeadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H1 => write!(f, "H1"),
            Self::H2 => write!(f, "H2"),
            Self::H3 => write!(f, "H3"),
        }
    }
}

/// One heading and its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSection {
    /// Heading level.
    pub heading_level: HeadingLevel,
    /// Heading text.
    pub heading_text: String,
    /// Body text.
    pub content: String,
    /// Words in `content`.
    pub word_count: usize,
}

/// Search metadata for the article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoMetadata {
    /// `<title>` text, 50-60 characters once normalized.
    pub title_tag: String,
    /// Meta description, 150-160 characters once normalized.
    pub meta_description: String,
    /// Primary keyword.
    pub primary_keyword: String,
    /// Secondary keywords.
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
}

/// A suggested link to another page on the same site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLink {
    /// Anchor text.
    pub anchor_text: String,
    /// Topic of the page to link to.
    pub suggested_target_topic: String,
    /// Heading of the section that should carry the link.
    pub placement_section: String,
}

/// A citation of an outside source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    /// Source URL.
    pub url: String,
    /// Publisher name.
    pub publisher: String,
    /// What the citation supports.
    pub context_for_citation: String,
    /// Heading of the section that should carry the citation.
    pub placement_section: String,
}

/// A question and answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqItem {
    /// Question.
    pub question: String,
    /// Answer.
    pub answer: String,
}

/// The assembled output of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Owning job.
    pub job_id: JobId,
    /// Topic the article covers.
    pub topic: String,
    /// Ordered sections, H1 first.
    pub sections: Vec<ArticleSection>,
    /// Search metadata.
    pub seo_metadata: SeoMetadata,
    /// Internal link suggestions.
    #[serde(default)]
    pub internal_links: Vec<InternalLink>,
    /// External citations.
    #[serde(default)]
    pub external_references: Vec<ExternalReference>,
    /// FAQ block.
    #[serde(default)]
    pub faq: Vec<FaqItem>,
    /// Sum of section word counts.
    pub total_word_count: usize,
    /// Steps whose output came from a local substitute.
    #[serde(default)]
    pub degraded_steps: Vec<String>,
    /// How many drafting revisions produced this artifact.
    #[serde(default)]
    pub revision: u32,
    /// Quality report, attached once scored.
    #[serde(default)]
    pub quality: Option<QualityReport>,
}

impl Artifact {
    /// Returns true if any input came from a local substitute.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.degraded_steps.is_empty()
    }

    /// Returns the article body as one string, sections in order.
    #[must_use]
    pub fn body_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Returns a copy with the report attached.
    #[must_use]
    pub fn with_quality(mut self, report: QualityReport) -> Self {
        self.quality = Some(report);
        self
    }
}

/// The persisted final artifact row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Owning job.
    pub job_id: JobId,
    /// Accepted artifact, with its report attached.
    pub artifact: Artifact,
    /// Number of revision cycles run before acceptance.
    pub revision_count: u32,
    /// When the record was written.
    pub stored_at: Timestamp,
}
