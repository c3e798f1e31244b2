//! Payload types exchanged between steps.

use serde::{Deserialize, Serialize};

use crate::core::{ArticleSection, ExternalReference, FaqItem, InternalLink};
use crate::providers::SearchResult;

/// Output of `fetch-context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchContext {
    /// The query that was searched.
    pub query: String,
    /// Organic results, best first.
    pub results: Vec<SearchResult>,
}

/// What searchers want from the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchIntent {
    /// Wants to learn.
    #[default]
    Informational,
    /// Comparing options before buying.
    Commercial,
    /// Ready to act.
    Transactional,
    /// Looking for a specific site.
    Navigational,
}

/// Output of `extract-themes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeReport {
    /// The main keyword.
    pub primary_keyword: String,
    /// Related search queries.
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    /// Recurring themes across results.
    #[serde(default)]
    pub main_subtopics: Vec<String>,
    /// Dominant intent.
    #[serde(default)]
    pub search_intent: SearchIntent,
    /// Topics the results miss.
    #[serde(default)]
    pub content_gaps: Vec<String>,
    /// Angles competitors rarely cover.
    #[serde(default)]
    pub unique_angles: Vec<String>,
}

/// One H2 block of an outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    /// H2 heading.
    pub h2: String,
    /// Words for the whole block, H3s included.
    pub word_budget: usize,
    /// H3 headings under this H2.
    #[serde(default)]
    pub h3s: Vec<String>,
}

/// Output of `build-outline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleOutline {
    /// Article title.
    pub h1: String,
    /// H2 blocks in order.
    pub sections: Vec<OutlineSection>,
}

impl ArticleOutline {
    /// Sum of the block budgets.
    #[must_use]
    pub fn total_budget(&self) -> usize {
        self.sections.iter().map(|s| s.word_budget).sum()
    }
}

/// Output of `draft-sections`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftedArticle {
    /// Drafted sections, H1 first.
    pub sections: Vec<ArticleSection>,
}

impl DraftedArticle {
    /// Sum of section word counts.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.sections.iter().map(|s| s.word_count).sum()
    }
}

/// Output of `build-links`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkStrategy {
    /// Internal link suggestions.
    pub internal_links: Vec<InternalLink>,
    /// External citations.
    pub external_references: Vec<ExternalReference>,
}

/// Output of `build-faq`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaqSet {
    /// Question and answer pairs.
    pub items: Vec<FaqItem>,
}
