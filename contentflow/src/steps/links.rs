//! `build-links`: internal link suggestions and external citations.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::context::{StepContext, StepOutput};
use super::types::{DraftedArticle, LinkStrategy, SearchContext, ThemeReport};
use super::{
    json_chain, title_case, Step, BUILD_LINKS, DRAFT_SECTIONS, EXTRACT_THEMES, FETCH_CONTEXT,
};
use crate::core::{ArticleSection, ExternalReference, HeadingLevel, InternalLink};
use crate::errors::StepError;
use crate::providers::{CompletionRequest, LanguageModel};
use crate::resilience::FallbackPolicy;

/// Most internal links kept.
pub const MAX_INTERNAL_LINKS: usize = 5;
/// Most external references kept.
pub const MAX_EXTERNAL_REFERENCES: usize = 4;

const MIN_EXTERNAL_REFERENCES: usize = 2;

const PUBLISHER_DOMAINS: [(&str, &str); 10] = [
    ("harvard business review", "https://hbr.org"),
    ("forbes", "https://www.forbes.com"),
    ("gartner", "https://www.gartner.com"),
    ("mckinsey", "https://www.mckinsey.com"),
    ("mit sloan", "https://mitsloan.mit.edu"),
    ("stanford", "https://www.stanford.edu"),
    ("hubspot", "https://blog.hubspot.com"),
    ("atlassian", "https://www.atlassian.com"),
    ("microsoft", "https://www.microsoft.com"),
    ("google", "https://blog.google"),
];

const DEFAULT_CITATION_CONTEXT: &str = "Use as supporting external source.";

const SYSTEM_PROMPT: &str = "You are an SEO link strategist. Identify relevant internal and \
external linking opportunities. Return valid JSON matching the specified schema.";

/// An external reference as a model proposes it.
#[derive(Debug, Clone, Default, Deserialize)]
struct ReferenceSuggestion {
    #[serde(default)]
    url: String,
    #[serde(default)]
    publisher: String,
    #[serde(default)]
    context_for_citation: String,
    #[serde(default)]
    placement_section: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LinkReply {
    #[serde(default)]
    internal_links: Vec<InternalLink>,
    #[serde(default)]
    external_references: Vec<ReferenceSuggestion>,
}

/// Resolves a citation URL: a direct URL wins, otherwise the publisher's
/// home page when the publisher is known.
#[must_use]
pub fn resolve_publisher_url(url: &str, publisher: &str) -> Option<String> {
    let url = url.trim();
    if !url.is_empty() {
        return Some(url.to_string());
    }
    let publisher = publisher.trim().to_lowercase();
    PUBLISHER_DOMAINS
        .iter()
        .find(|(name, _)| publisher.contains(name))
        .map(|(_, domain)| (*domain).to_string())
}

/// Finds the heading a placement refers to, case-insensitively and by
/// partial match in either direction.
fn match_heading<'a>(placement: &str, sections: &'a [ArticleSection]) -> Option<&'a str> {
    let placement = placement.trim().to_lowercase();
    if placement.is_empty() {
        return None;
    }
    sections
        .iter()
        .map(|s| s.heading_text.as_str())
        .find(|heading| {
            let heading = heading.to_lowercase();
            heading.contains(&placement) || placement.contains(&heading)
        })
}

fn first_h2(sections: &[ArticleSection]) -> Option<&str> {
    sections
        .iter()
        .find(|s| s.heading_level == HeadingLevel::H2)
        .or_else(|| sections.first())
        .map(|s| s.heading_text.as_str())
}

fn to_reference(suggestion: &ReferenceSuggestion, url: String, placement: &str) -> ExternalReference {
    let non_empty = |text: &str, default: &str| {
        if text.trim().is_empty() {
            default.to_string()
        } else {
            text.trim().to_string()
        }
    };
    ExternalReference {
        url,
        publisher: non_empty(&suggestion.publisher, "Unknown publisher"),
        context_for_citation: non_empty(&suggestion.context_for_citation, DEFAULT_CITATION_CONTEXT),
        placement_section: placement.to_string(),
    }
}

/// Keeps references with a resolvable URL and a real placement. When
/// fewer than two survive, references with a bad placement are moved to
/// the first H2.
fn validate_references(
    suggestions: &[ReferenceSuggestion],
    sections: &[ArticleSection],
) -> Vec<ExternalReference> {
    let mut valid: Vec<ExternalReference> = Vec::new();
    for suggestion in suggestions {
        let url = resolve_publisher_url(&suggestion.url, &suggestion.publisher);
        let placement = match_heading(&suggestion.placement_section, sections);
        match (url, placement) {
            (Some(url), Some(heading)) => {
                if !valid.iter().any(|r| r.url == url) {
                    valid.push(to_reference(suggestion, url, heading));
                }
            }
            (url, placement) => warn!(
                publisher = %suggestion.publisher,
                placement = %suggestion.placement_section,
                url_resolved = url.is_some(),
                placement_found = placement.is_some(),
                "external reference skipped"
            ),
        }
    }

    if valid.len() < MIN_EXTERNAL_REFERENCES {
        for suggestion in suggestions {
            if valid.len() >= MAX_EXTERNAL_REFERENCES {
                break;
            }
            let Some(url) = resolve_publisher_url(&suggestion.url, &suggestion.publisher) else {
                continue;
            };
            if valid.iter().any(|r| r.url == url) {
                continue;
            }
            let Some(heading) = match_heading(&suggestion.placement_section, sections)
                .or_else(|| first_h2(sections))
            else {
                continue;
            };
            valid.push(to_reference(suggestion, url, heading));
        }
    }

    valid.truncate(MAX_EXTERNAL_REFERENCES);
    valid
}

/// Re-targets internal links at real headings.
fn validate_internal_links(links: Vec<InternalLink>, sections: &[ArticleSection]) -> Vec<InternalLink> {
    links
        .into_iter()
        .filter(|link| !link.anchor_text.trim().is_empty())
        .filter_map(|mut link| {
            let heading = match_heading(&link.placement_section, sections).or_else(|| first_h2(sections))?;
            link.placement_section = heading.to_string();
            Some(link)
        })
        .take(MAX_INTERNAL_LINKS)
        .collect()
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = rest.split('/').next().unwrap_or(rest);
    host.strip_prefix("www.").unwrap_or(host)
}

/// Links derived from headings, keywords and search results.
fn substitute_links(
    themes: &ThemeReport,
    article: &DraftedArticle,
    search: &SearchContext,
) -> LinkReply {
    let h2s: Vec<&str> = article
        .sections
        .iter()
        .filter(|s| s.heading_level == HeadingLevel::H2)
        .map(|s| s.heading_text.as_str())
        .collect();
    let placement = |i: usize| {
        if h2s.is_empty() {
            article
                .sections
                .first()
                .map(|s| s.heading_text.clone())
                .unwrap_or_default()
        } else {
            h2s[i % h2s.len()].to_string()
        }
    };

    let internal_links = themes
        .secondary_keywords
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, keyword)| InternalLink {
            anchor_text: keyword.clone(),
            suggested_target_topic: title_case(keyword),
            placement_section: placement(i),
        })
        .collect();

    let external_references = search
        .results
        .iter()
        .take(MIN_EXTERNAL_REFERENCES)
        .enumerate()
        .map(|(i, result)| ReferenceSuggestion {
            url: result.url.clone(),
            publisher: host_of(&result.url).to_string(),
            context_for_citation: result.title.clone(),
            placement_section: placement(i),
        })
        .collect();

    LinkReply {
        internal_links,
        external_references,
    }
}

/// Proposes links with a language model and validates them against the
/// drafted headings.
#[derive(Clone)]
pub struct BuildLinksStep {
    models: Vec<Arc<dyn LanguageModel>>,
    policy: FallbackPolicy,
}

impl std::fmt::Debug for BuildLinksStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildLinksStep")
            .field("models", &self.models.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl BuildLinksStep {
    /// Creates the step.
    pub fn new(models: Vec<Arc<dyn LanguageModel>>, policy: FallbackPolicy) -> Self {
        Self { models, policy }
    }

    fn request(topic: &str, themes: &ThemeReport, article: &DraftedArticle) -> CompletionRequest {
        let sections: String = article
            .sections
            .iter()
            .map(|s| {
                format!(
                    "{}: {}\n{}",
                    s.heading_level,
                    s.heading_text,
                    s.content.chars().take(200).collect::<String>()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
            .chars()
            .take(1000)
            .collect();
        let headings: Vec<String> = article.sections.iter().map(|s| s.heading_text.clone()).collect();
        let user_prompt = format!(
            "For an article about '{topic}', generate a link strategy.\n\n\
             Article sections:\n{sections}...\n\n\
             Primary keyword: {}\nSecondary keywords: {}\n\n\
             Return JSON: {{\"internal_links\": [{{\"anchor_text\": string, \
             \"suggested_target_topic\": string, \"placement_section\": string}}], \
             \"external_references\": [{{\"publisher\": string, \"context_for_citation\": \
             string, \"placement_section\": string}}]}}\n\n\
             Requirements:\n\
             - 3-5 internal links with natural anchor text\n\
             - 2-4 external references from authoritative publishers\n\
             - Do NOT invent article URLs; name the publisher only\n\
             - placement_section must be one of the section headings above",
            themes.primary_keyword,
            themes
                .secondary_keywords
                .iter()
                .take(5)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
        CompletionRequest::new(BUILD_LINKS, SYSTEM_PROMPT, user_prompt)
            .json()
            .with_hint("headings", headings)
            .with_hint("secondary_keywords", themes.secondary_keywords.clone())
    }
}

#[async_trait]
impl Step for BuildLinksStep {
    fn name(&self) -> &str {
        BUILD_LINKS
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let search: SearchContext = ctx.input(FETCH_CONTEXT)?;
        let themes: ThemeReport = ctx.input(EXTRACT_THEMES)?;
        let article: DraftedArticle = ctx.input(DRAFT_SECTIONS)?;
        let request = Self::request(&ctx.params().topic, &themes, &article);

        let chain = json_chain::<LinkReply>(&self.models, &request)
            .substitute("derived-links", || substitute_links(&themes, &article, &search));
        let outcome = ctx.policy(&self.policy).execute(chain).await?;

        let proposed = outcome.value.external_references.len();
        let strategy = LinkStrategy {
            external_references: validate_references(
                &outcome.value.external_references,
                &article.sections,
            ),
            internal_links: validate_internal_links(outcome.value.internal_links, &article.sections),
        };

        info!(
            job_id = %ctx.job_id(),
            provider = %outcome.provider,
            internal = strategy.internal_links.len(),
            external = strategy.external_references.len(),
            proposed_external = proposed,
            "links built"
        );
        Ok(StepOutput::from_value(&strategy)?
            .with_degraded(outcome.degraded)
            .with_provider(outcome.provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobId, JobParams};
    use crate::providers::fixture_search_results;
    use crate::steps::SearchIntent;
    use crate::testing::FixtureLanguageModel;
    use pretty_assertions::assert_eq;

    fn section(level: HeadingLevel, heading: &str) -> ArticleSection {
        ArticleSection {
            heading_level: level,
            heading_text: heading.to_string(),
            content: "Body text.".to_string(),
            word_count: 2,
        }
    }

    fn sections() -> Vec<ArticleSection> {
        vec![
            section(HeadingLevel::H1, "Remote Work Tools"),
            section(HeadingLevel::H2, "Video Conferencing for Teams"),
            section(HeadingLevel::H2, "Pricing and Plans"),
        ]
    }

    fn suggestion(url: &str, publisher: &str, placement: &str) -> ReferenceSuggestion {
        ReferenceSuggestion {
            url: url.to_string(),
            publisher: publisher.to_string(),
            context_for_citation: String::new(),
            placement_section: placement.to_string(),
        }
    }

    #[test]
    fn test_resolve_publisher_url() {
        assert_eq!(
            resolve_publisher_url("", "Harvard Business Review").as_deref(),
            Some("https://hbr.org")
        );
        assert_eq!(
            resolve_publisher_url("https://example.org/report", "Gartner").as_deref(),
            Some("https://example.org/report")
        );
        assert_eq!(resolve_publisher_url("", "Some Blog"), None);
    }

    #[test]
    fn test_placement_matches_partially() {
        let sections = sections();
        assert_eq!(match_heading("video conferencing", &sections), Some("Video Conferencing for Teams"));
        assert_eq!(match_heading("Pricing and Plans in 2026", &sections), Some("Pricing and Plans"));
        assert_eq!(match_heading("Security", &sections), None);
    }

    #[test]
    fn test_unresolvable_and_misplaced_references() {
        let refs = validate_references(
            &[
                suggestion("", "Forbes", "pricing"),
                suggestion("", "Unknown Blog", "pricing"),
                suggestion("", "McKinsey", "Security"),
            ],
            &sections(),
        );
        let placed: Vec<(&str, &str)> = refs
            .iter()
            .map(|r| (r.url.as_str(), r.placement_section.as_str()))
            .collect();
        assert_eq!(
            placed,
            vec![
                ("https://www.forbes.com", "Pricing and Plans"),
                ("https://www.mckinsey.com", "Video Conferencing for Teams"),
            ]
        );
        assert_eq!(refs[0].context_for_citation, DEFAULT_CITATION_CONTEXT);
    }

    #[test]
    fn test_enough_valid_references_skip_second_pass() {
        let refs = validate_references(
            &[
                suggestion("", "Forbes", "pricing"),
                suggestion("", "Gartner", "video"),
                suggestion("", "McKinsey", "Security"),
            ],
            &sections(),
        );
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://www.forbes.com/remote"), "forbes.com");
        assert_eq!(host_of("hbr.org"), "hbr.org");
    }

    fn ctx() -> StepContext {
        let search = SearchContext {
            query: "remote work tools".to_string(),
            results: fixture_search_results("remote work tools", 10),
        };
        let themes = ThemeReport {
            primary_keyword: "remote work tools".to_string(),
            secondary_keywords: vec![
                "video conferencing".to_string(),
                "pricing".to_string(),
                "async communication".to_string(),
            ],
            main_subtopics: Vec::new(),
            search_intent: SearchIntent::Informational,
            content_gaps: Vec::new(),
            unique_angles: Vec::new(),
        };
        let article = DraftedArticle { sections: sections() };
        StepContext::new(JobId::from("j"), JobParams::new("remote work tools"), BUILD_LINKS)
            .with_output(FETCH_CONTEXT, StepOutput::from_value(&search).unwrap())
            .with_output(EXTRACT_THEMES, StepOutput::from_value(&themes).unwrap())
            .with_output(DRAFT_SECTIONS, StepOutput::from_value(&article).unwrap())
    }

    #[tokio::test]
    async fn test_model_links_validated() {
        let model: Arc<dyn LanguageModel> = Arc::new(FixtureLanguageModel::new());
        let step = BuildLinksStep::new(vec![model], FallbackPolicy::new(BUILD_LINKS));

        let output = step.execute(&ctx()).await.unwrap();
        let strategy: LinkStrategy = output.decode(BUILD_LINKS).unwrap();
        let headings: Vec<String> = sections().into_iter().map(|s| s.heading_text).collect();

        assert!((3..=5).contains(&strategy.internal_links.len()));
        assert!((2..=4).contains(&strategy.external_references.len()));
        assert!(strategy
            .external_references
            .iter()
            .all(|r| headings.contains(&r.placement_section)));
    }

    #[tokio::test]
    async fn test_no_models_derives_links() {
        let step = BuildLinksStep::new(Vec::new(), FallbackPolicy::new(BUILD_LINKS));
        let output = step.execute(&ctx()).await.unwrap();
        let strategy: LinkStrategy = output.decode(BUILD_LINKS).unwrap();

        assert!(output.degraded);
        assert_eq!(strategy.internal_links.len(), 3);
        assert_eq!(strategy.internal_links[1].placement_section, "Pricing and Plans");
        assert_eq!(strategy.external_references.len(), 2);
        assert_eq!(strategy.external_references[0].publisher, "example.com");
    }
}
