//! `build-faq`: questions searchers actually ask, with short answers.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::context::{StepContext, StepOutput};
use super::types::{DraftedArticle, FaqSet, SearchContext};
use super::{json_chain, Step, BUILD_FAQ, DRAFT_SECTIONS, FETCH_CONTEXT};
use crate::core::FaqItem;
use crate::errors::StepError;
use crate::providers::{CompletionRequest, LanguageModel};
use crate::resilience::FallbackPolicy;

/// Most FAQ items kept.
pub const MAX_FAQ_ITEMS: usize = 7;

const GENERIC_STARTS: [&str; 3] = ["why are", "what are", "how do i choose"];
const WEAK_PHRASES: [&str; 3] = ["important", "benefits", "what is"];
const SPECIFICITY_TOKENS: [&str; 6] = ["for ", "vs", "under", "cost", "price", "best "];
const QUESTION_WORDS: [&str; 8] = ["what", "how", "why", "when", "where", "which", "who", "?"];

const SYSTEM_PROMPT: &str = "You are an SEO content strategist. Generate FAQ questions and \
answers based on search results and article content. Return valid JSON matching the specified \
schema. Create questions that people actually search for.";

/// Models answer either `{"faq_items": [...]}` or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FaqReply {
    Wrapped { faq_items: Vec<FaqItem> },
    Bare(Vec<FaqItem>),
}

impl FaqReply {
    fn into_items(self) -> Vec<FaqItem> {
        match self {
            Self::Wrapped { faq_items } => faq_items,
            Self::Bare(items) => items,
        }
    }
}

/// Returns true for broad questions with weak search intent, such as
/// "Why are productivity tools important?".
#[must_use]
pub fn is_generic_question(question: &str) -> bool {
    let q = question.trim().to_lowercase();
    if GENERIC_STARTS.iter().any(|prefix| q.starts_with(prefix)) && q.split_whitespace().count() <= 10 {
        return true;
    }
    WEAK_PHRASES.iter().any(|phrase| q.contains(phrase))
        && !q.chars().any(|c| c.is_ascii_digit())
        && !SPECIFICITY_TOKENS.iter().any(|token| q.contains(token))
}

/// Question-like titles from the search results.
fn candidate_questions(search: &SearchContext) -> Vec<String> {
    let mut questions = Vec::new();
    for result in search.results.iter().take(10) {
        let title = result.title.to_lowercase();
        if QUESTION_WORDS.iter().any(|word| title.contains(word)) {
            questions.push(result.title.clone());
        }
        questions.extend(
            result
                .snippet
                .split_inclusive(['.', '?', '!'])
                .map(str::trim)
                .filter(|sentence| sentence.ends_with('?'))
                .map(ToString::to_string),
        );
    }
    questions
}

fn substitute_faq(topic: &str, search: &SearchContext) -> Vec<FaqItem> {
    let topic = topic.trim().to_lowercase();
    let mut items: Vec<FaqItem> = candidate_questions(search)
        .into_iter()
        .filter(|q| q.ends_with('?'))
        .map(|question| FaqItem {
            question,
            answer: format!(
                "It depends on team size and budget. Shortlist two or three {topic} options, \
                 run a two-week trial and compare adoption before committing."
            ),
        })
        .collect();

    items.extend([
        FaqItem {
            question: format!("How much do {topic} cost for a team of 10?"),
            answer: format!(
                "Most paid {topic} plans are billed per user per month, so a team of 10 should \
                 budget for the per-seat price times 10 plus any add-ons. Annual billing \
                 usually lowers the total."
            ),
        },
        FaqItem {
            question: format!("Which {topic} work best for teams under 20 people?"),
            answer: "Small teams do best with tools that need little administration and offer \
                     a generous free tier. Favour fewer tools that integrate well over many \
                     point solutions."
                .to_string(),
        },
        FaqItem {
            question: format!("Is a free plan of {topic} enough for a small business?"),
            answer: "A free plan covers basic use for a handful of people. Limits on history, \
                     storage or integrations are the usual reasons to upgrade."
                .to_string(),
        },
        FaqItem {
            question: format!("How long does it take to roll out new {topic} across 50 people?"),
            answer: "Plan for two to six weeks: a pilot group first, then training and a \
                     staged migration. Measure adoption after the first month."
                .to_string(),
        },
        FaqItem {
            question: format!("Should you pick all-in-one {topic} vs specialised apps?"),
            answer: "All-in-one suites reduce switching and cost less to administer. \
                     Specialised apps win when one workflow matters much more than the rest."
                .to_string(),
        },
    ]);
    items.truncate(MAX_FAQ_ITEMS);
    items
}

/// Generates an FAQ with a language model and drops generic questions.
#[derive(Clone)]
pub struct BuildFaqStep {
    models: Vec<Arc<dyn LanguageModel>>,
    policy: FallbackPolicy,
}

impl std::fmt::Debug for BuildFaqStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildFaqStep")
            .field("models", &self.models.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl BuildFaqStep {
    /// Creates the step.
    pub fn new(models: Vec<Arc<dyn LanguageModel>>, policy: FallbackPolicy) -> Self {
        Self { models, policy }
    }

    fn request(topic: &str, search: &SearchContext, article: &DraftedArticle) -> CompletionRequest {
        let results = search
            .results
            .iter()
            .take(10)
            .map(|r| {
                format!(
                    "Rank {}: {} - {}",
                    r.rank,
                    r.title,
                    r.snippet.chars().take(100).collect::<String>()
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let headings = article
            .sections
            .iter()
            .take(5)
            .map(|s| s.heading_text.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut user_prompt = format!(
            "Based on these search results for '{topic}':\n\n{results}\n\n\
             And the article sections covering: {headings}\n\n\
             Generate 5-7 FAQ questions with concise answers (2-3 sentences each). Reject \
             generic questions with weak search intent such as \"Why are productivity tools \
             important?\". Prefer specific questions with tool names, team size, pricing or \
             clear use-case constraints, such as \"Is Notion or Asana better for remote teams \
             under 10 people?\".\n\n\
             Return JSON: {{\"faq_items\": [{{\"question\": string, \"answer\": string}}]}}"
        );
        let candidates = candidate_questions(search);
        if !candidates.is_empty() {
            user_prompt.push_str("\n\nQuestions already seen in results:\n- ");
            user_prompt.push_str(&candidates.join("\n- "));
        }
        CompletionRequest::new(BUILD_FAQ, SYSTEM_PROMPT, user_prompt)
            .json()
            .with_hint("topic", topic)
    }
}

#[async_trait]
impl Step for BuildFaqStep {
    fn name(&self) -> &str {
        BUILD_FAQ
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let search: SearchContext = ctx.input(FETCH_CONTEXT)?;
        let article: DraftedArticle = ctx.input(DRAFT_SECTIONS)?;
        let topic = ctx.params().topic.as_str();
        let request = Self::request(topic, &search, &article);

        let chain = json_chain::<FaqReply>(&self.models, &request)
            .substitute("derived-faq", || FaqReply::Bare(substitute_faq(topic, &search)));
        let outcome = ctx.policy(&self.policy).execute(chain).await?;

        let proposed = outcome.value.clone().into_items();
        let total = proposed.len();
        let items: Vec<FaqItem> = proposed
            .into_iter()
            .filter(|item| !item.question.trim().is_empty() && !item.answer.trim().is_empty())
            .filter(|item| {
                let generic = is_generic_question(&item.question);
                if generic {
                    debug!(question = %item.question, "generic faq question dropped");
                }
                !generic
            })
            .take(MAX_FAQ_ITEMS)
            .collect();

        info!(
            job_id = %ctx.job_id(),
            provider = %outcome.provider,
            proposed = total,
            kept = items.len(),
            "faq built"
        );
        Ok(StepOutput::from_value(&FaqSet { items })?
            .with_degraded(outcome.degraded)
            .with_provider(outcome.provider))
    }
}
