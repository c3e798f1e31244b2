//! Building an [`Artifact`] from the outputs of every step.

use std::collections::BTreeMap;

use crate::core::{Artifact, ArticleSection, ExternalReference, JobId, JobParams, SeoMetadata};
use crate::errors::StepError;
use crate::quality::word_count;
use crate::steps::{
    DraftedArticle, FaqSet, LinkStrategy, StepOutput, BUILD_FAQ, BUILD_LINKS, BUILD_METADATA,
    DRAFT_SECTIONS,
};

fn decode<T: serde::de::DeserializeOwned>(
    outputs: &BTreeMap<String, StepOutput>,
    step: &str,
) -> Result<T, StepError> {
    outputs
        .get(step)
        .ok_or_else(|| StepError::MissingInput {
            step: "assemble".to_string(),
            input: step.to_string(),
        })?
        .decode(step)
}

fn placement_matches(placement: &str, heading: &str) -> bool {
    let placement = placement.to_lowercase();
    let heading = heading.to_lowercase();
    placement.contains(&heading) || heading.contains(&placement)
}

/// Appends one `Source:` line per reference to the section it is placed
/// in and recounts that section's words.
///
/// References without a matching heading are skipped, as are references
/// whose URL the section already contains.
pub fn inject_citations(sections: &mut [ArticleSection], references: &[ExternalReference]) {
    for reference in references {
        let Some(section) = sections
            .iter_mut()
            .find(|s| placement_matches(&reference.placement_section, &s.heading_text))
        else {
            continue;
        };
        if section.content.contains(&reference.url) {
            continue;
        }

        let trimmed = section.content.trim_end().len();
        section.content.truncate(trimmed);
        section.content.push_str(&format!(
            "\n\nSource: {}, {} ({})",
            reference.publisher, reference.context_for_citation, reference.url
        ));
        section.word_count = word_count(&section.content);
    }
}

/// Assembles the artifact for `job_id` from step outputs keyed by step
/// name.
///
/// `revision` is 0 for the first draft. Steps whose output is degraded are
/// listed on the artifact.
pub fn assemble(
    job_id: &JobId,
    params: &JobParams,
    outputs: &BTreeMap<String, StepOutput>,
    revision: u32,
) -> Result<Artifact, StepError> {
    let mut sections = decode::<DraftedArticle>(outputs, DRAFT_SECTIONS)?.sections;
    let seo_metadata: SeoMetadata = decode(outputs, BUILD_METADATA)?;
    let links: LinkStrategy = decode(outputs, BUILD_LINKS)?;
    let faq: FaqSet = decode(outputs, BUILD_FAQ)?;

    inject_citations(&mut sections, &links.external_references);
    let total_word_count = sections.iter().map(|s| s.word_count).sum();

    let degraded_steps = outputs
        .iter()
        .filter(|(_, output)| output.degraded)
        .map(|(name, _)| name.clone())
        .collect();

    Ok(Artifact {
        job_id: job_id.clone(),
        topic: params.topic.clone(),
        sections,
        seo_metadata,
        internal_links: links.internal_links,
        external_references: links.external_references,
        faq: faq.items,
        total_word_count,
        degraded_steps,
        revision,
        quality: None,
    })
}
