//! Ready-made artifacts and text for tests and benches.

use crate::core::{
    Artifact, ArticleSection, ExternalReference, FaqItem, HeadingLevel, InternalLink, JobId,
    SeoMetadata,
};
use crate::quality::word_count;

/// Topic of [`sample_artifact`].
pub const SAMPLE_TOPIC: &str = "remote work tools";

const FILLER: [&str; 12] = [
    "teams", "measure", "outcomes", "before", "adopting", "new", "software", "and", "review",
    "adoption", "every", "quarter",
];

/// Returns exactly `n` neutral words that match no keyword or tracked phrase.
#[must_use]
pub fn filler_words(n: usize) -> String {
    FILLER.iter().cycle().take(n).copied().collect::<Vec<_>>().join(" ")
}

/// Returns `lead` padded with filler to exactly `words` words.
#[must_use]
pub fn padded(lead: &str, words: usize) -> String {
    let lead_words = word_count(lead);
    if lead_words >= words {
        return lead.to_string();
    }
    format!("{lead} {}.", filler_words(words - lead_words))
}

fn section(level: HeadingLevel, heading: &str, content: String) -> ArticleSection {
    ArticleSection {
        heading_level: level,
        heading_text: heading.to_string(),
        word_count: word_count(&content),
        content,
    }
}

/// An artifact that passes every quality check for `target_word_count`.
#[must_use]
pub fn sample_artifact(job_id: JobId, target_word_count: u32) -> Artifact {
    let target = target_word_count as usize;
    let body = target.saturating_sub(200);
    let per = body / 5;
    let last = body - per * 4;

    let sections = vec![
        section(
            HeadingLevel::H1,
            "Remote Work Tools: A Practical Guide",
            padded("Remote work tools shape how distributed teams collaborate.", 200),
        ),
        section(
            HeadingLevel::H2,
            "Video Conferencing for Distributed Teams",
            padded("Video conferencing keeps meetings personal.", per),
        ),
        section(
            HeadingLevel::H3,
            "Recording and Transcripts",
            padded("Recorded calls help people who work across time zones.", per),
        ),
        section(
            HeadingLevel::H2,
            "Project Management Software",
            padded("Project management software tracks shared work.", per),
        ),
        section(
            HeadingLevel::H2,
            "Async Communication Habits",
            padded("Async communication reduces meeting load.", per),
        ),
        section(
            HeadingLevel::H2,
            "Security for Remote Teams",
            padded("Security training protects shared documents.", last),
        ),
    ];
    let total_word_count = sections.iter().map(|s| s.word_count).sum();

    Artifact {
        job_id,
        topic: SAMPLE_TOPIC.to_string(),
        sections,
        seo_metadata: SeoMetadata {
            title_tag: "Remote Work Tools: A Practical Guide for Distributed Teams".to_string(),
            meta_description: "Remote work tools compared: video conferencing, project management \
                               software and async communication habits that keep distributed \
                               teams productive every week."
                .to_string(),
            primary_keyword: SAMPLE_TOPIC.to_string(),
            secondary_keywords: vec![
                "video conferencing".to_string(),
                "project management software".to_string(),
                "async communication".to_string(),
            ],
        },
        internal_links: vec![
            InternalLink {
                anchor_text: "meeting etiquette".to_string(),
                suggested_target_topic: "remote meeting etiquette".to_string(),
                placement_section: "Video Conferencing for Distributed Teams".to_string(),
            },
            InternalLink {
                anchor_text: "sprint planning".to_string(),
                suggested_target_topic: "sprint planning for remote teams".to_string(),
                placement_section: "Project Management Software".to_string(),
            },
            InternalLink {
                anchor_text: "password managers".to_string(),
                suggested_target_topic: "password managers for teams".to_string(),
                placement_section: "Security for Remote Teams".to_string(),
            },
        ],
        external_references: vec![
            ExternalReference {
                url: "https://hbr.org/remote-work".to_string(),
                publisher: "Harvard Business Review".to_string(),
                context_for_citation: "remote productivity research".to_string(),
                placement_section: "Async Communication Habits".to_string(),
            },
            ExternalReference {
                url: "https://www.nist.gov/remote-security".to_string(),
                publisher: "NIST".to_string(),
                context_for_citation: "telework security guidance".to_string(),
                placement_section: "Security for Remote Teams".to_string(),
            },
        ],
        faq: vec![FaqItem {
            question: "Which remote work tools cost under $10 per user?".to_string(),
            answer: "Several chat and video tools have free or low-cost tiers.".to_string(),
        }],
        total_word_count,
        degraded_steps: Vec::new(),
        revision: 0,
        quality: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_hits_exact_count() {
        assert_eq!(word_count(&padded("Two words", 50)), 50);
        assert_eq!(word_count(&padded("already long enough", 2)), 3);
    }

    #[test]
    fn test_sample_artifact_matches_target() {
        let artifact = sample_artifact(JobId::from("j"), 1500);
        assert_eq!(artifact.total_word_count, 1500);
        assert_eq!(word_count(&artifact.body_text()), 1500);
    }
}
