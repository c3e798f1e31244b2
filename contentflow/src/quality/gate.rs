//! The scoring rubric.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::text::{count_phrase, first_words, keyword_present, word_count};
use crate::core::{Artifact, CheckKind, HeadingLevel, QualityCheck, QualityReport};

/// How scores of artifacts built from substituted inputs are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedPolicy {
    /// Score degraded artifacts like any other.
    #[default]
    Allow,
    /// Cap the total one point below the pass threshold, so a degraded
    /// artifact can only be accepted below threshold.
    CapBelowThreshold,
}

fn default_pass_threshold() -> u32 {
    70
}

fn default_max_revisions() -> u32 {
    2
}

fn default_length_tolerance() -> f64 {
    0.10
}

fn default_max_repetitions() -> f64 {
    1.5
}

fn default_min_keyword_coverage() -> f64 {
    0.60
}

fn default_tracked_phrases() -> Vec<String> {
    [
        "real-world applications",
        "expert insights",
        "ai strategies",
        "healthcare tools",
        "ai solutions",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Thresholds for scoring and revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum total for acceptance.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: u32,
    /// Maximum revision cycles per job.
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Allowed relative deviation from the target word count.
    #[serde(default = "default_length_tolerance")]
    pub length_tolerance: f64,
    /// Occurrences per 100 words above which a phrase counts as overused.
    #[serde(default = "default_max_repetitions")]
    pub max_repetitions_per_100_words: f64,
    /// Fraction of secondary keywords that must appear.
    #[serde(default = "default_min_keyword_coverage")]
    pub min_keyword_coverage: f64,
    /// Stock phrases checked for overuse alongside the secondary keywords.
    #[serde(default = "default_tracked_phrases")]
    pub tracked_phrases: Vec<String>,
    /// Treatment of degraded artifacts.
    #[serde(default)]
    pub degraded_policy: DegradedPolicy,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            max_revisions: default_max_revisions(),
            length_tolerance: default_length_tolerance(),
            max_repetitions_per_100_words: default_max_repetitions(),
            min_keyword_coverage: default_min_keyword_coverage(),
            tracked_phrases: default_tracked_phrases(),
            degraded_policy: DegradedPolicy::Allow,
        }
    }
}

impl QualityConfig {
    /// Sets the pass threshold.
    #[must_use]
    pub fn with_pass_threshold(mut self, threshold: u32) -> Self {
        self.pass_threshold = threshold;
        self
    }

    /// Sets the revision budget.
    #[must_use]
    pub fn with_max_revisions(mut self, revisions: u32) -> Self {
        self.max_revisions = revisions;
        self
    }

    /// Sets the degraded-input policy.
    #[must_use]
    pub fn with_degraded_policy(mut self, policy: DegradedPolicy) -> Self {
        self.degraded_policy = policy;
        self
    }
}

/// Scores artifacts against the rubric. Scoring is pure: the same
/// artifact and target always yield the same report.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Returns the config.
    #[must_use]
    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Scores `artifact` for a job targeting `target_word_count` words.
    #[must_use]
    pub fn score(&self, artifact: &Artifact, target_word_count: u32) -> QualityReport {
        let body = artifact.body_text().to_lowercase();
        let total_words = word_count(&body);

        let checks = vec![
            Self::keyword_in_h1(artifact),
            Self::keyword_in_intro(artifact),
            Self::length_check(
                CheckKind::TitleLength,
                artifact.seo_metadata.title_tag.chars().count(),
                50,
                60,
            ),
            Self::length_check(
                CheckKind::DescriptionLength,
                artifact.seo_metadata.meta_description.chars().count(),
                150,
                160,
            ),
            Self::heading_hierarchy(artifact),
            self.word_count_check(total_words, target_word_count),
            self.keyword_coverage(artifact, &body),
            Self::count_range(CheckKind::InternalLinks, artifact.internal_links.len(), 3, 5, 5),
            Self::count_range(
                CheckKind::ExternalReferences,
                artifact.external_references.len(),
                2,
                4,
                2,
            ),
            self.phrase_repetition(artifact, &body, total_words),
        ];

        let earned: u32 = checks.iter().map(|c| c.points).sum();
        let max = CheckKind::total_max_points();
        let mut total = ((f64::from(earned) * 100.0) / f64::from(max))
            .round()
            .clamp(0.0, 100.0) as u32;

        let degraded = artifact.is_degraded();
        if degraded && self.config.degraded_policy == DegradedPolicy::CapBelowThreshold {
            total = total.min(self.config.pass_threshold.saturating_sub(1));
        }

        debug!(
            job_id = %artifact.job_id,
            total,
            earned,
            degraded,
            "artifact scored"
        );

        QualityReport {
            total,
            checks,
            degraded_inputs: degraded,
            accepted_below_threshold: false,
        }
    }

    fn keyword_in_h1(artifact: &Artifact) -> QualityCheck {
        let keyword = artifact.seo_metadata.primary_keyword.to_lowercase();
        let h1 = artifact
            .sections
            .iter()
            .find(|s| s.heading_level == HeadingLevel::H1);
        match h1 {
            None => QualityCheck::fail(CheckKind::KeywordInH1, "no H1 found"),
            Some(s) if !keyword.is_empty() && s.heading_text.to_lowercase().contains(&keyword) => {
                QualityCheck::pass(CheckKind::KeywordInH1, "found")
            }
            Some(_) => QualityCheck::fail(CheckKind::KeywordInH1, "missing")
                .with_findings(vec![artifact.seo_metadata.primary_keyword.clone()]),
        }
    }

    fn keyword_in_intro(artifact: &Artifact) -> QualityCheck {
        let keyword = first_words(&artifact.seo_metadata.primary_keyword, usize::MAX);
        let intro = first_words(&artifact.body_text(), 100);
        if !keyword.is_empty() && intro.contains(&keyword) {
            QualityCheck::pass(CheckKind::KeywordInIntro, "found")
        } else {
            QualityCheck::fail(CheckKind::KeywordInIntro, "missing")
        }
    }

    fn length_check(kind: CheckKind, len: usize, min: usize, max: usize) -> QualityCheck {
        let detail = format!("{len} characters (expected {min}-{max})");
        if (min..=max).contains(&len) {
            QualityCheck::pass(kind, detail)
        } else {
            QualityCheck::fail(kind, detail)
        }
    }

    fn heading_hierarchy(artifact: &Artifact) -> QualityCheck {
        let h1_count = artifact
            .sections
            .iter()
            .filter(|s| s.heading_level == HeadingLevel::H1)
            .count();
        let starts_with_h1 = artifact
            .sections
            .first()
            .is_some_and(|s| s.heading_level == HeadingLevel::H1);
        let mut seen_h2 = false;
        let mut orphan_h3 = false;
        for section in &artifact.sections {
            match section.heading_level {
                HeadingLevel::H2 => seen_h2 = true,
                HeadingLevel::H3 if !seen_h2 => orphan_h3 = true,
                _ => {}
            }
        }

        let detail = format!("{h1_count} H1(s) found");
        if h1_count == 1 && starts_with_h1 && !orphan_h3 {
            QualityCheck::pass(CheckKind::HeadingHierarchy, detail)
        } else if orphan_h3 {
            QualityCheck::fail(CheckKind::HeadingHierarchy, format!("{detail}; H3 before any H2"))
        } else {
            QualityCheck::fail(CheckKind::HeadingHierarchy, detail)
        }
    }

    fn word_count_check(&self, total: usize, target: u32) -> QualityCheck {
        let target_f = f64::from(target.max(1));
        let diff = (total as f64 - target_f).abs() / target_f;
        let tolerance = self.config.length_tolerance;
        let detail = format!(
            "{total} words (target {target}, ±{:.0}%)",
            tolerance * 100.0
        );
        let max = f64::from(CheckKind::WordCount.max_points());

        if diff <= tolerance {
            QualityCheck::pass(CheckKind::WordCount, detail)
        } else if diff <= tolerance * 2.0 {
            let points = (max * (tolerance * 2.0 - diff) / tolerance).round() as u32;
            QualityCheck::scored(CheckKind::WordCount, points, false, detail)
        } else {
            QualityCheck::fail(CheckKind::WordCount, detail)
        }
    }

    fn keyword_coverage(&self, artifact: &Artifact, body: &str) -> QualityCheck {
        let keywords = &artifact.seo_metadata.secondary_keywords;
        if keywords.is_empty() {
            return QualityCheck::fail(CheckKind::KeywordCoverage, "no secondary keywords");
        }

        let missing: Vec<String> = keywords
            .iter()
            .filter(|kw| !keyword_present(body, kw))
            .cloned()
            .collect();
        let found = keywords.len() - missing.len();
        let coverage = found as f64 / keywords.len() as f64;
        let detail = format!(
            "{found}/{} keywords found ({:.1}%)",
            keywords.len(),
            coverage * 100.0
        );

        let check = if coverage >= self.config.min_keyword_coverage {
            QualityCheck::pass(CheckKind::KeywordCoverage, detail)
        } else {
            let points = (f64::from(CheckKind::KeywordCoverage.max_points()) * coverage) as u32;
            QualityCheck::scored(CheckKind::KeywordCoverage, points, false, detail)
        };
        check.with_findings(missing)
    }

    fn count_range(
        kind: CheckKind,
        count: usize,
        min: usize,
        max: usize,
        partial: u32,
    ) -> QualityCheck {
        let detail = format!("{count} present (expected {min}-{max})");
        if (min..=max).contains(&count) {
            QualityCheck::pass(kind, detail)
        } else if count > 0 {
            QualityCheck::scored(kind, partial, false, detail)
        } else {
            QualityCheck::fail(kind, detail)
        }
    }

    fn phrase_repetition(&self, artifact: &Artifact, body: &str, total_words: usize) -> QualityCheck {
        let limit = self.config.max_repetitions_per_100_words;
        let overused: Vec<String> = artifact
            .seo_metadata
            .secondary_keywords
            .iter()
            .chain(self.config.tracked_phrases.iter())
            .filter(|phrase| {
                let occurrences = count_phrase(body, phrase);
                total_words > 0 && (occurrences as f64 / total_words as f64) * 100.0 > limit
            })
            .cloned()
            .collect();

        match overused.len() {
            0 => QualityCheck::pass(CheckKind::PhraseRepetition, "no excessive repetition"),
            n => {
                let points = match n {
                    1 | 2 => 5,
                    3 | 4 => 2,
                    _ => 0,
                };
                QualityCheck::scored(
                    CheckKind::PhraseRepetition,
                    points,
                    false,
                    format!("{n} overused phrases"),
                )
                .with_findings(overused)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArticleSection, JobId};
    use crate::testing::{padded, sample_artifact};
    use pretty_assertions::assert_eq;

    fn gate() -> QualityGate {
        QualityGate::new(QualityConfig::default())
    }

    fn artifact() -> Artifact {
        sample_artifact(JobId::from("job-1"), 1500)
    }

    fn check(report: &QualityReport, kind: CheckKind) -> &QualityCheck {
        report.check(kind).unwrap()
    }

    #[test]
    fn test_sample_artifact_scores_full_marks() {
        let report = gate().score(&artifact(), 1500);
        assert_eq!(report.checks.len(), 10);
        assert_eq!(report.failed_checks().count(), 0, "{report:#?}");
        assert_eq!(report.total, 100);
        assert!(report.is_passing(70));
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let artifact = artifact();
        assert_eq!(gate().score(&artifact, 1500), gate().score(&artifact, 1500));
    }

    #[test]
    fn test_metadata_failures_are_not_critical() {
        let mut artifact = artifact();
        artifact.seo_metadata.title_tag = "Too short".to_string();
        artifact.seo_metadata.meta_description = "Also short".to_string();

        let report = gate().score(&artifact, 1500);
        assert!(!check(&report, CheckKind::TitleLength).passed);
        assert!(!check(&report, CheckKind::DescriptionLength).passed);
        // 90 of 110 points.
        assert_eq!(report.total, 82);
        assert!(report.is_passing(70));
    }

    #[test]
    fn test_word_count_partial_credit() {
        let gate = gate();
        // 15% over a 1000-word target: halfway between tolerance and twice it.
        let partial = gate.word_count_check(1150, 1000);
        assert_eq!((partial.passed, partial.points), (false, 5));

        let inside = gate.word_count_check(1100, 1000);
        assert!(inside.passed);

        let outside = gate.word_count_check(1250, 1000);
        assert_eq!((outside.passed, outside.points), (false, 0));
    }

    #[test]
    fn test_long_artifact_fails_critical_check() {
        let report = gate().score(&artifact(), 1000);
        let words = check(&report, CheckKind::WordCount);
        assert!(!words.passed);
        assert!(words.critical);
        assert!(!report.is_passing(70));
    }

    #[test]
    fn test_keyword_coverage_lists_missing_keywords() {
        let mut artifact = artifact();
        artifact
            .seo_metadata
            .secondary_keywords
            .extend(["cloud storage".to_string(), "time tracking".to_string()]);

        let report = gate().score(&artifact, 1500);
        let coverage = check(&report, CheckKind::KeywordCoverage);
        assert!(coverage.passed);
        assert_eq!(coverage.findings, vec!["cloud storage", "time tracking"]);

        artifact
            .seo_metadata
            .secondary_keywords
            .push("screen sharing".to_string());
        let report = gate().score(&artifact, 1500);
        let coverage = check(&report, CheckKind::KeywordCoverage);
        assert!(!coverage.passed);
        // 3 of 6 found.
        assert_eq!(coverage.points, 7);
    }

    #[test]
    fn test_heading_hierarchy_rejects_orphan_h3() {
        let mut artifact = artifact();
        artifact.sections.swap(1, 2);
        let report = gate().score(&artifact, 1500);
        let hierarchy = check(&report, CheckKind::HeadingHierarchy);
        assert!(!hierarchy.passed);
        assert!(hierarchy.detail.contains("H3 before any H2"));
    }

    #[test]
    fn test_heading_hierarchy_rejects_second_h1() {
        let mut artifact = artifact();
        artifact.sections[3].heading_level = HeadingLevel::H1;
        let report = gate().score(&artifact, 1500);
        assert!(!check(&report, CheckKind::HeadingHierarchy).passed);
    }

    #[test]
    fn test_link_counts_get_partial_credit() {
        let mut artifact = artifact();
        artifact.internal_links.truncate(1);
        artifact.external_references.clear();

        let report = gate().score(&artifact, 1500);
        assert_eq!(check(&report, CheckKind::InternalLinks).points, 5);
        assert_eq!(check(&report, CheckKind::ExternalReferences).points, 0);
    }

    #[test]
    fn test_repetition_flags_overused_phrases() {
        let mut artifact = artifact();
        let stuffed = "ai solutions ".repeat(40);
        artifact.sections[1] = ArticleSection {
            content: padded(&stuffed, 300),
            ..artifact.sections[1].clone()
        };

        let report = gate().score(&artifact, 1500);
        let repetition = check(&report, CheckKind::PhraseRepetition);
        assert!(!repetition.passed);
        assert_eq!(repetition.findings, vec!["ai solutions"]);
        assert_eq!(repetition.points, 5);
        assert!(!report.is_passing(70));
    }

    #[test]
    fn test_degraded_cap_policy() {
        let mut artifact = artifact();
        artifact.degraded_steps = vec!["fetch-context".to_string()];

        let allow = gate().score(&artifact, 1500);
        assert_eq!(allow.total, 100);
        assert!(allow.degraded_inputs);

        let capped = QualityGate::new(
            QualityConfig::default().with_degraded_policy(DegradedPolicy::CapBelowThreshold),
        )
        .score(&artifact, 1500);
        assert_eq!(capped.total, 69);
        assert!(!capped.is_passing(70));
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: QualityConfig = serde_json::from_str(r#"{"pass_threshold": 80}"#).unwrap();
        assert_eq!(config.pass_threshold, 80);
        assert_eq!(config.max_revisions, 2);
        assert_eq!(config.degraded_policy, DegradedPolicy::Allow);
        assert_eq!(config.tracked_phrases.len(), 5);
    }
}
