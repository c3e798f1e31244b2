//! Turning failed checks into drafting instructions.

use serde::{Deserialize, Serialize};

use crate::core::{Artifact, CheckKind, QualityReport};

/// Sections may mention at most this many secondary keywords once a
/// repetition check has failed.
pub const REPETITION_KEYWORD_LIMIT: u32 = 2;

/// Targeted instructions for one redraft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionPlan {
    /// 1-based revision number.
    pub attempt: u32,
    /// Multiplier applied to every section budget, when length failed.
    #[serde(default)]
    pub length_scale: Option<f64>,
    /// Secondary keywords the redraft must work in.
    #[serde(default)]
    pub include_keywords: Vec<String>,
    /// Phrases the redraft must not repeat.
    #[serde(default)]
    pub avoid_phrases: Vec<String>,
    /// Per-section cap on secondary keywords.
    #[serde(default)]
    pub keyword_limit: Option<u32>,
    /// Plain-language instructions added to each drafting prompt.
    #[serde(default)]
    pub instructions: Vec<String>,
}

impl RevisionPlan {
    /// Derives a plan from the failed checks of `report`.
    ///
    /// Title and description failures are repaired by metadata
    /// normalization and produce no drafting instruction.
    #[must_use]
    pub fn from_report(
        report: &QualityReport,
        artifact: &Artifact,
        target_word_count: u32,
        attempt: u32,
    ) -> Self {
        let mut plan = Self {
            attempt,
            ..Self::default()
        };

        for check in report.failed_checks().filter(|c| !c.kind.is_metadata()) {
            match check.kind {
                CheckKind::WordCount => {
                    let actual = artifact.total_word_count.max(1) as f64;
                    let target = f64::from(target_word_count);
                    let scale = if actual > target {
                        (target / actual).clamp(0.60, 0.85)
                    } else {
                        (target / actual).clamp(1.10, 1.60)
                    };
                    plan.length_scale = Some(scale);
                    plan.instructions.push(if scale < 1.0 {
                        format!(
                            "The draft ran {} words against a {target_word_count}-word target. \
                             Tighten every section and cut repetition.",
                            artifact.total_word_count
                        )
                    } else {
                        format!(
                            "The draft ran {} words against a {target_word_count}-word target. \
                             Expand each section with concrete examples.",
                            artifact.total_word_count
                        )
                    });
                }
                CheckKind::KeywordCoverage => {
                    plan.include_keywords.clone_from(&check.findings);
                    if !check.findings.is_empty() {
                        plan.instructions.push(format!(
                            "Work these keywords in naturally: {}.",
                            check.findings.join(", ")
                        ));
                    }
                }
                CheckKind::PhraseRepetition => {
                    plan.avoid_phrases.clone_from(&check.findings);
                    plan.keyword_limit = Some(REPETITION_KEYWORD_LIMIT);
                    plan.instructions.push(format!(
                        "Rotate wording for overused phrases ({}) and use at most \
                         {REPETITION_KEYWORD_LIMIT} secondary keywords per section.",
                        check.findings.join(", ")
                    ));
                }
                CheckKind::KeywordInH1 | CheckKind::KeywordInIntro => {
                    plan.instructions.push(format!(
                        "Use the primary keyword \"{}\" in the introduction's first sentence.",
                        artifact.seo_metadata.primary_keyword
                    ));
                }
                CheckKind::HeadingHierarchy => {
                    plan.instructions
                        .push("Keep one H1 first and place every H3 under an H2.".to_string());
                }
                CheckKind::InternalLinks
                | CheckKind::ExternalReferences
                | CheckKind::TitleLength
                | CheckKind::DescriptionLength => {}
            }
        }
        plan.instructions.dedup();
        plan
    }

    /// Returns true if the plan changes nothing about drafting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length_scale.is_none()
            && self.include_keywords.is_empty()
            && self.avoid_phrases.is_empty()
            && self.instructions.is_empty()
    }

    /// Scales a section budget.
    #[must_use]
    pub fn scale_budget(&self, budget: usize) -> usize {
        self.length_scale
            .map_or(budget, |scale| (budget as f64 * scale).round() as usize)
    }

    /// The instructions as a prompt block.
    #[must_use]
    pub fn prompt_block(&self) -> String {
        if self.instructions.is_empty() {
            return String::new();
        }
        let mut block = format!("REVISION {} INSTRUCTIONS:", self.attempt);
        for line in &self.instructions {
            block.push_str("\n- ");
            block.push_str(line);
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobId, QualityCheck};
    use crate::testing::sample_artifact;
    use pretty_assertions::assert_eq;

    fn report(checks: Vec<QualityCheck>) -> QualityReport {
        QualityReport {
            total: 50,
            checks,
            degraded_inputs: false,
            accepted_below_threshold: false,
        }
    }

    #[test]
    fn test_too_long_scales_down_within_bounds() {
        let artifact = sample_artifact(JobId::from("j"), 1500);
        let report = report(vec![QualityCheck::fail(CheckKind::WordCount, "long")]);

        let plan = RevisionPlan::from_report(&report, &artifact, 1000, 1);
        assert_eq!(plan.length_scale, Some(0.6666666666666666));
        assert_eq!(plan.scale_budget(300), 200);

        let plan = RevisionPlan::from_report(&report, &artifact, 1400, 1);
        assert_eq!(plan.length_scale, Some(0.85));
    }

    #[test]
    fn test_too_short_scales_up_within_bounds() {
        let artifact = sample_artifact(JobId::from("j"), 1500);
        let report = report(vec![QualityCheck::fail(CheckKind::WordCount, "short")]);

        let plan = RevisionPlan::from_report(&report, &artifact, 5000, 2);
        assert_eq!(plan.length_scale, Some(1.6));
        assert!(plan.prompt_block().starts_with("REVISION 2 INSTRUCTIONS:"));
    }

    #[test]
    fn test_coverage_and_repetition_findings_carry_over() {
        let artifact = sample_artifact(JobId::from("j"), 1500);
        let report = report(vec![
            QualityCheck::fail(CheckKind::KeywordCoverage, "low")
                .with_findings(vec!["time tracking".to_string()]),
            QualityCheck::fail(CheckKind::PhraseRepetition, "overused")
                .with_findings(vec!["ai solutions".to_string()]),
        ]);

        let plan = RevisionPlan::from_report(&report, &artifact, 1500, 1);
        assert_eq!(plan.include_keywords, vec!["time tracking"]);
        assert_eq!(plan.avoid_phrases, vec!["ai solutions"]);
        assert_eq!(plan.keyword_limit, Some(2));
        assert_eq!(plan.length_scale, None);
        assert_eq!(plan.instructions.len(), 2);
    }

    #[test]
    fn test_metadata_failures_produce_empty_plan() {
        let artifact = sample_artifact(JobId::from("j"), 1500);
        let report = report(vec![
            QualityCheck::fail(CheckKind::TitleLength, "short"),
            QualityCheck::fail(CheckKind::DescriptionLength, "short"),
        ]);

        let plan = RevisionPlan::from_report(&report, &artifact, 1500, 1);
        assert!(plan.is_empty());
        assert_eq!(plan.prompt_block(), "");
    }
}
