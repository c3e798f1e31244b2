//! Quality report types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The checks in the quality rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Primary keyword appears in the H1.
    KeywordInH1,
    /// Primary keyword appears in the first 100 words.
    KeywordInIntro,
    /// Title tag is 50-60 characters.
    TitleLength,
    /// Meta description is 150-160 characters.
    DescriptionLength,
    /// Exactly one leading H1 and no H3 before an H2.
    HeadingHierarchy,
    /// Total words within tolerance of the target.
    WordCount,
    /// Enough secondary keywords appear in the body.
    KeywordCoverage,
    /// 3-5 internal links.
    InternalLinks,
    /// 2-4 external references.
    ExternalReferences,
    /// No tracked phrase is overused.
    PhraseRepetition,
}

impl CheckKind {
    /// Every check, in report order.
    pub const ALL: [Self; 10] = [
        Self::KeywordInH1,
        Self::KeywordInIntro,
        Self::TitleLength,
        Self::DescriptionLength,
        Self::HeadingHierarchy,
        Self::WordCount,
        Self::KeywordCoverage,
        Self::InternalLinks,
        Self::ExternalReferences,
        Self::PhraseRepetition,
    ];

    /// Points available for this check.
    #[must_use]
    pub const fn max_points(self) -> u32 {
        match self {
            Self::KeywordInH1 | Self::HeadingHierarchy | Self::KeywordCoverage => 15,
            Self::ExternalReferences => 5,
            Self::KeywordInIntro
            | Self::TitleLength
            | Self::DescriptionLength
            | Self::WordCount
            | Self::InternalLinks
            | Self::PhraseRepetition => 10,
        }
    }

    /// Critical checks force a revision when they fail, whatever the total.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(
            self,
            Self::WordCount | Self::KeywordCoverage | Self::PhraseRepetition
        )
    }

    /// Checks whose failure is fixed by metadata normalization rather than
    /// by redrafting sections.
    #[must_use]
    pub const fn is_metadata(self) -> bool {
        matches!(self, Self::TitleLength | Self::DescriptionLength)
    }

    /// Human-readable name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::KeywordInH1 => "Primary keyword in H1",
            Self::KeywordInIntro => "Primary keyword in first 100 words",
            Self::TitleLength => "Title tag length",
            Self::DescriptionLength => "Meta description length",
            Self::HeadingHierarchy => "Heading hierarchy",
            Self::WordCount => "Word count",
            Self::KeywordCoverage => "Secondary keyword coverage",
            Self::InternalLinks => "Internal links",
            Self::ExternalReferences => "External references",
            Self::PhraseRepetition => "Phrase repetition",
        }
    }

    /// Sum of `max_points` over every check.
    #[must_use]
    pub fn total_max_points() -> u32 {
        Self::ALL.iter().map(|k| k.max_points()).sum()
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCheck {
    /// Which check.
    pub kind: CheckKind,
    /// True when the check was fully met.
    pub passed: bool,
    /// Points awarded, possibly partial.
    pub points: u32,
    /// Points available.
    pub max_points: u32,
    /// Whether failure forces a revision.
    pub critical: bool,
    /// One-line explanation.
    pub detail: String,
    /// Specific offenders, such as missing keywords or overused phrases.
    #[serde(default)]
    pub findings: Vec<String>,
}

impl QualityCheck {
    /// A fully passed check.
    pub fn pass(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self::scored(kind, kind.max_points(), true, detail)
    }

    /// A failed check with no points.
    pub fn fail(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self::scored(kind, 0, false, detail)
    }

    /// A check with explicit points.
    pub fn scored(kind: CheckKind, points: u32, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            kind,
            passed,
            points: points.min(kind.max_points()),
            max_points: kind.max_points(),
            critical: kind.is_critical(),
            detail: detail.into(),
            findings: Vec::new(),
        }
    }

    /// Attaches findings.
    #[must_use]
    pub fn with_findings(mut self, findings: Vec<String>) -> Self {
        self.findings = findings;
        self
    }
}

/// Outcome of scoring an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Score out of 100.
    pub total: u32,
    /// Per-check results, in rubric order.
    pub checks: Vec<QualityCheck>,
    /// Some inputs came from local substitutes.
    #[serde(default)]
    pub degraded_inputs: bool,
    /// Set when the report belongs to the best candidate of an exhausted
    /// revision budget rather than a passing one.
    #[serde(default)]
    pub accepted_below_threshold: bool,
}

impl QualityReport {
    /// Returns the result for one check.
    #[must_use]
    pub fn check(&self, kind: CheckKind) -> Option<&QualityCheck> {
        self.checks.iter().find(|c| c.kind == kind)
    }

    /// Failed checks.
    pub fn failed_checks(&self) -> impl Iterator<Item = &QualityCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Failed critical checks.
    pub fn critical_failures(&self) -> impl Iterator<Item = &QualityCheck> {
        self.failed_checks().filter(|c| c.critical)
    }

    /// Returns true if the total meets `threshold` and no critical check failed.
    #[must_use]
    pub fn is_passing(&self, threshold: u32) -> bool {
        self.total >= threshold && self.critical_failures().next().is_none()
    }

    /// Returns a copy flagged as accepted below threshold.
    #[must_use]
    pub fn below_threshold(&self) -> Self {
        Self {
            accepted_below_threshold: true,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rubric_points() {
        assert_eq!(CheckKind::total_max_points(), 110);
        let critical: Vec<_> = CheckKind::ALL.iter().filter(|k| k.is_critical()).collect();
        assert_eq!(critical.len(), 3);
    }

    #[test]
    fn test_scored_clamps_points() {
        let check = QualityCheck::scored(CheckKind::ExternalReferences, 50, true, "x");
        assert_eq!(check.points, 5);
    }

    #[test]
    fn test_is_passing_requires_critical_checks() {
        let report = QualityReport {
            total: 92,
            checks: vec![
                QualityCheck::pass(CheckKind::KeywordInH1, "ok"),
                QualityCheck::fail(CheckKind::WordCount, "too long"),
            ],
            degraded_inputs: false,
            accepted_below_threshold: false,
        };
        assert!(!report.is_passing(70));
        assert_eq!(report.critical_failures().count(), 1);

        let report = QualityReport {
            checks: vec![
                QualityCheck::pass(CheckKind::WordCount, "ok"),
                QualityCheck::fail(CheckKind::TitleLength, "short"),
            ],
            ..report
        };
        assert!(report.is_passing(70));
        assert!(!report.is_passing(93));
    }
}
