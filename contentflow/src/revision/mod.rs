//! The bounded revision loop.
//!
//! A [`RevisionController`] is fed one scored candidate at a time and
//! answers with either a [`RevisionPlan`] for another drafting pass or a
//! [`FinalSelection`]. The attempt count lives in the controller, so the
//! loop cannot run more than `max_revisions` redrafts.

mod plan;

pub use plan::{RevisionPlan, REPETITION_KEYWORD_LIMIT};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{Artifact, QualityReport};
use crate::quality::QualityConfig;

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionState {
    /// Waiting for the first scored candidate.
    #[default]
    Scored,
    /// A redraft was requested.
    Revising,
    /// A passing candidate was accepted.
    Accepted,
    /// The budget ran out and the best candidate was taken.
    Exhausted,
}

/// A scored artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// The artifact.
    pub artifact: Artifact,
    /// Its report.
    pub report: QualityReport,
    /// 0 for the first draft, then the revision number.
    pub attempt: u32,
}

/// The artifact chosen to finish a job.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalSelection {
    /// The chosen artifact, with its report attached.
    pub artifact: Artifact,
    /// The chosen report.
    pub report: QualityReport,
    /// Revisions run before the decision.
    pub revision_count: u32,
}

impl FinalSelection {
    fn from_candidate(candidate: Candidate, revision_count: u32, below_threshold: bool) -> Self {
        let report = if below_threshold {
            candidate.report.below_threshold()
        } else {
            candidate.report
        };
        Self {
            artifact: candidate.artifact.with_quality(report.clone()),
            report,
            revision_count,
        }
    }
}

/// What to do after a candidate is scored.
#[derive(Debug, Clone, PartialEq)]
pub enum RevisionDecision {
    /// Finish the job with this selection.
    Accept(FinalSelection),
    /// Redraft with this plan.
    Revise(RevisionPlan),
}

/// Decides between accepting and redrafting.
#[derive(Debug, Clone)]
pub struct RevisionController {
    pass_threshold: u32,
    max_revisions: u32,
    target_word_count: u32,
    revisions: u32,
    best: Option<Candidate>,
    state: RevisionState,
}

impl RevisionController {
    /// Creates a controller.
    #[must_use]
    pub fn new(pass_threshold: u32, max_revisions: u32, target_word_count: u32) -> Self {
        Self {
            pass_threshold,
            max_revisions,
            target_word_count,
            revisions: 0,
            best: None,
            state: RevisionState::Scored,
        }
    }

    /// Creates a controller from quality settings.
    #[must_use]
    pub fn from_config(config: &QualityConfig, target_word_count: u32) -> Self {
        Self::new(config.pass_threshold, config.max_revisions, target_word_count)
    }

    /// Revisions requested so far.
    #[must_use]
    pub const fn revisions(&self) -> u32 {
        self.revisions
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RevisionState {
        self.state
    }

    /// The highest-scoring candidate seen so far.
    #[must_use]
    pub fn best(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    /// Feeds the next scored candidate.
    pub fn observe(&mut self, artifact: Artifact, report: QualityReport) -> RevisionDecision {
        let candidate = Candidate {
            artifact,
            report,
            attempt: self.revisions,
        };

        // Strictly greater, so ties keep the earlier attempt.
        if self
            .best
            .as_ref()
            .map_or(true, |best| candidate.report.total > best.report.total)
        {
            self.best = Some(candidate.clone());
        }

        if candidate.report.is_passing(self.pass_threshold) {
            info!(
                job_id = %candidate.artifact.job_id,
                score = candidate.report.total,
                revisions = self.revisions,
                "artifact accepted"
            );
            self.state = RevisionState::Accepted;
            return RevisionDecision::Accept(FinalSelection::from_candidate(
                candidate,
                self.revisions,
                false,
            ));
        }

        if self.revisions < self.max_revisions {
            self.revisions += 1;
            self.state = RevisionState::Revising;
            let plan = RevisionPlan::from_report(
                &candidate.report,
                &candidate.artifact,
                self.target_word_count,
                self.revisions,
            );
            info!(
                job_id = %candidate.artifact.job_id,
                score = candidate.report.total,
                revision = self.revisions,
                "requesting revision"
            );
            return RevisionDecision::Revise(plan);
        }

        match self.settle() {
            Some(selection) => RevisionDecision::Accept(selection),
            // `best` was set above.
            None => RevisionDecision::Accept(FinalSelection::from_candidate(
                candidate,
                self.revisions,
                true,
            )),
        }
    }

    /// Ends the loop with the best candidate so far, flagged as accepted
    /// below threshold. Used when the budget is spent or a redraft failed.
    pub fn settle(&mut self) -> Option<FinalSelection> {
        let best = self.best.clone()?;
        warn!(
            job_id = %best.artifact.job_id,
            score = best.report.total,
            attempt = best.attempt,
            revisions = self.revisions,
            "accepting best candidate below threshold"
        );
        self.state = RevisionState::Exhausted;
        Some(FinalSelection::from_candidate(best, self.revisions, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CheckKind, JobId, QualityCheck};
    use crate::testing::sample_artifact;
    use pretty_assertions::assert_eq;

    fn report(total: u32, word_count_passed: bool) -> QualityReport {
        let word_count = if word_count_passed {
            QualityCheck::pass(CheckKind::WordCount, "ok")
        } else {
            QualityCheck::fail(CheckKind::WordCount, "long")
        };
        QualityReport {
            total,
            checks: vec![word_count],
            degraded_inputs: false,
            accepted_below_threshold: false,
        }
    }

    fn artifact(revision: u32) -> Artifact {
        let mut artifact = sample_artifact(JobId::from("job-1"), 1500);
        artifact.revision = revision;
        artifact
    }

    #[test]
    fn test_first_pass_accepted_without_revisions() {
        let mut controller = RevisionController::new(70, 2, 1500);
        match controller.observe(artifact(0), report(85, true)) {
            RevisionDecision::Accept(selection) => {
                assert_eq!(selection.revision_count, 0);
                assert!(!selection.report.accepted_below_threshold);
                assert_eq!(selection.artifact.quality, Some(selection.report.clone()));
            }
            RevisionDecision::Revise(_) => panic!("expected acceptance"),
        }
        assert_eq!(controller.state(), RevisionState::Accepted);
    }

    #[test]
    fn test_critical_failure_forces_revision_despite_score() {
        let mut controller = RevisionController::new(70, 2, 1500);
        let decision = controller.observe(artifact(0), report(92, false));
        assert!(matches!(decision, RevisionDecision::Revise(ref plan) if plan.attempt == 1));
        assert_eq!(controller.state(), RevisionState::Revising);
    }

    #[test]
    fn test_never_passing_stops_after_two_revisions_with_best() {
        let mut controller = RevisionController::new(70, 2, 1500);

        assert!(matches!(
            controller.observe(artifact(0), report(40, false)),
            RevisionDecision::Revise(_)
        ));
        assert!(matches!(
            controller.observe(artifact(1), report(65, false)),
            RevisionDecision::Revise(_)
        ));
        let RevisionDecision::Accept(selection) = controller.observe(artifact(2), report(50, false))
        else {
            panic!("expected exhaustion");
        };

        assert_eq!(controller.revisions(), 2);
        assert_eq!(controller.state(), RevisionState::Exhausted);
        assert_eq!(selection.revision_count, 2);
        assert_eq!(selection.report.total, 65);
        assert_eq!(selection.artifact.revision, 1);
        assert!(selection.report.accepted_below_threshold);
    }

    #[test]
    fn test_ties_keep_earliest_candidate() {
        let mut controller = RevisionController::new(70, 1, 1500);
        controller.observe(artifact(0), report(60, false));
        let RevisionDecision::Accept(selection) = controller.observe(artifact(1), report(60, false))
        else {
            panic!("expected exhaustion");
        };
        assert_eq!(selection.artifact.revision, 0);
    }

    #[test]
    fn test_settle_after_failed_redraft() {
        let mut controller = RevisionController::new(70, 2, 1500);
        assert!(controller.settle().is_none());

        controller.observe(artifact(0), report(55, false));
        let selection = controller.settle().unwrap();
        assert_eq!(selection.revision_count, 1);
        assert_eq!(selection.report.total, 55);
        assert!(selection.report.accepted_below_threshold);
    }

    #[test]
    fn test_zero_budget_accepts_first_candidate() {
        let mut controller = RevisionController::new(70, 0, 1500);
        let RevisionDecision::Accept(selection) = controller.observe(artifact(0), report(30, false))
        else {
            panic!("expected acceptance");
        };
        assert_eq!(selection.revision_count, 0);
        assert!(selection.report.accepted_below_threshold);
    }
}
