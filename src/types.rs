use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Scores at or below this are treated as a zero baseline when computing improvement.
pub const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblematicClaim {
    pub text: String,
    pub reason: String,
    #[serde(default)]
    pub suggested_correction: String,
}

/// Output of a claim checker. The loop rejects it unless `validate` passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    pub claims: Vec<ProblematicClaim>,
}

impl Evaluation {
    /// Score must be finite and within [0, 1]; every claim needs text.
    pub fn validate(self) -> Result<Self, CollaboratorError> {
        if !self.score.is_finite() || !(0.0..=1.0).contains(&self.score) {
            return Err(CollaboratorError::Malformed(format!("score {} outside [0, 1]", self.score)));
        }
        if self.claims.iter().any(|c| c.text.trim().is_empty()) {
            return Err(CollaboratorError::Malformed("problematic claim with empty text".into()));
        }
        Ok(self)
    }

    pub fn assessment(&self) -> Assessment {
        Assessment::from_score(self.score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment { Accurate, MinorIssues, SignificantIssues, Unreliable }

impl Assessment {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.95 {
            Assessment::Accurate
        } else if score >= 0.85 {
            Assessment::MinorIssues
        } else if score >= 0.5 {
            Assessment::SignificantIssues
        } else {
            Assessment::Unreliable
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Assessment::Accurate => "Accurate",
            Assessment::MinorIssues => "Minor issues",
            Assessment::SignificantIssues => "Significant issues",
            Assessment::Unreliable => "Unreliable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub iteration: u32,
    pub score: f64,
    pub problematic_claim_count: usize,
    pub assessment: Assessment,
}

impl VerificationRecord {
    pub fn from_evaluation(iteration: u32, eval: &Evaluation) -> Self {
        Self {
            iteration,
            score: eval.score,
            problematic_claim_count: eval.claims.len(),
            assessment: eval.assessment(),
        }
    }
}

/// Caller-owned accumulator of records. The loop takes it by value and hands it back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationLedger {
    records: Vec<VerificationRecord>,
}

impl VerificationLedger {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, eval: &Evaluation) -> &VerificationRecord {
        let iteration = self.records.len() as u32;
        self.records.push(VerificationRecord::from_evaluation(iteration, eval));
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[VerificationRecord] { &self.records }
    pub fn len(&self) -> usize { self.records.len() }
    pub fn is_empty(&self) -> bool { self.records.is_empty() }
    pub fn first(&self) -> Option<&VerificationRecord> { self.records.first() }
    pub fn last(&self) -> Option<&VerificationRecord> { self.records.last() }
    pub fn into_records(self) -> Vec<VerificationRecord> { self.records }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Passed,
    Failed,
    Unknown,   // a collaborator failed; the result is partial
    Cancelled,
}

impl VerificationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VerificationStatus::Passed => "Passed",
            VerificationStatus::Failed => "Failed",
            VerificationStatus::Unknown => "Unknown",
            VerificationStatus::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub initial_score: f64,
    pub final_score: f64,
    pub improvement_percentage: f64,
    pub iteration_count: usize,
    pub passed: bool,
    pub status: VerificationStatus,
}

/// How the loop stopped, before the pass threshold is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination { Completed, CollaboratorFailed, Cancelled }

impl VerificationSummary {
    pub fn derive(records: &[VerificationRecord], pass_threshold: f64, termination: Termination) -> Self {
        let (initial_score, final_score) = match (records.first(), records.last()) {
            (Some(f), Some(l)) => (f.score, l.score),
            _ => (0.0, 0.0),
        };
        let status = match termination {
            Termination::Cancelled => VerificationStatus::Cancelled,
            _ if records.is_empty() => VerificationStatus::Unknown,
            Termination::CollaboratorFailed => VerificationStatus::Unknown,
            Termination::Completed if final_score >= pass_threshold => VerificationStatus::Passed,
            Termination::Completed => VerificationStatus::Failed,
        };
        let improvement_percentage = if records.is_empty() { 0.0 } else { improvement_percentage(initial_score, final_score) };
        Self {
            initial_score,
            final_score,
            improvement_percentage,
            iteration_count: records.len(),
            passed: status == VerificationStatus::Passed,
            status,
        }
    }
}

/// Relative change in percent. A zero baseline reports `final * 100`.
pub fn improvement_percentage(initial: f64, final_score: f64) -> f64 {
    let pct = if initial <= SCORE_EPSILON {
        final_score * 100.0
    } else {
        (final_score - initial) / initial * 100.0
    };
    pct.max(-100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub summary: VerificationSummary,
    pub iterations: Vec<VerificationRecord>,
    pub final_text: String,
    pub revision_count: usize,
}

impl VerificationOutcome {
    /// True when the returned text came out of at least one revision.
    pub fn improved(&self) -> bool { self.revision_count > 0 }
}
