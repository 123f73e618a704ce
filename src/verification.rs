use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{info, info_span, warn, Instrument};

use crate::checker::{CheckRequest, ClaimChecker};
use crate::config::LoopConfig;
use crate::error::CollaboratorError;
use crate::reviser::Reviser;
use crate::types::{Evaluation, Termination, VerificationLedger, VerificationOutcome, VerificationSummary};

/// Per-run memo of evaluations keyed by the digest of the evaluated text.
#[derive(Default)]
struct EvaluationCache {
    entries: HashMap<[u8; 32], Evaluation>,
}

impl EvaluationCache {
    fn key(text: &str) -> [u8; 32] {
        Sha256::digest(text.as_bytes()).into()
    }

    async fn evaluate(&mut self, checker: &dyn ClaimChecker, req: &CheckRequest, text: &str) -> Result<Evaluation, CollaboratorError> {
        let key = Self::key(text);
        if let Some(hit) = self.entries.get(&key) {
            tracing::debug!("reusing cached evaluation");
            return Ok(hit.clone());
        }
        let eval = checker.evaluate(req, text).await?.validate()?;
        self.entries.insert(key, eval.clone());
        Ok(eval)
    }
}

/// Everything a run hands back: the records live in the caller's ledger.
pub struct LoopResult {
    pub ledger: VerificationLedger,
    pub outcome: VerificationOutcome,
}

pub struct VerificationLoop<'a> {
    checker: &'a dyn ClaimChecker,
    reviser: &'a dyn Reviser,
    cfg: LoopConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> VerificationLoop<'a> {
    pub fn new(checker: &'a dyn ClaimChecker, reviser: &'a dyn Reviser, cfg: LoopConfig) -> Self {
        Self { checker, reviser, cfg, cancel: None }
    }

    /// Stop before the next submission once the flag reads `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Verify `text`, revising until it passes or the iteration budget is spent.
    /// Collaborator failures end the run early with a partial, unverified result.
    pub async fn run(&self, req: &CheckRequest, text: String, mut ledger: VerificationLedger) -> LoopResult {
        let span = info_span!("verification_loop", threshold = self.cfg.pass_threshold, max_iterations = self.cfg.max_iterations);
        async move {
            let start_len = ledger.len();
            let max = self.cfg.max_iterations.max(1) as usize;
            let mut cache = EvaluationCache::default();
            let mut current = text;
            let mut revisions = 0usize;

            let termination = loop {
                if self.cancelled() {
                    info!(recorded = ledger.len() - start_len, "verification cancelled");
                    break Termination::Cancelled;
                }

                let eval = match cache.evaluate(self.checker, req, &current).await {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, transient = e.is_transient(), "verification failed; returning partial result");
                        break Termination::CollaboratorFailed;
                    }
                };
                let rec = ledger.push(&eval);
                info!(iteration = rec.iteration, score = rec.score, claims = rec.problematic_claim_count, "recorded iteration");

                let done = ledger.len() - start_len;
                if eval.score >= self.cfg.pass_threshold || done >= max {
                    break Termination::Completed;
                }

                match self.reviser.revise(req, &current, &eval.claims).await {
                    Ok(revised) => {
                        revisions += 1;
                        current = revised;
                    }
                    Err(e) => {
                        warn!(error = %e, transient = e.is_transient(), "revision failed; returning partial result");
                        break Termination::CollaboratorFailed;
                    }
                }
            };

            let iterations = ledger.records()[start_len..].to_vec();
            let summary = VerificationSummary::derive(&iterations, self.cfg.pass_threshold, termination);
            info!(
                initial = summary.initial_score,
                final_score = summary.final_score,
                improvement = summary.improvement_percentage,
                status = summary.status.label(),
                "verification finished"
            );
            LoopResult {
                ledger,
                outcome: VerificationOutcome { summary, iterations, final_text: current, revision_count: revisions },
            }
        }
        .instrument(span)
        .await
    }
}

/// Run a fresh loop with a new ledger.
pub async fn verify_content(
    checker: &dyn ClaimChecker,
    reviser: &dyn Reviser,
    cfg: LoopConfig,
    req: &CheckRequest,
    text: String,
) -> VerificationOutcome {
    VerificationLoop::new(checker, reviser, cfg).run(req, text, VerificationLedger::new()).await.outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProblematicClaim, VerificationStatus};
    use std::sync::Mutex;

    enum Step { Score(f64), Fail, Malformed }

    struct FakeChecker {
        steps: Mutex<Vec<Step>>,
        calls: Mutex<usize>,
    }

    impl FakeChecker {
        fn new(mut steps: Vec<Step>) -> Self {
            steps.reverse();
            Self { steps: Mutex::new(steps), calls: Mutex::new(0) }
        }
        fn calls(&self) -> usize { *self.calls.lock().unwrap() }
    }

    #[async_trait::async_trait]
    impl ClaimChecker for FakeChecker {
        async fn evaluate(&self, _req: &CheckRequest, text: &str) -> Result<Evaluation, CollaboratorError> {
            *self.calls.lock().unwrap() += 1;
            match self.steps.lock().unwrap().pop() {
                Some(Step::Score(score)) => Ok(Evaluation {
                    score,
                    claims: vec![ProblematicClaim { text: text.into(), reason: "unsupported".into(), suggested_correction: "fix".into() }],
                }),
                Some(Step::Malformed) => Err(CollaboratorError::Malformed("score 1.7 outside [0, 1]".into())),
                Some(Step::Fail) | None => Err(CollaboratorError::Unavailable("down".into())),
            }
        }
    }

    struct FakeReviser {
        calls: Mutex<usize>,
        fail_on: Option<usize>,
        repeat: bool,
    }

    impl FakeReviser {
        fn new() -> Self { Self { calls: Mutex::new(0), fail_on: None, repeat: false } }
        fn calls(&self) -> usize { *self.calls.lock().unwrap() }
    }

    #[async_trait::async_trait]
    impl Reviser for FakeReviser {
        async fn revise(&self, _req: &CheckRequest, text: &str, claims: &[ProblematicClaim]) -> Result<String, CollaboratorError> {
            let mut n = self.calls.lock().unwrap();
            *n += 1;
            if Some(*n) == self.fail_on {
                return Err(CollaboratorError::RateLimited("429".into()));
            }
            assert!(!claims.is_empty());
            if self.repeat { return Ok(text.to_string()); }
            Ok(format!("{text} [rev {n}]"))
        }
    }

    fn cfg(n: u32) -> LoopConfig { LoopConfig { pass_threshold: 0.9, max_iterations: n } }

    #[tokio::test]
    async fn passing_first_iteration_skips_revision() {
        let checker = FakeChecker::new(vec![Step::Score(0.95)]);
        let reviser = FakeReviser::new();
        let out = verify_content(&checker, &reviser, cfg(3), &CheckRequest::default(), "draft".into()).await;
        assert_eq!(out.iterations.len(), 1);
        assert_eq!(reviser.calls(), 0);
        assert_eq!(out.summary.status, VerificationStatus::Passed);
        assert_eq!(out.summary.improvement_percentage, 0.0);
        assert_eq!(out.final_text, "draft");
        assert!(!out.improved());
    }

    #[tokio::test]
    async fn never_passing_spends_full_budget() {
        let checker = FakeChecker::new(vec![Step::Score(0.5), Step::Score(0.6), Step::Score(0.7)]);
        let reviser = FakeReviser::new();
        let out = verify_content(&checker, &reviser, cfg(3), &CheckRequest::default(), "draft".into()).await;
        assert_eq!(out.summary.iteration_count, 3);
        assert_eq!(checker.calls(), 3);
        assert_eq!(reviser.calls(), 2);
        assert_eq!(out.summary.status, VerificationStatus::Failed);
        assert!(!out.summary.passed);
        assert_eq!(out.summary.final_score, 0.7);
        assert_eq!(out.final_text, "draft [rev 1] [rev 2]");
        let its: Vec<_> = out.iterations.iter().map(|r| r.iteration).collect();
        assert_eq!(its, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn stops_once_threshold_is_met() {
        let checker = FakeChecker::new(vec![Step::Score(0.7), Step::Score(0.8), Step::Score(0.93), Step::Score(0.99)]);
        let reviser = FakeReviser::new();
        let out = verify_content(&checker, &reviser, cfg(5), &CheckRequest::default(), "draft".into()).await;
        assert_eq!(out.summary.iteration_count, 3);
        assert_eq!(reviser.calls(), 2);
        assert!(out.summary.passed);
        assert!((out.summary.improvement_percentage - (0.93 - 0.7) / 0.7 * 100.0).abs() < 1e-9);
        assert!(out.improved());
    }

    #[tokio::test]
    async fn checker_outage_keeps_prior_records() {
        let checker = FakeChecker::new(vec![Step::Score(0.4), Step::Fail]);
        let reviser = FakeReviser::new();
        let out = verify_content(&checker, &reviser, cfg(3), &CheckRequest::default(), "draft".into()).await;
        assert_eq!(out.iterations.len(), 1);
        assert_eq!(out.summary.status, VerificationStatus::Unknown);
        assert!(!out.summary.passed);
        assert_eq!(out.summary.final_score, 0.4);
    }

    #[tokio::test]
    async fn malformed_response_ends_loop_without_panicking() {
        let checker = FakeChecker::new(vec![Step::Malformed]);
        let reviser = FakeReviser::new();
        let out = verify_content(&checker, &reviser, cfg(3), &CheckRequest::default(), "draft".into()).await;
        assert!(out.iterations.is_empty());
        assert_eq!(out.summary.status, VerificationStatus::Unknown);
        assert_eq!(out.final_text, "draft");
    }

    #[tokio::test]
    async fn out_of_range_score_is_not_recorded() {
        let checker = FakeChecker::new(vec![Step::Score(1.7)]);
        let reviser = FakeReviser::new();
        let out = verify_content(&checker, &reviser, cfg(3), &CheckRequest::default(), "draft".into()).await;
        assert!(out.iterations.is_empty());
        assert_eq!(out.summary.status, VerificationStatus::Unknown);
        assert!(!out.summary.passed);
        assert_eq!(reviser.calls(), 0);
    }

    #[tokio::test]
    async fn nan_score_ends_run_with_prior_records() {
        let checker = FakeChecker::new(vec![Step::Score(0.4), Step::Score(f64::NAN), Step::Score(0.95)]);
        let reviser = FakeReviser::new();
        let out = verify_content(&checker, &reviser, cfg(3), &CheckRequest::default(), "draft".into()).await;
        assert_eq!(out.iterations.len(), 1);
        assert_eq!(out.summary.final_score, 0.4);
        assert_eq!(out.summary.status, VerificationStatus::Unknown);
        let json = serde_json::to_value(&out.summary).unwrap();
        assert_eq!(json["final_score"], 0.4);
        assert_eq!(checker.calls(), 2);
    }

    #[tokio::test]
    async fn revision_failure_returns_last_verified_text() {
        let checker = FakeChecker::new(vec![Step::Score(0.4), Step::Score(0.6), Step::Score(0.9)]);
        let reviser = FakeReviser { calls: Mutex::new(0), fail_on: Some(2), repeat: false };
        let out = verify_content(&checker, &reviser, cfg(3), &CheckRequest::default(), "draft".into()).await;
        assert_eq!(out.iterations.len(), 2);
        assert_eq!(out.final_text, "draft [rev 1]");
        assert_eq!(out.summary.final_score, 0.6);
        assert_eq!(out.summary.status, VerificationStatus::Unknown);
    }

    #[tokio::test]
    async fn repeated_text_uses_cached_evaluation() {
        let checker = FakeChecker::new(vec![Step::Score(0.5)]);
        let reviser = FakeReviser { calls: Mutex::new(0), fail_on: None, repeat: true };
        let out = verify_content(&checker, &reviser, cfg(3), &CheckRequest::default(), "draft".into()).await;
        assert_eq!(checker.calls(), 1);
        assert_eq!(reviser.calls(), 2);
        assert_eq!(out.summary.iteration_count, 3);
        assert_eq!(out.summary.status, VerificationStatus::Failed);
    }

    #[tokio::test]
    async fn cancellation_stops_submitting() {
        let checker = FakeChecker::new(vec![Step::Score(0.5)]);
        let reviser = FakeReviser::new();
        let (tx, rx) = watch::channel(true);
        let out = VerificationLoop::new(&checker, &reviser, cfg(3))
            .with_cancel(rx)
            .run(&CheckRequest::default(), "draft".into(), VerificationLedger::new())
            .await
            .outcome;
        drop(tx);
        assert_eq!(checker.calls(), 0);
        assert_eq!(out.summary.status, VerificationStatus::Cancelled);
        assert!(!out.summary.passed);
    }

    #[tokio::test]
    async fn ledger_is_handed_back_to_caller() {
        let reviser = FakeReviser::new();
        let first = FakeChecker::new(vec![Step::Score(0.95)]);
        let res = VerificationLoop::new(&first, &reviser, cfg(3))
            .run(&CheckRequest::default(), "a".into(), VerificationLedger::new())
            .await;
        assert_eq!(res.ledger.len(), 1);

        let second = FakeChecker::new(vec![Step::Score(0.2), Step::Score(0.97)]);
        let res = VerificationLoop::new(&second, &reviser, cfg(3))
            .run(&CheckRequest::default(), "b".into(), res.ledger)
            .await;
        assert_eq!(res.ledger.len(), 3);
        assert_eq!(res.outcome.iterations.len(), 2);
        assert_eq!(res.outcome.iterations[0].iteration, 1);
        assert_eq!(res.outcome.summary.initial_score, 0.2);
        assert!(res.outcome.summary.passed);
    }
}
