use serde::{Deserialize, Serialize};

use crate::types::{VerificationOutcome, VerificationSummary};

pub fn improvement_report(outcome: &VerificationOutcome) -> String {
    let s = &outcome.summary;
    let mut lines = vec![
        "## Content Improvement Report".to_string(),
        String::new(),
        format!("- **Initial Faithfulness Score**: {:.2}", s.initial_score),
        format!("- **Final Faithfulness Score**: {:.2}", s.final_score),
        format!("- **Improvement**: {:.1}%", s.improvement_percentage),
        format!("- **Iterations**: {}", s.iteration_count),
        format!("- **Verification Status**: {}", s.status.label()),
        String::new(),
        "### Iteration Metrics".to_string(),
        String::new(),
    ];
    for r in &outcome.iterations {
        lines.push(format!(
            "- Iteration {}: Score = {:.2}, Issues = {}, Assessment = {}",
            r.iteration, r.score, r.problematic_claim_count, r.assessment.label()
        ));
    }
    lines.extend([
        String::new(),
        "### Conclusion".to_string(),
        String::new(),
        if s.passed {
            "The content successfully passed verification checks.".to_string()
        } else {
            "The content did not meet the minimum quality threshold.".to_string()
        },
    ]);
    lines.join("\n")
}

fn score_percent(score: f64) -> u32 {
    (score.clamp(0.0, 1.0) * 100.0).floor() as u32
}

pub fn verification_footer(summary: &VerificationSummary, improved: bool) -> String {
    let status = if summary.passed { "[VERIFIED]" } else { "[WARNING: May contain inaccuracies]" };
    let mut line = format!("*Content {status} ({}% factual accuracy)", score_percent(summary.final_score));
    if improved { line.push_str(" [Auto-improved]"); }
    line.push('*');
    format!("\n---\n{line}\n")
}

/// Append the footer only to content that was both revised and verified.
pub fn with_footer(outcome: &VerificationOutcome) -> String {
    if outcome.summary.passed && outcome.improved() {
        format!("{}{}", outcome.final_text, verification_footer(&outcome.summary, true))
    } else {
        outcome.final_text.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeColor { Green, Yellow, Red }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub color: BadgeColor,
    pub score: u32,
    pub passed: bool,
    pub improved: bool,
}

pub fn badge(summary: &VerificationSummary, improved: bool) -> Badge {
    let (color, tag) = if summary.final_score >= 0.95 {
        (BadgeColor::Green, "[OK]")
    } else if summary.final_score >= 0.85 {
        (BadgeColor::Yellow, "[WARNING]")
    } else {
        (BadgeColor::Red, "[ERROR]")
    };
    let text = match (summary.passed, improved) {
        (true, true) => format!("{tag} Verified & Auto-improved"),
        (true, false) => format!("{tag} Verified"),
        (false, true) => format!("{tag} Auto-improved but may contain inaccuracies"),
        (false, false) => format!("{tag} May contain inaccuracies"),
    };
    Badge { text, color, score: score_percent(summary.final_score), passed: summary.passed, improved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Assessment, VerificationRecord, VerificationStatus};

    fn outcome(scores: &[f64], passed: bool, revisions: usize) -> VerificationOutcome {
        let iterations: Vec<_> = scores.iter().enumerate().map(|(i, s)| VerificationRecord {
            iteration: i as u32, score: *s, problematic_claim_count: 2, assessment: Assessment::from_score(*s),
        }).collect();
        let status = if passed { VerificationStatus::Passed } else { VerificationStatus::Failed };
        let summary = crate::types::VerificationSummary {
            initial_score: scores[0],
            final_score: *scores.last().unwrap(),
            improvement_percentage: crate::types::improvement_percentage(scores[0], *scores.last().unwrap()),
            iteration_count: scores.len(),
            passed,
            status,
        };
        VerificationOutcome { summary, iterations, final_text: "Body.".into(), revision_count: revisions }
    }

    #[test]
    fn report_lists_every_iteration() {
        let r = improvement_report(&outcome(&[0.6, 0.96], true, 1));
        assert!(r.contains("- **Initial Faithfulness Score**: 0.60"));
        assert!(r.contains("- **Improvement**: 60.0%"));
        assert!(r.contains("- Iteration 0: Score = 0.60, Issues = 2, Assessment = Significant issues"));
        assert!(r.contains("- Iteration 1: Score = 0.96, Issues = 2, Assessment = Accurate"));
        assert!(r.ends_with("successfully passed verification checks."));
    }

    #[test]
    fn footer_only_on_improved_verified_content() {
        assert_eq!(with_footer(&outcome(&[0.96], true, 0)), "Body.");
        assert_eq!(with_footer(&outcome(&[0.5, 0.7], false, 1)), "Body.");
        let text = with_footer(&outcome(&[0.5, 0.92], true, 1));
        assert_eq!(text, "Body.\n---\n*Content [VERIFIED] (92% factual accuracy) [Auto-improved]*\n");
    }

    #[test]
    fn badge_colors_follow_score() {
        let b = badge(&outcome(&[0.97], true, 0).summary, false);
        assert_eq!((b.color, b.text.as_str(), b.score), (BadgeColor::Green, "[OK] Verified", 97));
        let b = badge(&outcome(&[0.5, 0.88], false, 1).summary, true);
        assert_eq!(b.color, BadgeColor::Yellow);
        assert_eq!(b.text, "[WARNING] Auto-improved but may contain inaccuracies");
        let b = badge(&outcome(&[0.3], false, 0).summary, false);
        assert_eq!(b.color, BadgeColor::Red);
    }
}
