//! Validation reviews and the three-way verdict.
//!
//! The engine stays payload-agnostic everywhere except the validate
//! boundary: the driver reads the review fields out of the validate
//! payload to decide which items proceed to commit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three-way decision produced by the validate stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Good enough to commit.
    Approved,
    /// Usable with rework; committed only when the run opts in.
    NeedsRevision,
    /// Not usable; never committed.
    Rejected,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::NeedsRevision => "needs_revision",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Score cutoffs used when the validator reports a score but no verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReviewThresholds {
    /// Scores at or above this are approved.
    pub approve: f64,
    /// Scores at or above this (but below `approve`) need revision.
    pub revise: f64,
}

impl Default for ReviewThresholds {
    fn default() -> Self {
        Self {
            approve: 0.8,
            revise: 0.6,
        }
    }
}

/// What the validate collaborator reported for one item.
///
/// Field aliases accept the wire names used by existing validators
/// (`quality_score`, `review_status`, `reviewer_notes`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Review {
    /// Quality score in `[0, 1]`.
    #[serde(default, alias = "quality_score")]
    pub score: Option<f64>,
    /// Explicit verdict; takes precedence over the score.
    #[serde(default, alias = "review_status")]
    pub verdict: Option<Verdict>,
    /// Free-form reviewer notes.
    #[serde(default, alias = "reviewer_notes")]
    pub notes: Option<String>,
}

impl Review {
    /// Extracts the review fields from a validate payload.
    ///
    /// Unknown fields are ignored; missing fields come back as `None` and
    /// are caught by [`Review::decide`].
    #[must_use]
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        serde_json::from_value(payload.clone()).unwrap_or_default()
    }

    /// Decides the verdict.
    ///
    /// An explicit verdict from the validator wins; otherwise the score is
    /// cut against the thresholds. Returns `None` when the payload carried
    /// neither — the caller treats that as an engine-internal item failure,
    /// not a rejection.
    #[must_use]
    pub fn decide(&self, thresholds: &ReviewThresholds) -> Option<Verdict> {
        if let Some(verdict) = self.verdict {
            return Some(verdict);
        }
        let score = self.score?;
        Some(if score >= thresholds.approve {
            Verdict::Approved
        } else if score >= thresholds.revise {
            Verdict::NeedsRevision
        } else {
            Verdict::Rejected
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_verdict_wins() {
        let review = Review::from_payload(&json!({
            "score": 0.95,
            "verdict": "rejected",
        }));
        assert_eq!(
            review.decide(&ReviewThresholds::default()),
            Some(Verdict::Rejected)
        );
    }

    #[test]
    fn test_score_thresholds() {
        let thresholds = ReviewThresholds::default();

        let approve = Review::from_payload(&json!({"score": 0.9}));
        assert_eq!(approve.decide(&thresholds), Some(Verdict::Approved));

        let revise = Review::from_payload(&json!({"score": 0.7}));
        assert_eq!(revise.decide(&thresholds), Some(Verdict::NeedsRevision));

        let reject = Review::from_payload(&json!({"score": 0.4}));
        assert_eq!(reject.decide(&thresholds), Some(Verdict::Rejected));

        // Boundary: exactly at the approve cutoff.
        let boundary = Review::from_payload(&json!({"score": 0.8}));
        assert_eq!(boundary.decide(&thresholds), Some(Verdict::Approved));
    }

    #[test]
    fn test_wire_aliases() {
        let review = Review::from_payload(&json!({
            "quality_score": 0.85,
            "review_status": "needs_revision",
            "reviewer_notes": "tighten the conclusion",
        }));
        assert_eq!(review.score, Some(0.85));
        assert_eq!(
            review.decide(&ReviewThresholds::default()),
            Some(Verdict::NeedsRevision)
        );
        assert_eq!(review.notes.as_deref(), Some("tighten the conclusion"));
    }

    #[test]
    fn test_missing_review_data() {
        let review = Review::from_payload(&json!({"answer": "42"}));
        assert_eq!(review.decide(&ReviewThresholds::default()), None);

        // Non-object payloads degrade the same way.
        let review = Review::from_payload(&json!("not an object"));
        assert_eq!(review.decide(&ReviewThresholds::default()), None);
    }
}
