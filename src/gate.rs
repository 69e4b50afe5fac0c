//! Continuity gate.
//!
//! Classifies a continuity score into an acceptance verdict against
//! configured thresholds. The verdict and recommendation are pure
//! functions of the score and the thresholds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TrackerError;

/// Accepted property names for the score in a raw check payload.
const SCORE_FIELDS: &[&str] = &["score", "continuity_score"];

/// Validated gate thresholds. `reject_score` is strictly below
/// `pass_score`; construction fails fast otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    pass_score: f64,
    reject_score: f64,
}

impl GateConfig {
    pub fn new(pass_score: f64, reject_score: f64) -> Result<Self, TrackerError> {
        if !pass_score.is_finite() || !reject_score.is_finite() || reject_score >= pass_score {
            return Err(TrackerError::Configuration {
                pass: pass_score,
                reject: reject_score,
            });
        }
        Ok(Self {
            pass_score,
            reject_score,
        })
    }

    pub fn pass_score(&self) -> f64 {
        self.pass_score
    }

    pub fn reject_score(&self) -> f64 {
        self.reject_score
    }
}

/// Whether a generated branch is acceptable, needs revision, or should be
/// rejected outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Revise,
    Reject,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Revise => write!(f, "revise"),
            Verdict::Reject => write!(f, "reject"),
        }
    }
}

/// Classification of one continuity check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateResult {
    pub score: f64,
    pub verdict: Verdict,
    pub issues: Vec<String>,
    pub recommended: bool,
}

/// Classify a score against the thresholds.
pub fn classify(score: f64, config: &GateConfig) -> GateResult {
    let verdict = if score >= config.pass_score {
        Verdict::Pass
    } else if score <= config.reject_score {
        Verdict::Reject
    } else {
        Verdict::Revise
    };

    GateResult {
        score,
        verdict,
        issues: Vec::new(),
        recommended: verdict == Verdict::Pass,
    }
}

impl GateResult {
    /// Build a gate result from a raw continuity-check payload.
    ///
    /// The score resolves through alias fallbacks and defaults to 0 when
    /// absent; reported issues are carried over verbatim.
    pub fn from_output(output: &Value, config: &GateConfig) -> GateResult {
        let obj = output.as_object();
        let score = obj
            .and_then(|o| {
                SCORE_FIELDS
                    .iter()
                    .find_map(|f| o.get(*f).and_then(Value::as_f64))
            })
            .filter(|s| s.is_finite())
            .unwrap_or(0.0);

        let mut result = classify(score, config);
        result.issues = obj
            .and_then(|o| o.get("issues"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        result
    }
}
