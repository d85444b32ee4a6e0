//! Fraud scoring from processor-supplied CVV and AVS results.
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
};

use log::*;
use serde::{Deserialize, Serialize};

use crate::context::RiskThresholds;

pub const CVV_SCORE: &str = "cvv";
pub const AVS_SCORE: &str = "avs";

/// Maps raw processor CVV/AVS result codes to risk scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskScorer {
    cvv_scores: HashMap<String, f64>,
    avs_scores: HashMap<String, f64>,
}

impl RiskScorer {
    pub fn new(cvv_scores: HashMap<String, f64>, avs_scores: HashMap<String, f64>) -> Self {
        Self { cvv_scores, avs_scores }
    }

    pub fn cvv_score(&self, code: Option<&str>) -> f64 {
        lookup(&self.cvv_scores, code, CVV_SCORE)
    }

    pub fn avs_score(&self, code: Option<&str>) -> f64 {
        lookup(&self.avs_scores, code, AVS_SCORE)
    }

    /// Combines the base score stored with the pending attempt with the scores for the CVV and AVS results.
    pub fn assess(&self, base_score: f64, cvv_result: Option<&str>, avs_result: Option<&str>) -> RiskAssessment {
        let mut breakdown = BTreeMap::new();
        breakdown.insert(CVV_SCORE.to_string(), self.cvv_score(cvv_result));
        breakdown.insert(AVS_SCORE.to_string(), self.avs_score(avs_result));
        RiskAssessment::new(base_score, breakdown)
    }
}

// Some processors send a description after the code, e.g. "2 Matches". Only the first token is the code.
fn lookup(map: &HashMap<String, f64>, code: Option<&str>, kind: &str) -> f64 {
    let code = match code.and_then(|c| c.split_whitespace().next()) {
        Some(c) => c,
        None => return 0.0,
    };
    match map.get(code) {
        Some(score) => *score,
        None => {
            warn!("🛡️ {kind} result code '{code}' has no configured score. Scoring it as 0.");
            0.0
        },
    }
}

//--------------------------------------     RiskAssessment       -----------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub base_score: f64,
    pub score_breakdown: BTreeMap<String, f64>,
    pub risk_score: f64,
}

impl RiskAssessment {
    pub fn new(base_score: f64, score_breakdown: BTreeMap<String, f64>) -> Self {
        let risk_score = base_score + score_breakdown.values().sum::<f64>();
        Self { base_score, score_breakdown, risk_score }
    }

    /// Both thresholds are inclusive: a score equal to `reject` is rejected, a score equal to `review` is reviewed.
    pub fn validation_action(&self, thresholds: &RiskThresholds) -> ValidationAction {
        if self.risk_score >= thresholds.reject {
            ValidationAction::Reject
        } else if self.risk_score >= thresholds.review {
            ValidationAction::Review
        } else {
            ValidationAction::Process
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationAction {
    Process,
    Review,
    Reject,
}

impl Display for ValidationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Review => write!(f, "review"),
            Self::Reject => write!(f, "reject"),
        }
    }
}
