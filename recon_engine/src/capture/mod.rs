//! # Capture decisions
//!
//! Given a processor authorization and the pending attempt it belongs to, [`CaptureDecisionEngine::decide`] works out
//! what should happen to the money. The decision itself has no side effects; the capture job
//! ([`crate::jobs::ProcessCaptureRequest`]) carries them out.
//!
//! The rules, in order:
//! 1. No pending attempt: [`Verdict::Missing`].
//! 2. The attempt is already owned by a transaction (captured, or with a capture in flight): [`Verdict::Ignore`] if it
//!    is this transaction, [`Verdict::Duplicate`] otherwise. The capture job treats an `Ignore` on a capture that is
//!    still in flight as an unknown outcome rather than a repeat.
//! 3. Otherwise the risk score (base score plus CVV and AVS scores) is compared against the processor's thresholds,
//!    giving [`Verdict::Reject`], [`Verdict::Review`] or [`Verdict::Process`].
use std::fmt::Display;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    context::ProcessorContext,
    db_types::PendingRecord,
    risk::{RiskAssessment, ValidationAction},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Capture the authorization.
    Process,
    /// Hold for a human. The pending record is kept.
    Review,
    /// Cancel the authorization and delete the pending record.
    Reject,
    /// A second, distinct authorization for an attempt that is already captured. Cancel the new one.
    Duplicate,
    /// The same transaction again. Nothing to do.
    Ignore,
    /// No pending record to correlate with.
    Missing,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Process => "PROCESS",
            Self::Review => "REVIEW",
            Self::Reject => "REJECT",
            Self::Duplicate => "DUPLICATE",
            Self::Ignore => "IGNORE",
            Self::Missing => "MISSING",
        };
        f.write_str(s)
    }
}

impl From<ValidationAction> for Verdict {
    fn from(action: ValidationAction) -> Self {
        match action {
            ValidationAction::Process => Self::Process,
            ValidationAction::Review => Self::Review,
            ValidationAction::Reject => Self::Reject,
        }
    }
}

/// The parts of an authorization that the decision depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub gateway_txn_id: String,
    #[serde(default)]
    pub cvv_result: Option<String>,
    #[serde(default)]
    pub avs_result: Option<String>,
}

impl TransactionDetails {
    pub fn new<S: Into<String>>(gateway_txn_id: S) -> Self {
        Self { gateway_txn_id: gateway_txn_id.into(), ..Default::default() }
    }

    pub fn with_risk_signals(mut self, cvv_result: Option<String>, avs_result: Option<String>) -> Self {
        self.cvv_result = cvv_result;
        self.avs_result = avs_result;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    /// Present whenever risk was scored, which is exactly when the attempt was pending and unowned. It is published to
    /// the antifraud queue whatever the verdict.
    pub assessment: Option<RiskAssessment>,
}

impl Decision {
    fn without_assessment(verdict: Verdict) -> Self {
        Self { verdict, assessment: None }
    }

    /// The validation action to report alongside the assessment.
    pub fn validation_action(&self) -> Option<ValidationAction> {
        match self.verdict {
            Verdict::Process => Some(ValidationAction::Process),
            Verdict::Review => Some(ValidationAction::Review),
            Verdict::Reject => Some(ValidationAction::Reject),
            _ => None,
        }
    }
}

pub struct CaptureDecisionEngine<'a> {
    context: &'a ProcessorContext,
}

impl<'a> CaptureDecisionEngine<'a> {
    pub fn new(context: &'a ProcessorContext) -> Self {
        Self { context }
    }

    pub fn decide(&self, pending: Option<&PendingRecord>, details: &TransactionDetails) -> Decision {
        let record = match pending {
            Some(r) => r,
            None => {
                debug!("🛡️ No pending record for txn {}. MISSING", details.gateway_txn_id);
                return Decision::without_assessment(Verdict::Missing);
            },
        };
        if let Some(owner) = record.capture_owner() {
            let verdict = if owner == details.gateway_txn_id { Verdict::Ignore } else { Verdict::Duplicate };
            debug!(
                "🛡️ {}/{} is already owned by txn {owner}. txn {} is {verdict}",
                record.gateway, record.order_id, details.gateway_txn_id
            );
            return Decision::without_assessment(verdict);
        }
        let assessment =
            self.context.scorer.assess(record.risk_score, details.cvv_result.as_deref(), details.avs_result.as_deref());
        let verdict = Verdict::from(assessment.validation_action(&self.context.thresholds));
        debug!(
            "🛡️ {}/{} txn {} scored {} ({:?}). {verdict}",
            record.gateway, record.order_id, details.gateway_txn_id, assessment.risk_score, assessment.score_breakdown
        );
        Decision { verdict, assessment: Some(assessment) }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use chrono::Utc;
    use recon_common::MinorUnits;

    use super::*;
    use crate::{context::RiskThresholds, db_types::DonorDetails, risk::RiskScorer};

    fn context(review: f64, reject: f64) -> ProcessorContext {
        let cvv: HashMap<String, f64> = [("M".to_string(), 0.0), ("U".to_string(), 20.0)].into_iter().collect();
        let avs: HashMap<String, f64> = [("Y".to_string(), 0.0), ("Z".to_string(), 5.0)].into_iter().collect();
        ProcessorContext::new("x")
            .with_thresholds(RiskThresholds::new(review, reject))
            .with_scorer(RiskScorer::new(cvv, avs))
    }

    fn record(risk_score: f64) -> PendingRecord {
        PendingRecord {
            id: 1,
            gateway: "x".into(),
            order_id: "555-1".into(),
            gateway_txn_id: None,
            captured: false,
            capture_claim: None,
            risk_score,
            amount: MinorUnits::from(1000),
            currency: "USD".into(),
            payment_method: Some("visa".into()),
            recurring: false,
            recurring_token: None,
            processor_contact_id: None,
            donor: DonorDetails::default(),
            date: Utc::now(),
        }
    }

    #[test]
    fn missing_record() {
        let ctx = context(50.0, 75.0);
        let d = CaptureDecisionEngine::new(&ctx).decide(None, &TransactionDetails::new("t1"));
        assert_eq!(d.verdict, Verdict::Missing);
        assert!(d.assessment.is_none());
    }

    #[test]
    fn captured_record_same_and_different_txn() {
        let ctx = context(50.0, 75.0);
        let engine = CaptureDecisionEngine::new(&ctx);
        let mut r = record(0.0);
        r.captured = true;
        r.gateway_txn_id = Some("t1".into());
        assert_eq!(engine.decide(Some(&r), &TransactionDetails::new("t1")).verdict, Verdict::Ignore);
        let d = engine.decide(Some(&r), &TransactionDetails::new("t2"));
        assert_eq!(d.verdict, Verdict::Duplicate);
        assert!(d.assessment.is_none());
    }

    #[test]
    fn claimed_record_counts_as_owned() {
        let ctx = context(50.0, 75.0);
        let engine = CaptureDecisionEngine::new(&ctx);
        let mut r = record(0.0);
        r.capture_claim = Some("t1".into());
        assert_eq!(engine.decide(Some(&r), &TransactionDetails::new("t1")).verdict, Verdict::Ignore);
        assert_eq!(engine.decide(Some(&r), &TransactionDetails::new("t2")).verdict, Verdict::Duplicate);
    }

    #[test]
    fn threshold_boundaries() {
        let ctx = context(50.0, 75.0);
        let engine = CaptureDecisionEngine::new(&ctx);
        let details = TransactionDetails::new("t1");
        assert_eq!(engine.decide(Some(&record(49.0)), &details).verdict, Verdict::Process);
        assert_eq!(engine.decide(Some(&record(50.0)), &details).verdict, Verdict::Review);
        assert_eq!(engine.decide(Some(&record(75.0)), &details).verdict, Verdict::Reject);
    }

    #[test]
    fn risk_signals_add_to_base_score() {
        let ctx = context(30.0, 50.0);
        let details = TransactionDetails::new("t1").with_risk_signals(Some("U".into()), Some("Z".into()));
        let d = CaptureDecisionEngine::new(&ctx).decide(Some(&record(10.0)), &details);
        assert_eq!(d.verdict, Verdict::Review);
        assert_eq!(d.validation_action(), Some(ValidationAction::Review));
        let a = d.assessment.unwrap();
        assert_eq!(a.risk_score, 35.0);
        assert_eq!(a.score_breakdown["cvv"], 20.0);
        assert_eq!(a.score_breakdown["avs"], 5.0);
    }
}
