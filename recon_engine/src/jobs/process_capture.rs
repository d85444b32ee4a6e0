use std::time::Duration;

use log::*;
use recon_common::MinorUnits;
use serde::{Deserialize, Serialize};

use crate::{
    capture::{CaptureDecisionEngine, Decision, TransactionDetails, Verdict},
    db_types::PendingRecord,
    helpers::is_likely_recurring_installment,
    jobs::{JobContext, JobError},
    notifications::{CanonicalNotification, NotificationType},
    outcomes::{AntifraudMessage, ANTIFRAUD_QUEUE},
    traits::{CaptureRequest, PaymentProcessor, ProcessorError, ReconciliationDatabase},
};

/// Decides whether to capture an authorization, and carries the decision out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessCaptureRequest {
    pub gateway: String,
    pub order_id: String,
    pub details: TransactionDetails,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// The authorized amount, used to rebuild a pending record that has gone missing.
    #[serde(default)]
    pub amount: Option<MinorUnits>,
    #[serde(default)]
    pub currency: Option<String>,
}

enum CaptureAttempt {
    Captured,
    /// Another worker claimed the attempt between our read and our claim.
    LostClaim,
}

impl ProcessCaptureRequest {
    pub const CLASS: &'static str = "ProcessCaptureRequest";

    /// Builds the job for a successful authorization. Returns `None` for anything else, or if the notification has no
    /// order id to correlate on.
    pub fn from_notification(n: &CanonicalNotification) -> Option<Self> {
        if n.event_type != NotificationType::Authorization || !n.success {
            return None;
        }
        let order_id = n.order_id.clone()?;
        let details = TransactionDetails::new(n.gateway_txn_id.as_str())
            .with_risk_signals(n.cvv_result.clone(), n.avs_result.clone());
        Some(Self {
            gateway: n.processor.clone(),
            order_id,
            details,
            payment_method: n.payment_method.clone(),
            amount: n.amount,
            currency: n.currency.clone(),
        })
    }

    pub async fn run<B, P>(&self, ctx: &JobContext<'_, B, P>) -> Result<Verdict, JobError>
    where
        B: ReconciliationDatabase,
        P: PaymentProcessor,
    {
        let engine = CaptureDecisionEngine::new(ctx.context);
        let txn = self.details.gateway_txn_id.as_str();
        let mut record = self.fetch_or_restore(ctx).await?;
        let mut raced = false;
        loop {
            let decision = engine.decide(record.as_ref(), &self.details);
            if !raced {
                self.emit_antifraud(ctx, record.as_ref(), &decision).await?;
            }
            let verdict = decision.verdict;
            match verdict {
                Verdict::Process => {
                    let attempt = match record.as_ref() {
                        Some(r) => self.capture(ctx, r).await?,
                        None => return self.handle_missing(),
                    };
                    match attempt {
                        CaptureAttempt::Captured => return Ok(verdict),
                        CaptureAttempt::LostClaim => record = self.decide_again(ctx, &mut raced).await?,
                    }
                },
                Verdict::Review => {
                    info!("🛡️ {}/{} txn {txn} held for review. No capture was made", self.gateway, self.order_id);
                    return Ok(verdict);
                },
                Verdict::Reject => {
                    // A claimed or captured attempt belongs to another transaction and is never discarded.
                    if ctx.db.discard_pending(&self.gateway, &self.order_id).await? {
                        info!(
                            "🛡️ {}/{} txn {txn} rejected. Cancelling the authorization",
                            self.gateway, self.order_id
                        );
                        self.cancel(ctx).await;
                        return Ok(verdict);
                    }
                    record = self.decide_again(ctx, &mut raced).await?;
                },
                Verdict::Duplicate => {
                    info!(
                        "🛡️ {}/{} has already been captured by another transaction. Cancelling duplicate txn {txn}",
                        self.gateway, self.order_id
                    );
                    self.cancel(ctx).await;
                    return Ok(verdict);
                },
                Verdict::Ignore if record.as_ref().is_some_and(|r| !r.captured) => {
                    error!(
                        "🛡️ {}/{} txn {txn} is claimed by an earlier capture that never finished. Its outcome is \
                         unknown and must be reconciled manually",
                        self.gateway, self.order_id
                    );
                    return Err(JobError::Ambiguous(format!(
                        "Capture of {}/{} txn {txn} is still claimed with an unknown outcome",
                        self.gateway, self.order_id
                    )));
                },
                Verdict::Ignore => {
                    info!("🛡️ {}/{} txn {txn} has been seen before. Ignoring", self.gateway, self.order_id);
                    return Ok(verdict);
                },
                Verdict::Missing => return self.handle_missing(),
            }
        }
    }

    /// The pending record for this attempt. If it has gone missing and the notification carried an amount, it is
    /// rebuilt from the attempt's fraud history.
    async fn fetch_or_restore<B, P>(&self, ctx: &JobContext<'_, B, P>) -> Result<Option<PendingRecord>, JobError>
    where B: ReconciliationDatabase {
        let record = ctx.db.fetch_by_order_id(&self.gateway, &self.order_id).await?;
        let (amount, currency) = match (record.is_none(), self.amount, self.currency.as_deref()) {
            (true, Some(amount), Some(currency)) => (amount, currency),
            _ => return Ok(record),
        };
        let restored = ctx.db.restore_pending(&self.gateway, &self.order_id, amount, currency).await?;
        if restored.is_some() {
            info!("🛡️ No pending record for {}/{}. Using its fraud history instead", self.gateway, self.order_id);
        }
        Ok(restored)
    }

    /// The record changed between our read and our write. Read it again, once.
    async fn decide_again<B, P>(
        &self,
        ctx: &JobContext<'_, B, P>,
        raced: &mut bool,
    ) -> Result<Option<PendingRecord>, JobError>
    where
        B: ReconciliationDatabase,
    {
        if *raced {
            return Err(JobError::Transient(format!(
                "The pending record for {}/{} keeps changing hands",
                self.gateway, self.order_id
            )));
        }
        debug!(
            "🛡️ The pending record for {}/{} changed under txn {}. Deciding again",
            self.gateway, self.order_id, self.details.gateway_txn_id
        );
        *raced = true;
        Ok(ctx.db.fetch_by_order_id(&self.gateway, &self.order_id).await?)
    }

    fn handle_missing(&self) -> Result<Verdict, JobError> {
        let txn = self.details.gateway_txn_id.as_str();
        if is_likely_recurring_installment(self.payment_method.as_deref(), &self.order_id) {
            info!(
                "🛡️ No pending record for {}/{} txn {txn}, but it looks like a recurring installment. Ignoring",
                self.gateway, self.order_id
            );
            return Ok(Verdict::Missing);
        }
        warn!("🛡️ No pending record for {}/{} txn {txn}. Will try again later", self.gateway, self.order_id);
        Err(JobError::Transient(format!("No pending record for {}/{}", self.gateway, self.order_id)))
    }

    async fn emit_antifraud<B, P>(
        &self,
        ctx: &JobContext<'_, B, P>,
        record: Option<&PendingRecord>,
        decision: &Decision,
    ) -> Result<(), JobError>
    where
        B: ReconciliationDatabase,
    {
        let (record, assessment, action) = match (record, &decision.assessment, decision.validation_action()) {
            (Some(r), Some(a), Some(v)) => (r, a, v),
            _ => return Ok(()),
        };
        let message = AntifraudMessage::new(record, &self.details.gateway_txn_id, assessment, action);
        let body = serde_json::to_value(&message).map_err(|e| JobError::Permanent(e.to_string()))?;
        ctx.db.push(ANTIFRAUD_QUEUE, &body).await?;
        trace!("🛡️ Antifraud record published for {}/{}", self.gateway, self.order_id);
        Ok(())
    }

    async fn capture<B, P>(&self, ctx: &JobContext<'_, B, P>, record: &PendingRecord) -> Result<CaptureAttempt, JobError>
    where
        B: ReconciliationDatabase,
        P: PaymentProcessor,
    {
        let txn = self.details.gateway_txn_id.as_str();
        if !ctx.db.try_claim_capture(&self.gateway, &self.order_id, txn).await? {
            return Ok(CaptureAttempt::LostClaim);
        }
        let request = CaptureRequest {
            gateway_txn_id: txn.to_string(),
            order_id: self.order_id.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
        };
        debug!("🛡️ Capturing {}/{} txn {txn}", self.gateway, self.order_id);
        let result = with_timeout(ctx.context.call_timeout, ctx.processor.capture(&request)).await;
        match result {
            Ok(response) => {
                info!("🛡️ Captured {}/{} txn {txn}. Status: {}", self.gateway, self.order_id, response.status);
                match ctx.db.mark_captured(&self.gateway, &self.order_id, txn).await {
                    Ok(true) => Ok(CaptureAttempt::Captured),
                    Ok(false) => Err(JobError::Ambiguous(format!(
                        "Captured {}/{} txn {txn}, but the capture claim was gone when recording it",
                        self.gateway, self.order_id
                    ))),
                    Err(e) => Err(JobError::Ambiguous(format!(
                        "Captured {}/{} txn {txn}, but could not record it. {e}",
                        self.gateway, self.order_id
                    ))),
                }
            },
            Err(e @ ProcessorError::Declined(_)) => {
                warn!("🛡️ Capture of {}/{} txn {txn} was declined. {e}", self.gateway, self.order_id);
                self.release_claim(ctx).await;
                Err(JobError::Permanent(e.to_string()))
            },
            Err(e @ ProcessorError::NotSent(_)) => {
                warn!("🛡️ Capture of {}/{} txn {txn} could not be sent. {e}", self.gateway, self.order_id);
                self.release_claim(ctx).await;
                Err(JobError::Transient(e.to_string()))
            },
            Err(e) => {
                error!(
                    "🛡️ Capture of {}/{} txn {txn} has an unknown outcome. The attempt stays claimed until it is \
                     reconciled manually. {e}",
                    self.gateway, self.order_id
                );
                Err(JobError::Ambiguous(e.to_string()))
            },
        }
    }

    async fn release_claim<B, P>(&self, ctx: &JobContext<'_, B, P>)
    where B: ReconciliationDatabase {
        let txn = self.details.gateway_txn_id.as_str();
        match ctx.db.release_capture_claim(&self.gateway, &self.order_id, txn).await {
            Ok(true) => trace!("🛡️ Capture claim on {}/{} released", self.gateway, self.order_id),
            Ok(false) => warn!("🛡️ Capture claim on {}/{} was already gone", self.gateway, self.order_id),
            Err(e) => error!("🛡️ Could not release the capture claim on {}/{}. {e}", self.gateway, self.order_id),
        }
    }

    async fn cancel<B, P>(&self, ctx: &JobContext<'_, B, P>)
    where P: PaymentProcessor {
        let txn = self.details.gateway_txn_id.as_str();
        match with_timeout(ctx.context.call_timeout, ctx.processor.cancel(txn)).await {
            Ok(()) => info!("🛡️ Authorization {txn} cancelled on {}", ctx.processor.name()),
            Err(e) => warn!("🛡️ Could not cancel authorization {txn} on {}. {e}", ctx.processor.name()),
        }
    }
}

async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, ProcessorError>
where F: std::future::Future<Output = Result<T, ProcessorError>> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProcessorError::Timeout(format!("No response after {}ms", timeout.as_millis()))),
    }
}
