use std::time::Duration;

use cucumber::{then, when};
use recon_engine::{
    capture::{TransactionDetails, Verdict},
    jobs::{JobContext, ProcessCaptureRequest, RecordCapture},
    outcomes::ANTIFRAUD_QUEUE,
    traits::{JobQueue, PendingStore},
};

use crate::cucumber::ReconWorld;

async fn authorize(world: &mut ReconWorld, order_id: String, txn: String, cvv: Option<String>, avs: Option<String>) {
    let job = ProcessCaptureRequest {
        gateway: "x".into(),
        order_id,
        details: TransactionDetails::new(txn).with_risk_signals(cvv, avs),
        payment_method: None,
        amount: None,
        currency: None,
    };
    let sys = world.system_mut();
    let ctx = JobContext::new(&sys.db, &sys.context, &sys.processor);
    let result = job.run(&ctx).await;
    sys.last_result = Some(result);
}

#[when(expr = "an authorization for order {word} arrives with txn {word}")]
async fn authorization(world: &mut ReconWorld, order_id: String, txn: String) {
    authorize(world, order_id, txn, None, None).await;
}

#[when(expr = "an authorization for order {word} arrives with txn {word}, CVV {word} and AVS {word}")]
async fn authorization_with_signals(world: &mut ReconWorld, order_id: String, txn: String, cvv: String, avs: String) {
    authorize(world, order_id, txn, Some(cvv), Some(avs)).await;
}

#[when(expr = "a capture confirmation for order {word} arrives with txn {word}")]
async fn capture_confirmation(world: &mut ReconWorld, order_id: String, txn: String) {
    let job = RecordCapture { gateway: "x".into(), order_id, gateway_txn_id: txn, event_date: chrono::Utc::now() };
    let sys = world.system();
    let ctx = JobContext::new(&sys.db, &sys.context, &sys.processor);
    job.run(&ctx).await.expect("Error recording capture");
}

#[then(expr = "the verdict is {word}")]
async fn verdict_is(world: &mut ReconWorld, expected: String) {
    let verdict = match &world.system().last_result {
        Some(Ok(v)) => *v,
        other => panic!("Expected a verdict, got {other:?}"),
    };
    let expected = match expected.as_str() {
        "PROCESS" => Verdict::Process,
        "REVIEW" => Verdict::Review,
        "REJECT" => Verdict::Reject,
        "DUPLICATE" => Verdict::Duplicate,
        "IGNORE" => Verdict::Ignore,
        "MISSING" => Verdict::Missing,
        s => panic!("Unknown verdict {s}"),
    };
    assert_eq!(verdict, expected);
}

#[then("the job asks to be retried")]
async fn job_is_transient(world: &mut ReconWorld) {
    let result = &world.system().last_result;
    assert!(
        matches!(result, Some(Err(recon_engine::jobs::JobError::Transient(_)))),
        "Expected a transient failure, got {result:?}"
    );
}

#[then(expr = "the processor received {int} capture call(s)")]
async fn capture_calls(world: &mut ReconWorld, count: usize) {
    assert_eq!(world.system().processor.capture_calls(), count);
}

#[then(expr = "txn {word} was cancelled")]
async fn cancelled(world: &mut ReconWorld, txn: String) {
    assert!(world.system().processor.cancelled().contains(&txn), "{txn} was not cancelled");
}

#[then("nothing was cancelled")]
async fn nothing_cancelled(world: &mut ReconWorld) {
    assert!(world.system().processor.cancelled().is_empty());
}

#[then(expr = "order {word} is captured with txn {word}")]
async fn order_captured(world: &mut ReconWorld, order_id: String, txn: String) {
    let record = world.db().fetch_by_order_id("x", &order_id).await.expect("Error fetching record").expect("No record");
    assert!(record.captured);
    assert_eq!(record.gateway_txn_id.as_deref(), Some(txn.as_str()));
}

#[then(expr = "order {word} is pending and not captured")]
async fn order_pending(world: &mut ReconWorld, order_id: String) {
    let record = world.db().fetch_by_order_id("x", &order_id).await.expect("Error fetching record").expect("No record");
    assert!(!record.captured);
    assert!(record.capture_claim.is_none());
}

#[then(expr = "order {word} has no pending record")]
async fn order_gone(world: &mut ReconWorld, order_id: String) {
    let record = world.db().fetch_by_order_id("x", &order_id).await.expect("Error fetching record");
    assert!(record.is_none());
}

#[then(expr = "the {word} queue has {int} message(s)")]
async fn queue_length(world: &mut ReconWorld, queue: String, count: u64) {
    assert_eq!(world.db().queue_length(&queue).await.expect("Error reading queue"), count);
}

#[then(expr = "the antifraud record shows CVV {float}, AVS {float} and action {word}")]
async fn antifraud_record(world: &mut ReconWorld, cvv: f64, avs: f64, action: String) {
    let msg = world
        .db()
        .pop(ANTIFRAUD_QUEUE, Duration::from_secs(30))
        .await
        .expect("Error reading queue")
        .expect("No antifraud message");
    assert_eq!(msg.body["score_breakdown"]["cvv"], cvv);
    assert_eq!(msg.body["score_breakdown"]["avs"], avs);
    assert_eq!(msg.body["validation_action"], action.as_str());
}

#[then(expr = "the donation for txn {word} is {word} {word}")]
async fn donation(world: &mut ReconWorld, txn: String, gross: String, currency: String) {
    let msg = world
        .db()
        .pop("donations", Duration::from_secs(30))
        .await
        .expect("Error reading queue")
        .expect("No donation message");
    assert_eq!(msg.body["gateway_txn_id"], txn.as_str());
    assert_eq!(msg.body["gross"], gross.as_str());
    assert_eq!(msg.body["currency"], currency.as_str());
}
