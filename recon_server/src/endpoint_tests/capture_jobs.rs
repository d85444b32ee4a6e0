//! Deliveries taken in over HTTP, then worked off by a queue consumer talking to a mocked processor.
use actix_web::http::StatusCode;
use recon_common::MinorUnits;
use recon_engine::{
    db_types::NewPendingRecord,
    traits::{CaptureResponse, JobQueue, PendingStore, ProcessorError},
    worker::QueueConsumer,
    ProcessorDirectory,
    SqliteDatabase,
};
use serde_json::json;

use super::{
    helpers::{authorization, new_database, post_delivery, test_config, Call},
    mocks::MockProcessor,
};

async fn authorize(db: &SqliteDatabase, txn: &str, order_id: &str) {
    let record = NewPendingRecord::new("gravy", order_id, MinorUnits::from(2500), "USD").with_payment_method("cc");
    db.store_pending(record).await.expect("Could not store pending record");
    authorize_again(db, txn, order_id).await;
}

async fn authorize_again(db: &SqliteDatabase, txn: &str, order_id: &str) {
    let (status, _) = post_delivery(&test_config(), db, Call::signed("/listener/gravy", &authorization(txn, order_id))).await;
    assert_eq!(status, StatusCode::OK);
}

fn consumer(db: &SqliteDatabase, processor: MockProcessor) -> QueueConsumer<SqliteDatabase, MockProcessor> {
    let config = test_config();
    let ctx = config.processor_context(&config.processors[0]);
    QueueConsumer::new(db.clone(), ProcessorDirectory::new().with_processor(ctx, processor))
}

#[actix_web::test]
async fn authorization_is_captured_once() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    authorize(&db, "tx-1", "1001.1").await;
    // The processor redelivers the same notification
    authorize_again(&db, "tx-1", "1001.1").await;

    let mut processor = MockProcessor::new();
    processor.expect_capture().times(1).returning(|req| {
        assert_eq!(req.gateway_txn_id, "tx-1");
        assert_eq!(req.amount, MinorUnits::from(2500));
        Ok(CaptureResponse { gateway_txn_id: req.gateway_txn_id.clone(), status: "captured".into() })
    });
    let summary = consumer(&db, processor).run_batch().await.unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.damaged, 0);

    let record = db.fetch_by_order_id("gravy", "1001.1").await.unwrap().unwrap();
    assert!(record.captured);
    assert_eq!(record.gateway_txn_id.as_deref(), Some("tx-1"));
    // Only the first job scored the attempt
    assert_eq!(db.queue_length("payments-antifraud").await.unwrap(), 1);
}

#[actix_web::test]
async fn declined_capture_is_parked_without_retry() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    authorize(&db, "tx-2", "1002.1").await;

    let mut processor = MockProcessor::new();
    processor.expect_capture().times(1).returning(|_| Err(ProcessorError::Declined("insufficient funds".into())));
    let summary = consumer(&db, processor).run_batch().await.unwrap();
    assert_eq!(summary.damaged, 1);
    assert_eq!(summary.retrying, 0);

    let record = db.fetch_by_order_id("gravy", "1002.1").await.unwrap().unwrap();
    assert!(!record.captured);
    assert!(record.capture_claim.is_none());
}

#[actix_web::test]
async fn confirmation_publishes_the_donation() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    authorize(&db, "tx-3", "1003.1").await;
    let mut processor = MockProcessor::new();
    processor
        .expect_capture()
        .times(1)
        .returning(|req| Ok(CaptureResponse { gateway_txn_id: req.gateway_txn_id.clone(), status: "ok".into() }));
    let consumer = consumer(&db, processor);
    consumer.run_batch().await.unwrap();

    let confirmation = json!({
        "event_type": "capture",
        "gateway_txn_id": "tx-3",
        "order_id": "1003.1",
        "amount": "25.00",
        "currency": "USD",
        "success": true
    });
    let (status, _) = post_delivery(&test_config(), &db, Call::signed("/listener/gravy", &confirmation)).await;
    assert_eq!(status, StatusCode::OK);
    let summary = consumer.run_batch().await.unwrap();
    assert_eq!(summary.completed, 1);
    assert!(db.fetch_by_order_id("gravy", "1003.1").await.unwrap().is_none());
    let donation = db.pop("donations", std::time::Duration::from_secs(30)).await.unwrap().unwrap();
    assert_eq!(donation.body["gateway_txn_id"], "tx-3");
    assert_eq!(donation.body["gateway"], "gravy");
    assert_eq!(donation.body["order_id"], "1003.1");
    assert_eq!(donation.body["gross"], "25.00");
}
