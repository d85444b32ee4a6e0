use actix_web::{http::StatusCode, test, App};
use recon_common::Secret;
use recon_engine::traits::JobQueue;
use serde_json::json;

use super::helpers::{authorization, new_database, post_delivery, test_config, Call, FORBIDDEN_PEER};
use crate::{routes::health, server::decoder_registry};

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let app = test::init_service(App::new().service(health)).await;
    let res = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn signed_delivery_is_accepted() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let config = test_config();
    let call = Call::signed("/listener/gravy", &authorization("tx-1", "1001.1"));
    let (status, body) = post_delivery(&config, &db, call).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[accepted]");
    assert_eq!(db.queue_length("jobs-gravy").await.unwrap(), 1);
}

#[actix_web::test]
async fn malformed_sibling_does_not_block_the_batch() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let config = test_config();
    let payload = json!([
        authorization("tx-1", "1001.1"),
        { "event_type": "authorization", "success": true },
        {
            "event_type": "refund",
            "gateway_txn_id": "rf-9",
            "parent_txn_id": "tx-0",
            "amount": "5.00",
            "currency": "USD",
            "success": true
        }
    ]);
    let (status, body) = post_delivery(&config, &db, Call::signed("/listener/gravy", &payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[accepted]");
    assert_eq!(db.queue_length("jobs-gravy").await.unwrap(), 1);
    assert_eq!(db.queue_length("refund").await.unwrap(), 1);
}

#[actix_web::test]
async fn unparseable_delivery_is_still_acknowledged() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let config = test_config();
    let (status, body) = post_delivery(&config, &db, Call::signed("/listener/gravy", &json!("not a notification"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[accepted]");
    assert_eq!(db.queue_length("jobs-gravy").await.unwrap(), 0);
}

#[actix_web::test]
async fn bad_signature_is_refused() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let config = test_config();
    let call = Call::signed("/listener/gravy", &authorization("tx-1", "1001.1"))
        .with_signature(Some("bm90IHRoZSByaWdodCBzaWduYXR1cmU=".into()));
    let (status, body) = post_delivery(&config, &db, call).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("\"error\""));
    assert!(!body.contains("tx-1"), "The refusal must not echo the payload: {body}");
    assert_eq!(db.queue_length("jobs-gravy").await.unwrap(), 0);
}

#[actix_web::test]
async fn missing_signature_is_refused() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let config = test_config();
    let call = Call::signed("/listener/gravy", &authorization("tx-1", "1001.1")).with_signature(None);
    let (status, _) = post_delivery(&config, &db, call).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(db.queue_length("jobs-gravy").await.unwrap(), 0);
}

#[actix_web::test]
async fn unlisted_peer_is_refused() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let config = test_config();
    let call = Call::signed("/listener/gravy", &authorization("tx-1", "1001.1")).from_peer(FORBIDDEN_PEER);
    let (status, body) = post_delivery(&config, &db, call).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!body.contains("tx-1"));
    assert_eq!(db.queue_length("jobs-gravy").await.unwrap(), 0);
}

#[actix_web::test]
async fn forwarded_address_is_used_when_enabled() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let mut config = test_config();
    let call = || {
        Call::signed("/listener/gravy", &authorization("tx-1", "1001.1"))
            .from_peer("127.0.0.1:50000")
            .with_header("X-Forwarded-For", "10.9.9.9")
    };
    let (status, _) = post_delivery(&config, &db, call()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    config.use_x_forwarded_for = true;
    let (status, _) = post_delivery(&config, &db, call()).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn processor_without_secret_refuses_everything() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let mut config = test_config();
    config.processors[0].hmac_secret = Secret::default();
    let (status, _) = post_delivery(&config, &db, Call::signed("/listener/gravy", &authorization("tx-1", "1"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn disabled_hmac_checks() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let mut config = test_config();
    config.processors[0].hmac_checks = false;
    let call = Call::signed("/listener/gravy", &authorization("tx-1", "1001.1")).with_signature(None);
    let (status, _) = post_delivery(&config, &db, call).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn unknown_processor() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let config = test_config();
    let (status, body) = post_delivery(&config, &db, Call::signed("/listener/paypal", &json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("paypal"));
}

#[actix_web::test]
async fn processor_with_unknown_decoder_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let db = new_database().await;
    let mut config = test_config();
    config.processors[0].decoder = "worldpay".into();
    let decoders = decoder_registry(&config);
    assert!(decoders.contains("canonical"));
    assert!(!decoders.contains("worldpay"));
    let (status, body) =
        post_delivery(&config, &db, Call::signed("/listener/gravy", &authorization("tx-1", "1001.1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[accepted]");
    assert_eq!(db.queue_length("jobs-gravy").await.unwrap(), 0);
}
