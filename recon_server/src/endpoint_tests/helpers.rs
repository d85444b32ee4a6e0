use std::net::SocketAddr;

use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use log::debug;
use recon_common::Secret;
use recon_engine::{
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    SqliteDatabase,
};
use serde_json::{json, Value};

use crate::{
    config::{ProcessorConfig, ServerConfig, DEFAULT_HMAC_HEADER},
    helpers::calculate_hmac,
    ip_allowlist::IpAllowlist,
    routes::{health, unknown_listener},
    server::{configure_listeners, decoder_registry, webhook_listener},
};

pub const SECRET: &str = "correct horse battery staple";
pub const ALLOWED_PEER: &str = "10.1.2.3:50000";
pub const FORBIDDEN_PEER: &str = "203.0.113.9:50000";

/// A server with a single `gravy` processor that speaks the canonical format and only accepts deliveries from
/// 10.0.0.0/8.
pub fn test_config() -> ServerConfig {
    let mut gravy = ProcessorConfig::new("gravy");
    gravy.decoder = "canonical".into();
    gravy.hmac_secret = Secret::new(SECRET.to_string());
    gravy.ip_allowlist = IpAllowlist::parse("10.0.0.0/8").unwrap();
    let mut config = ServerConfig::new("127.0.0.1", 8370);
    config.processors = vec![gravy];
    config
}

pub async fn new_database() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Could not open test database")
}

pub fn authorization(txn: &str, order_id: &str) -> Value {
    json!({
        "event_type": "authorization",
        "gateway_txn_id": txn,
        "order_id": order_id,
        "amount": "25.00",
        "currency": "USD",
        "success": true,
        "payment_method": "cc"
    })
}

pub struct Call<'a> {
    pub path: &'a str,
    pub body: String,
    pub peer: &'a str,
    pub signature: Option<String>,
    pub headers: Vec<(&'a str, &'a str)>,
}

impl<'a> Call<'a> {
    /// A correctly signed delivery from an allowed address.
    pub fn signed(path: &'a str, body: &Value) -> Self {
        let body = body.to_string();
        let signature = Some(calculate_hmac(SECRET, body.as_bytes()));
        Self { path, body, peer: ALLOWED_PEER, signature, headers: Vec::new() }
    }

    pub fn from_peer(mut self, peer: &'a str) -> Self {
        self.peer = peer;
        self
    }

    pub fn with_signature(mut self, signature: Option<String>) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_header(mut self, name: &'a str, value: &'a str) -> Self {
        self.headers.push((name, value));
        self
    }
}

pub async fn post_delivery(config: &ServerConfig, db: &SqliteDatabase, call: Call<'_>) -> (StatusCode, String) {
    let listener = webhook_listener(config, db.clone());
    let app = App::new()
        .app_data(web::Data::new(listener))
        .app_data(web::Data::new(decoder_registry(config)))
        .configure(|cfg| configure_listeners::<SqliteDatabase>(cfg, config))
        .service(health)
        .service(unknown_listener);
    let service = test::init_service(app).await;
    let peer = call.peer.parse::<SocketAddr>().unwrap();
    let mut req = TestRequest::post().uri(call.path).peer_addr(peer).set_payload(call.body);
    if let Some(signature) = call.signature {
        req = req.insert_header((DEFAULT_HMAC_HEADER, signature));
    }
    for header in call.headers {
        req = req.insert_header(header);
    }
    debug!("Making request");
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = res.into_body().try_into_bytes().unwrap_or_default();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}
