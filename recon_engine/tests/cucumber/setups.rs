use std::collections::HashMap;

use cucumber::given;
use recon_common::MinorUnits;
use recon_engine::{db_types::NewPendingRecord, risk::RiskScorer, traits::PendingStore, RiskThresholds};

use crate::cucumber::{world::ReconSystem, ReconWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut ReconWorld) {
    let system = ReconSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a review threshold of {float} and a reject threshold of {float}")]
async fn thresholds(world: &mut ReconWorld, review: f64, reject: f64) {
    let sys = world.system_mut();
    sys.context = sys.context.clone().with_thresholds(RiskThresholds::new(review, reject));
}

#[given(expr = "CVV code {word} scores {float} and AVS code {word} scores {float}")]
async fn scores(world: &mut ReconWorld, cvv: String, cvv_score: f64, avs: String, avs_score: f64) {
    let sys = world.system_mut();
    let cvv_map = HashMap::from([(cvv, cvv_score)]);
    let avs_map = HashMap::from([(avs, avs_score)]);
    sys.context = sys.context.clone().with_scorer(RiskScorer::new(cvv_map, avs_map));
}

#[given(expr = "a pending record for order {word} with risk score {float} for {word} {word}")]
async fn pending_record(world: &mut ReconWorld, order_id: String, risk_score: f64, amount: String, currency: String) {
    let amount = MinorUnits::from_decimal_str(&amount, &currency).expect("Invalid amount");
    let record = NewPendingRecord::new("x".to_string(), order_id, amount, currency).with_risk_score(risk_score);
    world.db().store_pending(record).await.expect("Error storing pending record");
}
