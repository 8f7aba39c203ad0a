//! End-to-end scoring scenarios driven entirely through the public API: a `GraphStore`
//! impl that hands back canned rows, fed to `RiskFusionEngine::score`. Grounded on the
//! six worked scenarios in SPEC_FULL.md §9 (clean transaction, velocity burst, dormant
//! wakeup, new-device circadian compound, mule threshold, collusive-cache flag carry).
//!
//! `ScriptedStore::read` returns real `neo4rs::Row` values, and `Row` has no public
//! constructor outside the Bolt driver itself — only an empty result set can be
//! scripted here. Scenarios whose signals depend on populated graph rows (dormant
//! wakeup, velocity burst, circadian compound, the graph/device/dormancy inputs to the
//! mule threshold) are instead covered at the unit level against synthesized
//! `ExtractorOutput`s in `risk::mule::tests` and `risk::tests`. What this file can
//! exercise end-to-end is the empty-graph path plus any signal driven purely off the
//! transaction payload itself, such as the new-device + high-amount + MPIN compound.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use neo4rs::Row;

use sentry_mesh::asn::AsnClassifier;
use sentry_mesh::collusive::CollusiveCache;
use sentry_mesh::error::GraphError;
use sentry_mesh::graph::{GraphStore, HealthReport, QueryParams};
use sentry_mesh::models::{Credential, CredentialSubType, Receiver, Sender, SenderDevice, TransactionInput, TxnType};
use sentry_mesh::risk::RiskFusionEngine;

/// A `GraphStore` double that returns a fixed row set keyed on a substring of the
/// query text, so each scenario can script only the reads its extractors will issue.
struct ScriptedStore {
    by_query_substring: Mutex<Vec<(&'static str, Vec<Row>)>>,
}

impl ScriptedStore {
    fn new(scripts: Vec<(&'static str, Vec<Row>)>) -> Self {
        ScriptedStore { by_query_substring: Mutex::new(scripts) }
    }

    fn empty() -> Self {
        ScriptedStore::new(Vec::new())
    }
}

#[async_trait]
impl GraphStore for ScriptedStore {
    async fn read(&self, query: &str, _params: QueryParams) -> Result<Vec<Row>, GraphError> {
        let scripts = self.by_query_substring.lock().unwrap();
        for (needle, rows) in scripts.iter() {
            if query.contains(needle) {
                // `Row` has no public constructor or `Clone` impl outside the Bolt driver,
                // and every script in this file only ever populates an empty `Vec<Row>`.
                debug_assert!(rows.is_empty());
                return Ok(Vec::new());
            }
        }
        Ok(Vec::new())
    }

    async fn write(&self, _query: &str, _params: QueryParams) -> Result<Vec<Row>, GraphError> {
        Ok(Vec::new())
    }

    async fn bootstrap_schema(&self, _constraints: &[&str], _indexes: &[&str]) -> Result<(), GraphError> {
        Ok(())
    }

    async fn health(&self) -> Result<HealthReport, GraphError> {
        Ok(HealthReport::default())
    }
}

fn plain_tx(sender_id: &str, receiver_id: &str, amount: f64) -> TransactionInput {
    TransactionInput {
        tx_id: format!("tx-{sender_id}-{receiver_id}"),
        timestamp: Utc::now(),
        amount,
        currency: "INR".into(),
        txn_type: TxnType::Pay,
        sender: Sender { sender_id: sender_id.into(), ..Default::default() },
        credential: None,
        receiver: Receiver { receiver_id: receiver_id.into(), ..Default::default() },
        _meta: serde_json::Map::new(),
    }
}

#[tokio::test]
async fn clean_transaction_against_an_empty_graph_scores_low() {
    let store = ScriptedStore::empty();
    let asn = AsnClassifier::new("unused.mmdb");
    let collusive = CollusiveCache::new();
    let engine = RiskFusionEngine::new(&store, &asn, &collusive, 70.0, 40.0);

    let result = engine.score(&plain_tx("U1", "U2", 250.0)).await;

    assert_eq!(result.risk_score, 0.0);
    assert!(result.flags.is_empty());
    assert_eq!(result.reason, "No significant risk indicators");
}

#[tokio::test]
async fn new_device_high_amount_mpin_raises_the_compound_flag() {
    let store = ScriptedStore::empty();
    let asn = AsnClassifier::new("unused.mmdb");
    let collusive = CollusiveCache::new();
    let engine = RiskFusionEngine::new(&store, &asn, &collusive, 70.0, 40.0);

    let mut tx = plain_tx("U5", "U6", 50_000.0);
    tx.sender.device = Some(SenderDevice {
        device_id: Some("D1".into()),
        ..Default::default()
    });
    tx.credential = Some(Credential {
        credential_type: None,
        sub_type: Some(CredentialSubType::Mpin),
    });

    let result = engine.score(&tx).await;

    assert!(result.flags.iter().any(|f| f.contains("New Device + High Amount + MPIN")));
}

#[tokio::test]
async fn collusive_cache_flags_carry_into_the_scored_result_even_with_no_extractor_signal() {
    let store = ScriptedStore::empty();
    let asn = AsnClassifier::new("unused.mmdb");
    let collusive = CollusiveCache::new();
    // The cache only ever gets populated by `refresh()` against a real graph; here we
    // exercise the carry-through path by refreshing against the same empty store and
    // confirming the empty snapshot doesn't inject spurious flags.
    let failures = collusive.refresh(&store, Utc::now()).await;
    assert_eq!(collusive.user_flags("U1").len(), 0);

    let engine = RiskFusionEngine::new(&store, &asn, &collusive, 70.0, 40.0);
    let result = engine.score(&plain_tx("U1", "U2", 100.0)).await;

    assert!(result.flags.is_empty());
    assert!(failures <= 6, "refresh should tolerate every DETECT_* query failing independently");
}

#[tokio::test]
async fn high_amount_against_a_thin_history_still_resolves_to_a_risk_level() {
    let store = ScriptedStore::empty();
    let asn = AsnClassifier::new("unused.mmdb");
    let collusive = CollusiveCache::new();
    let engine = RiskFusionEngine::new(&store, &asn, &collusive, 70.0, 40.0);

    let result = engine.score(&plain_tx("U3", "U4", 5_000_000.0)).await;

    // No history to compare against means no amount-spike signal fires (behavioral's
    // z-score needs at least two prior points); the transaction still resolves cleanly
    // rather than panicking on the edge case of a first-ever transaction.
    assert_eq!(result.risk_level.status(), sentry_mesh::models::TransactionStatus::Completed);
}

#[test]
fn query_params_map_survives_a_round_trip_through_the_public_builder() {
    let params = sentry_mesh::graph::Params::new().set("user_id", "U1").set("amount", 42.5).build();
    assert_eq!(params.len(), 2);
}
