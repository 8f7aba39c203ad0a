//! Velocity extractor (C4.5). Grounded on
//! `original_source/backend/app/features/velocity.py::VelocityFeatureExtractor`: counts
//! and sums outgoing/incoming transactions in a short rolling window to catch burst
//! spending and pass-through (in-and-immediately-out) mule behavior.

use async_trait::async_trait;

use crate::config::thresholds as t;
use crate::graph::{queries, Params};

use super::{ExtractionContext, ExtractorOutput, FeatureExtractor};

pub struct VelocityExtractor;

#[async_trait]
impl FeatureExtractor for VelocityExtractor {
    fn name(&self) -> &'static str {
        "velocity"
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> ExtractorOutput {
        let since = ctx.now - chrono::Duration::seconds(t::VELOCITY_WINDOW_SEC);
        let rows = ctx
            .store
            .read(
                queries::QUERY_VELOCITY_FEATURES,
                Params::new().set("user_id", ctx.tx.sender_id()).set("since", since.to_rfc3339()).build(),
            )
            .await
            .unwrap_or_default();

        let Some(row) = rows.first() else {
            return ExtractorOutput::default();
        };

        let out_count: i64 = row.get("out_count").unwrap_or(0);
        let in_count: i64 = row.get("in_count").unwrap_or(0);
        let total_out: f64 = row.get("total_out").unwrap_or(0.0);
        let total_in: f64 = row.get("total_in").unwrap_or(0.0);
        let total_activity = out_count + in_count;

        let mut risk = 0.0;
        let mut flags = Vec::new();

        // Burst: tiered on combined in+out activity inside the window.
        let burst_score = if total_activity as u32 >= t::BURST_TX_THRESHOLD {
            30.0
        } else if total_activity as u32 >= t::BURST_TX_THRESHOLD / 2 {
            15.0
        } else {
            0.0
        };
        risk += burst_score;
        if burst_score >= 30.0 {
            flags.push("Transaction Burst Detected".to_string());
        }

        // Pass-through: money arrives and is routed straight back out, a classic mule
        // relay pattern. Continuous above the threshold, a flat mid-tier above 0.5.
        let outflow_inflow_ratio = if total_in > 0.0 { total_out / total_in } else { 0.0 };
        let pass_through_score = if total_in > 0.0 {
            if outflow_inflow_ratio > t::PASS_THROUGH_RATIO_THRESHOLD {
                (outflow_inflow_ratio / 1.5).min(1.0) * 35.0
            } else if outflow_inflow_ratio > 0.5 {
                10.0
            } else {
                0.0
            }
        } else {
            0.0
        };
        risk += pass_through_score;
        if pass_through_score > 25.0 {
            flags.push("Rapid Pass-Through Pattern".to_string());
        }

        // Raw velocity: transactions-per-minute scaled into the window.
        let tx_per_min = total_activity as f64 / (t::VELOCITY_WINDOW_SEC as f64 / 60.0).max(1.0);
        let velocity_score = (tx_per_min / 10.0).min(1.0) * 20.0;
        risk += velocity_score;
        if tx_per_min > 5.0 {
            flags.push(format!("High Velocity: {tx_per_min:.1} tx/min"));
        }

        // Single-tx ratio: this transaction's outsized share of the window's outflow.
        let single_tx_ratio = if total_out > 0.0 { ctx.tx.amount / total_out } else { 0.0 };
        let single_tx_score = if single_tx_ratio > 0.8 { 15.0 } else { 0.0 };
        risk += single_tx_score;

        let mut features = std::collections::BTreeMap::new();
        features.insert("out_count".to_string(), out_count as f64);
        features.insert("in_count".to_string(), in_count as f64);
        features.insert("outflow_inflow_ratio".to_string(), outflow_inflow_ratio);
        features.insert("single_tx_ratio".to_string(), single_tx_ratio);
        features.insert("tx_per_min".to_string(), tx_per_min);

        ExtractorOutput {
            risk,
            flags,
            features,
            ..Default::default()
        }
        .clamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn::AsnClassifier;
    use crate::features::test_support::{sample_tx, StubStore};

    #[tokio::test]
    async fn empty_window_produces_zero_risk() {
        let store = StubStore::empty();
        let asn = AsnClassifier::new("unused.mmdb");
        let tx = sample_tx();
        let ctx = ExtractionContext {
            store: &store,
            asn: &asn,
            tx: &tx,
            now: chrono::Utc::now(),
        };
        let out = VelocityExtractor.extract(&ctx).await;
        assert_eq!(out.risk, 0.0);
    }
}
