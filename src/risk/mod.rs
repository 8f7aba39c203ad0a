//! Risk fusion engine (C6). Grounded on
//! `original_source/backend/app/core/risk_engine.py::RiskEngine.score_transaction`:
//! runs the five feature extractors concurrently, fuses their sub-scores with the
//! documented weights, applies the circadian/new-device compound boost, folds in
//! whatever the collusive cache already knows about the sender, and classifies. This
//! module is pure with respect to the graph: it reads through [`crate::graph::GraphStore`]
//! but never writes — write-back is C9's job once it decides to keep the result.

pub mod mule;

use std::collections::BTreeMap;

use futures_util::future::join_all;

use crate::asn::AsnClassifier;
use crate::collusive::CollusiveCache;
use crate::config::thresholds as t;
use crate::features::{default_extractors, ExtractionContext, ExtractorOutput};
use crate::graph::GraphStore;
use crate::models::{RiskLevel, SubScores, TransactionInput, TransactionResult};

use mule::MuleClassifier;

pub struct RiskFusionEngine<'a> {
    store: &'a dyn GraphStore,
    asn: &'a AsnClassifier,
    collusive: &'a CollusiveCache,
    high_risk_threshold: f64,
    medium_risk_threshold: f64,
}

impl<'a> RiskFusionEngine<'a> {
    pub fn new(store: &'a dyn GraphStore, asn: &'a AsnClassifier, collusive: &'a CollusiveCache, high_risk_threshold: f64, medium_risk_threshold: f64) -> Self {
        RiskFusionEngine {
            store,
            asn,
            collusive,
            high_risk_threshold,
            medium_risk_threshold,
        }
    }

    pub async fn score(&self, tx: &TransactionInput) -> TransactionResult {
        let ctx = ExtractionContext {
            store: self.store,
            asn: self.asn,
            tx,
            now: chrono::Utc::now(),
        };

        let extractors = default_extractors();
        let outputs: Vec<ExtractorOutput> = join_all(extractors.iter().map(|e| e.extract(&ctx))).await;

        let mut by_name: BTreeMap<&'static str, &ExtractorOutput> = BTreeMap::new();
        for (extractor, output) in extractors.iter().zip(outputs.iter()) {
            by_name.insert(extractor.name(), output);
        }

        let graph_risk = by_name.get("graph_intelligence").map(|o| o.risk).unwrap_or(0.0);
        let behavioral_risk = by_name.get("behavioral").map(|o| o.risk).unwrap_or(0.0);
        let device_risk = by_name.get("device").map(|o| o.risk).unwrap_or(0.0);
        let dormancy_risk = by_name.get("dormancy").map(|o| o.risk).unwrap_or(0.0);
        let velocity_risk = by_name.get("velocity").map(|o| o.risk).unwrap_or(0.0);

        let sub_scores = SubScores {
            graph: graph_risk,
            behavioral: behavioral_risk,
            device: device_risk,
            dormancy: dormancy_risk,
            velocity: velocity_risk,
        };

        let mut fused = t::WEIGHT_GRAPH * graph_risk
            + t::WEIGHT_BEHAVIORAL * behavioral_risk
            + t::WEIGHT_DEVICE * device_risk
            + t::WEIGHT_DEAD_ACCOUNT * dormancy_risk
            + t::WEIGHT_VELOCITY * velocity_risk;

        let circadian_anomaly = by_name.get("behavioral").map(|o| o.circadian_anomaly).unwrap_or(false);
        let new_device = by_name.get("device").map(|o| o.new_device).unwrap_or(false);
        if circadian_anomaly && new_device {
            fused += t::CIRCADIAN_NEW_DEVICE_PENALTY;
        }
        fused = fused.clamp(0.0, 100.0);

        let empty_output = ExtractorOutput::default();
        let behavioral_output = by_name.get("behavioral").copied().unwrap_or(&empty_output);
        let dormancy_output = by_name.get("dormancy").copied().unwrap_or(&empty_output);
        let device_output = by_name.get("device").copied().unwrap_or(&empty_output);
        let graph_output = by_name.get("graph_intelligence").copied().unwrap_or(&empty_output);
        let velocity_output = by_name.get("velocity").copied().unwrap_or(&empty_output);

        let mule_verdict =
            MuleClassifier::evaluate(behavioral_output, dormancy_output, device_output, graph_output, velocity_output, fused);

        let mut flags = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for extractor in &extractors {
            if let Some(output) = by_name.get(extractor.name()) {
                for flag in &output.flags {
                    if seen.insert(flag.clone()) {
                        flags.push(flag.clone());
                    }
                }
            }
        }
        let collusive_flags = self.collusive.user_flags(tx.sender_id());
        for flag in &collusive_flags {
            if seen.insert(flag.clone()) {
                flags.push(flag.clone());
            }
        }
        if mule_verdict.is_mule {
            let headline = format!("MULE SUSPECTED (confidence={:.0}%)", mule_verdict.score * 100.0);
            if seen.insert(headline.clone()) {
                flags.push(headline);
            }
            for reason in &mule_verdict.reasons {
                if seen.insert(reason.clone()) {
                    flags.push(reason.clone());
                }
            }
        }

        let risk_level = RiskLevel::from_score(fused, self.high_risk_threshold, self.medium_risk_threshold);
        let status = risk_level.status();
        let reason = assemble_reason(
            &mule_verdict,
            dormancy_output,
            behavioral_output,
            device_output,
            graph_output,
            &collusive_flags,
            fused,
            self.medium_risk_threshold,
        );

        TransactionResult {
            tx_id: tx.tx_id.clone(),
            risk_score: fused,
            risk_level,
            status,
            reason,
            flags,
            sub_scores,
        }
    }
}

/// Builds the human-readable reason string. Grounded in
/// `original_source/backend/app/core/risk_engine.py::_build_reason`, restructured per
/// the fixed priority order the spec documents: mule suspicion first, then
/// dormancy/first-strike, then the single highest-magnitude behavioral flag, then
/// device compound signals, then graph community membership, then collusive-cache
/// flags. The first three matches across that order are joined with `"; "`.
fn assemble_reason(
    mule_verdict: &mule::MuleVerdict,
    dormancy: &ExtractorOutput,
    behavioral: &ExtractorOutput,
    device: &ExtractorOutput,
    graph: &ExtractorOutput,
    collusive_flags: &[String],
    fused: f64,
    medium_risk_threshold: f64,
) -> String {
    const MAX_REASONS: usize = 3;
    let mut candidates: Vec<String> = Vec::new();

    if mule_verdict.is_mule {
        candidates.push(format!("MULE SUSPECTED (confidence={:.0}%)", mule_verdict.score * 100.0));
        candidates.extend(mule_verdict.reasons.iter().cloned());
    }

    candidates.extend(dormancy.flags.iter().cloned());

    if let Some(top) = &behavioral.top_flag {
        candidates.push(top.clone());
    }

    candidates.extend(device.flags.iter().filter(|f| f.contains("MPIN") || f.contains("SIM-Swap")).cloned());

    candidates.extend(graph.flags.iter().filter(|f| f.contains("community") || f.contains("cluster")).cloned());

    candidates.extend(collusive_flags.iter().cloned());

    let mut seen = std::collections::HashSet::new();
    let deduped: Vec<String> = candidates.into_iter().filter(|c| seen.insert(c.clone())).collect();

    if deduped.is_empty() {
        return if fused >= medium_risk_threshold {
            "Multiple minor indicators combined above threshold".to_string()
        } else {
            "No significant risk indicators".to_string()
        };
    }

    deduped.into_iter().take(MAX_REASONS).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{sample_tx, StubStore};

    #[tokio::test]
    async fn empty_graph_scores_low_with_no_anomaly_reason() {
        let store = StubStore::empty();
        let asn = AsnClassifier::new("unused.mmdb");
        let collusive = CollusiveCache::new();
        let engine = RiskFusionEngine::new(&store, &asn, &collusive, 70.0, 40.0);
        let tx = sample_tx();
        let result = engine.score(&tx).await;
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.reason, "No significant risk indicators");
    }

    #[test]
    fn reason_falls_back_when_nothing_matches_but_risk_is_medium() {
        let empty = ExtractorOutput::default();
        let verdict = mule::MuleVerdict {
            is_mule: false,
            score: 0.0,
            reasons: vec![],
        };
        let reason = assemble_reason(&verdict, &empty, &empty, &empty, &empty, &[], 55.0, 40.0);
        assert_eq!(reason, "Multiple minor indicators combined above threshold");
    }

    #[test]
    fn reason_caps_at_three_matches_and_puts_mule_first() {
        let mut dormancy = ExtractorOutput::default();
        dormancy.flags.push("First-Strike: Dormant 40d \u{2192} active".to_string());
        let mut graph = ExtractorOutput::default();
        graph.flags.push("Part of high-risk community 7 (12 members, avg risk 80)".to_string());
        let empty = ExtractorOutput::default();
        let verdict = mule::MuleVerdict {
            is_mule: true,
            score: 0.72,
            reasons: vec!["First-strike: dormant 40d \u{2192} suddenly active".to_string()],
        };
        let reason = assemble_reason(&verdict, &dormancy, &empty, &empty, &graph, &[], 80.0, 40.0);
        let parts: Vec<&str> = reason.split("; ").collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].starts_with("MULE SUSPECTED"));
    }
}
