//! Money-mule classifier, a sub-component of C6. Grounded on
//! `original_source/backend/app/detection/mule_detection.py::MuleDetector.evaluate`:
//! this module computes no sub-score of its own — it aggregates the five feature
//! extractors' outputs and applies a weighted-hit accumulator over ~15 discrete
//! boolean signals, each carrying its own human-readable reason.

use crate::config::thresholds as t;
use crate::features::ExtractorOutput;

#[derive(Debug, Clone, PartialEq)]
pub struct MuleVerdict {
    pub is_mule: bool,
    pub score: f64,
    pub reasons: Vec<String>,
}

pub struct MuleClassifier;

impl MuleClassifier {
    /// Weighted-hit accumulation over the five extractors' discrete signals (read out
    /// of their `features` maps), exactly mirroring `MuleDetector.evaluate`'s branch
    /// order and weights.
    pub fn evaluate(
        behavioral: &ExtractorOutput,
        dormancy: &ExtractorOutput,
        device: &ExtractorOutput,
        graph: &ExtractorOutput,
        velocity: &ExtractorOutput,
        fused_risk: f64,
    ) -> MuleVerdict {
        let f = |out: &ExtractorOutput, key: &str| out.features.get(key).copied().unwrap_or(0.0);
        let flag = |out: &ExtractorOutput, key: &str| f(out, key) != 0.0;

        let mut reasons: Vec<String> = Vec::new();
        let mut score: f64 = 0.0;

        // First-strike dormant activation.
        let is_first_strike = flag(dormancy, "is_first_strike");
        let is_dormant = flag(dormancy, "is_dormant");
        if is_first_strike {
            score += 0.30;
            let days = f(dormancy, "days_slept");
            reasons.push(format!("First-strike: dormant {}d \u{2192} suddenly active", days as i64));
        } else if is_dormant && dormancy.risk > 40.0 {
            score += 0.25;
            reasons.push("Dormant account activated with suspicious inflow".to_string());
        }

        // Sleep-and-flash mule (woken mule).
        if flag(dormancy, "sleep_flash_flag") {
            score += 0.25;
            let ratio = f(dormancy, "sleep_flash_ratio");
            reasons.push(format!("Sleep-and-flash mule: amount {ratio:.0}x historical avg, dormant >30d"));
        }

        // High pass-through (relay pattern).
        let pt_ratio = f(velocity, "outflow_inflow_ratio");
        if pt_ratio > t::MULE_PASSTHROUGH_THRESHOLD {
            score += 0.20;
            reasons.push(format!("High pass-through ratio ({pt_ratio:.2})"));
        }

        // Shared device.
        let account_count = f(device, "account_count");
        if account_count >= t::MULE_DEVICE_SHARE_THRESHOLD as f64 {
            score += 0.15;
            reasons.push(format!("Device shared across {} accounts", account_count as i64));
        }

        // SIM-swap multi-user device.
        if flag(device, "device_multi_user_flag") {
            score += 0.20;
            let count = f(device, "device_multi_user_count");
            reasons.push(format!("SIM-swap: {} users on same device in 24h", count as i64));
        }

        // Graph cluster membership.
        let community_risk = f(graph, "community_risk");
        if community_risk > 50.0 {
            score += 0.15;
            reasons.push(format!("Member of high-risk cluster (risk={community_risk:.0})"));
        }

        // Relay mule flag from velocity.
        let tx_per_min = f(velocity, "tx_per_min");
        if tx_per_min > 5.0 && pt_ratio > 0.6 {
            score += 0.10;
            reasons.push(format!("Relay pattern: {tx_per_min:.1} tx/min, ratio={pt_ratio:.2}"));
        }

        // Behavioral anomaly.
        if flag(behavioral, "impossible_travel") {
            score += 0.10;
            reasons.push("Impossible travel detected".to_string());
        }
        if flag(behavioral, "spike_flag") {
            score += 0.05;
            reasons.push("Amount spike vs historical baseline".to_string());
        }

        // New device + high amount + MPIN compound.
        let new_device_high_mpin = flag(device, "new_device_high_mpin");
        if new_device_high_mpin {
            score += 0.15;
            reasons.push("New device + high amount + MPIN authentication".to_string());
        }

        // Capability mask anomaly.
        let cap_mask_anomaly = f(device, "cap_mask_anomaly");
        if cap_mask_anomaly >= 2.0 {
            score += 0.08;
            reasons.push(format!("Device capability mask changed (Hamming={})", cap_mask_anomaly as i64));
        }

        // New/unknown device.
        if flag(device, "new_device_flag") && !new_device_high_mpin {
            score += 0.05;
            reasons.push("Transaction from new/unseen device".to_string());
        }

        // IP rotation pattern.
        if flag(behavioral, "ip_rotation_flag") {
            score += 0.08;
            let ip_count = f(behavioral, "ip_rotation_count");
            reasons.push(format!("IP rotation: {} unique IPs in 24h", ip_count as i64));
        }

        // Fixed-amount pattern (structuring).
        if flag(behavioral, "fixed_amount_flag") {
            score += 0.08;
            reasons.push("Fixed-amount pattern (possible structuring)".to_string());
        }

        // Circadian anomaly.
        if behavioral.circadian_anomaly {
            score += 0.10;
            reasons.push("Transaction at unusual hour for user's pattern".to_string());
        }

        // TX identicality index.
        if flag(behavioral, "tx_identicality_flag") {
            score += 0.15;
            let count = f(behavioral, "tx_identicality_count");
            reasons.push(format!("TX identicality: {} identical-amount transfers to same receiver in 1h", count as i64));
        }

        let score = score.min(1.0);
        let is_mule = score >= t::MULE_SCORE_THRESHOLD || fused_risk >= t::MULE_FUSED_RISK_THRESHOLD;

        MuleVerdict { is_mule, score, reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_with(pairs: &[(&str, f64)]) -> ExtractorOutput {
        let mut out = ExtractorOutput::default();
        for (k, v) in pairs {
            out.features.insert(k.to_string(), *v);
        }
        out
    }

    #[test]
    fn low_everything_is_not_a_mule() {
        let empty = ExtractorOutput::default();
        let verdict = MuleClassifier::evaluate(&empty, &empty, &empty, &empty, &empty, 0.0);
        assert!(!verdict.is_mule);
        assert_eq!(verdict.score, 0.0);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn high_fused_risk_alone_triggers_mule() {
        let empty = ExtractorOutput::default();
        let verdict = MuleClassifier::evaluate(&empty, &empty, &empty, &empty, &empty, 70.0);
        assert!(verdict.is_mule);
    }

    #[test]
    fn first_strike_is_the_heaviest_single_signal() {
        let mut dormancy = ExtractorOutput::default();
        dormancy.features.insert("is_first_strike".to_string(), 1.0);
        dormancy.features.insert("days_slept".to_string(), 45.0);
        let empty = ExtractorOutput::default();
        let verdict = MuleClassifier::evaluate(&empty, &dormancy, &empty, &empty, &empty, 0.0);
        assert!((verdict.score - 0.30).abs() < 1e-9);
        assert!(verdict.reasons[0].contains("First-strike"));
    }

    #[test]
    fn combined_signals_cross_the_mule_threshold() {
        let dormancy = output_with(&[("is_first_strike", 1.0), ("days_slept", 40.0)]);
        let device = output_with(&[("device_multi_user_flag", 1.0), ("device_multi_user_count", 4.0)]);
        let empty = ExtractorOutput::default();
        let verdict = MuleClassifier::evaluate(&empty, &dormancy, &device, &empty, &empty, 0.0);
        // 0.30 (first-strike) + 0.20 (SIM-swap) = 0.50 >= MULE_SCORE_THRESHOLD.
        assert!(verdict.is_mule);
        assert!(verdict.reasons.len() == 2);
    }
}
