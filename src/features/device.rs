//! Device-risk extractor (C4.3). Grounded on
//! `original_source/backend/app/features/device_risk.py::DeviceRiskExtractor`: a
//! device seen across too many accounts is itself a risk signal, independent of
//! whether this particular sender looks unusual. Eight components feed the score:
//! tiered multi-account sharing, graph-side risk propagation, a high-risk-neighbor
//! bonus, an OS-family anomaly, capability-mask/OS drift (capped), a flat new-device
//! penalty, a SIM-swap multi-user-in-24h signal, and a new-device + high-amount + MPIN
//! compound.

use async_trait::async_trait;

use crate::config::thresholds as t;
use crate::graph::{queries, Params};
use crate::models::CredentialSubType;

use super::{ExtractionContext, ExtractorOutput, FeatureExtractor};

pub struct DeviceRiskExtractor;

#[async_trait]
impl FeatureExtractor for DeviceRiskExtractor {
    fn name(&self) -> &'static str {
        "device"
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> ExtractorOutput {
        let sender_id = ctx.tx.sender_id();
        let device_id = ctx.tx.device_id();
        let since_window = ctx.now - chrono::Duration::hours(t::DEVICE_MULTI_USER_WINDOW_HOURS);

        let (device_rows, history_rows, users_24h_rows, propagation_rows) = tokio::join!(
            ctx.store.read(queries::QUERY_DEVICE_INFO, Params::new().set("device_id", device_id).build()),
            ctx.store.read(
                queries::QUERY_USER_DEVICE_HISTORY,
                Params::new().set("user_id", sender_id).set("device_id", device_id).build()
            ),
            ctx.store.read(
                queries::QUERY_DEVICE_USERS_24H,
                Params::new().set("device_id", device_id).set("since", since_window.to_rfc3339()).build()
            ),
            ctx.store.read(queries::QUERY_DEVICE_RISK_PROPAGATION, Params::new().set("device_id", device_id).build()),
        );

        let device_row = device_rows.ok().and_then(|rows| rows.into_iter().next());
        let seen_before = history_rows.map(|rows| !rows.is_empty()).unwrap_or(false);
        let is_new_device = !seen_before;
        let device_multi_user_count: i64 = users_24h_rows
            .ok()
            .and_then(|rows| rows.first().and_then(|r| r.get("distinct_users").ok()))
            .unwrap_or(0);
        let propagation = propagation_rows.ok().and_then(|rows| rows.into_iter().next());

        let new_device_high_mpin = is_new_device
            && ctx.tx.amount >= t::NEW_DEVICE_HIGH_AMOUNT_THRESHOLD
            && ctx.tx.credential_sub_type() == Some(CredentialSubType::Mpin);

        // Device never seen in the graph at all: the original runs a dedicated,
        // zeroed-out scoring path rather than treating missing rows as zero for every
        // component below.
        if device_row.is_none() {
            let mut risk = t::NEW_DEVICE_PENALTY;
            let mut flags = vec!["New Device (First Appearance)".to_string()];
            if new_device_high_mpin {
                risk += 15.0;
                flags.push("New Device + High Amount + MPIN".to_string());
            }
            let mut features = std::collections::BTreeMap::new();
            features.insert("account_count".to_string(), 0.0);
            features.insert("new_device_flag".to_string(), 1.0);
            features.insert("cap_mask_anomaly".to_string(), 0.0);
            features.insert("new_device_high_mpin".to_string(), if new_device_high_mpin { 1.0 } else { 0.0 });
            features.insert("device_multi_user_flag".to_string(), 0.0);
            features.insert("device_multi_user_count".to_string(), 0.0);
            return ExtractorOutput {
                risk,
                flags,
                features,
                new_device: true,
                ..Default::default()
            }
            .clamp();
        }

        let device_row = device_row.unwrap();
        let account_count: i64 = device_row.get("account_count").ok().unwrap_or(1);
        let mut risk = 0.0;
        let mut flags = Vec::new();

        // 1. Multi-account sharing, tiered (not additive).
        if account_count as u32 >= t::DEVICE_ACCOUNT_THRESHOLD {
            risk += 40.0;
            flags.push(format!("Shared Device: {account_count} accounts"));
        } else if account_count >= 3 {
            risk += 25.0;
            flags.push(format!("Shared Device: {account_count} accounts"));
        } else if account_count >= 2 {
            risk += 10.0;
            flags.push(format!("Shared Device: {account_count} accounts"));
        }

        // 2. Risk propagation from the graph's own per-device risk aggregate. The
        // propagation query here returns `avg_risk`/`max_risk` rather than a single
        // precomputed `device_risk_score`, so `avg_risk` stands in as that proxy.
        let avg_risk: f64 = propagation.as_ref().and_then(|r| r.get("avg_risk").ok()).unwrap_or(0.0);
        let max_user_risk: f64 = propagation.as_ref().and_then(|r| r.get("max_risk").ok()).unwrap_or(0.0);
        risk += (avg_risk / 100.0).min(1.0) * 25.0;

        // 3. Neighbor bonus: another account on this device already scores very high.
        if max_user_risk > 80.0 {
            risk += 10.0;
            flags.push("Device Linked to High-Risk User".to_string());
        }

        // 4. OS anomaly: effective OS is neither an Android nor an iOS family.
        let effective_os = device_row.get::<String>("os").ok().or_else(|| ctx.tx.device_os().map(str::to_string));
        let os_anomaly = match &effective_os {
            Some(os) => {
                let lowered = os.to_lowercase();
                !lowered.starts_with("android") && !lowered.starts_with("ios")
            }
            None => false,
        };
        if os_anomaly {
            if let Some(os) = &effective_os {
                flags.push(format!("Unsupported Device OS: {os}"));
            }
            risk += 10.0;
        }

        // 5. New-device-for-user penalty (component 6 in the original's own numbering;
        // grouped here with OS/drift since it shares the device_row path).
        if is_new_device {
            risk += t::NEW_DEVICE_PENALTY;
            flags.push("New Device for User".to_string());
        }

        // 6. Device drift: OS-family change plus capability-mask Hamming distance,
        // capped at 15 total.
        let stored_os_family = device_row.get::<String>("os").ok().map(|os| first_word(&os).to_lowercase());
        let reported_os_family = ctx.tx.device_os().map(|os| first_word(os).to_lowercase());
        let os_family_changed = match (&stored_os_family, &reported_os_family) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        };

        let stored_mask: Option<String> = device_row.get("capability_mask").ok();
        let reported_mask = ctx.tx.capability_mask();
        let cap_mask_anomaly: i64 = match (&stored_mask, reported_mask) {
            (Some(stored), Some(reported)) if stored != reported => hamming_distance(stored, reported) as i64,
            _ => 0,
        };

        let mut drift_score = 0.0;
        if os_family_changed {
            drift_score += 5.0;
        }
        if cap_mask_anomaly > 0 {
            drift_score += (cap_mask_anomaly as f64 * t::CAPABILITY_MASK_CHANGE_WEIGHT * 0.3).min(5.0);
            flags.push(format!("Capability Mask Changed (Hamming={cap_mask_anomaly})"));
        }
        risk += drift_score.min(15.0);

        // 7. New-device + high-amount + MPIN compound.
        if new_device_high_mpin {
            risk += 15.0;
            flags.push("New Device + High Amount + MPIN".to_string());
        }

        // 8. SIM-swap: distinct users on this device within the lookback window.
        let device_multi_user_flag = device_multi_user_count as u32 > t::DEVICE_MULTI_USER_THRESHOLD;
        if device_multi_user_flag {
            risk += t::DEVICE_MULTI_USER_PENALTY;
            flags.push(format!("SIM-Swap: {device_multi_user_count} users on device in 24h"));
        }

        // Drift detail, appended last: the original trails its flag list with any
        // OS-family-change note once the headline components have already fired.
        if os_family_changed {
            flags.push("Device OS family changed since last registration".to_string());
        }

        let mut features = std::collections::BTreeMap::new();
        features.insert("account_count".to_string(), account_count as f64);
        features.insert("new_device_flag".to_string(), if is_new_device { 1.0 } else { 0.0 });
        features.insert("cap_mask_anomaly".to_string(), cap_mask_anomaly as f64);
        features.insert("new_device_high_mpin".to_string(), if new_device_high_mpin { 1.0 } else { 0.0 });
        features.insert("device_multi_user_flag".to_string(), if device_multi_user_flag { 1.0 } else { 0.0 });
        features.insert("device_multi_user_count".to_string(), device_multi_user_count as f64);

        ExtractorOutput {
            risk,
            flags,
            features,
            new_device: is_new_device,
            ..Default::default()
        }
        .clamp()
    }
}

fn first_word(s: &str) -> &str {
    s.split(|c: char| !c.is_alphanumeric()).next().unwrap_or(s)
}

/// Hamming distance between two bitstrings, zero-padding the shorter on the left to
/// match lengths before comparing (mirrors `_hamming_distance`'s `zfill` behavior).
fn hamming_distance(a: &str, b: &str) -> usize {
    let width = a.len().max(b.len());
    let pad = |s: &str| format!("{:0>width$}", s, width = width);
    let (a, b) = (pad(a), pad(b));
    a.chars().zip(b.chars()).filter(|(x, y)| x != y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn::AsnClassifier;
    use crate::features::test_support::{sample_tx, StubStore};

    #[tokio::test]
    async fn never_seen_device_is_flagged_new() {
        let store = StubStore::empty();
        let asn = AsnClassifier::new("unused.mmdb");
        let tx = sample_tx();
        let ctx = ExtractionContext {
            store: &store,
            asn: &asn,
            tx: &tx,
            now: chrono::Utc::now(),
        };
        let out = DeviceRiskExtractor.extract(&ctx).await;
        assert!(out.new_device);
        assert!(out.flags.iter().any(|f| f.contains("First Appearance")));
    }

    #[test]
    fn hamming_distance_counts_mismatches() {
        assert_eq!(hamming_distance("1010", "1010"), 0);
        assert_eq!(hamming_distance("1010", "1111"), 2);
        assert_eq!(hamming_distance("10", "101"), 3);
    }

    #[test]
    fn first_word_splits_on_punctuation() {
        assert_eq!(first_word("Android 14"), "Android");
        assert_eq!(first_word("iOS-17.2"), "iOS");
    }
}
