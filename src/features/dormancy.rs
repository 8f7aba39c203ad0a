//! Dormancy / "dead account" extractor (C4.4). Grounded on
//! `original_source/backend/app/features/dead_account.py::DeadAccountDetector`: tries
//! the wakeup-probe read first (last activity plus a 1h recent-activity rollup in one
//! round trip); an account the probe has never seen falls back to the plain dormancy
//! status read so a brand-new account isn't scored as a "sleeper".

use async_trait::async_trait;

use crate::config::thresholds as t;
use crate::graph::{queries, Params};

use super::{ExtractionContext, ExtractorOutput, FeatureExtractor};

pub struct DormancyExtractor;

#[async_trait]
impl FeatureExtractor for DormancyExtractor {
    fn name(&self) -> &'static str {
        "dormancy"
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> ExtractorOutput {
        let sender_id = ctx.tx.sender_id();
        let since_1h = ctx.now - chrono::Duration::hours(1);

        let wakeup_rows = ctx
            .store
            .read(
                queries::QUERY_DORMANT_WAKEUP,
                Params::new().set("user_id", sender_id).set("since_1h", since_1h.to_rfc3339()).build(),
            )
            .await
            .unwrap_or_default();

        let Some(row) = wakeup_rows.first() else {
            return self.fallback(ctx).await;
        };

        let last_active: Option<chrono::DateTime<chrono::Utc>> = row.get("last_active").ok();
        let avg_tx_amount: f64 = row.get("avg_tx_amount").unwrap_or(0.0);
        let tx_count: i64 = row.get("tx_count").unwrap_or(0);
        let recent_tx_count_1h: i64 = row.get("recent_tx_count_1h").unwrap_or(0);
        let recent_volume_1h: f64 = row.get("recent_volume_1h").unwrap_or(0.0);

        let Some(last_active) = last_active else {
            return self.fallback(ctx).await;
        };

        let days_slept = (ctx.now - last_active).num_seconds() as f64 / 86_400.0;
        let mut flags = Vec::new();

        // Unconditional: any amount of sleep contributes a partial score, capped once
        // the account has been dormant at least the full threshold.
        let inactivity_score = (days_slept / t::DORMANT_DAYS_THRESHOLD).min(1.0) * 30.0;

        let spike_score = if avg_tx_amount > 0.0 {
            (((ctx.tx.amount / avg_tx_amount) / 10.0).min(1.0)) * 30.0
        } else if ctx.tx.amount > 5000.0 {
            25.0
        } else {
            0.0
        };

        let is_dormant = days_slept > t::DORMANT_DAYS_THRESHOLD;
        let is_first_strike = is_dormant && recent_tx_count_1h > 0;
        let is_volume_spike = avg_tx_amount > 0.0 && recent_volume_1h > 5.0 * avg_tx_amount;

        let mut first_strike_bonus: f64 = if is_first_strike { 20.0 } else { 0.0 };
        if is_volume_spike {
            first_strike_bonus = (first_strike_bonus + 10.0).min(25.0);
        }

        let low_activity_bonus = if tx_count <= 3 { 10.0 } else { 0.0 };

        let sleep_flash_ratio = if avg_tx_amount > 0.0 { ctx.tx.amount / avg_tx_amount } else { 0.0 };
        let sleep_flash_flag = sleep_flash_ratio >= t::SLEEP_FLASH_RATIO_THRESHOLD && days_slept >= t::SLEEP_FLASH_DORMANT_DAYS;

        let mut risk = if is_dormant || is_first_strike {
            let mut r = inactivity_score + spike_score + first_strike_bonus + low_activity_bonus;
            if sleep_flash_flag {
                r += 20.0;
            }
            r
        } else {
            spike_score * 0.3
        };
        risk = risk.min(100.0);

        if is_first_strike {
            flags.push(format!("First-Strike: Dormant {}d \u{2192} active", days_slept as i64));
        } else if is_dormant && risk > 40.0 {
            flags.push("Dormant Account Activated".to_string());
        }
        if is_volume_spike {
            flags.push("Volume Spike After Dormancy".to_string());
        }
        if spike_score > 20.0 {
            flags.push("Sudden Volume Spike on Dormant Account".to_string());
        }
        if sleep_flash_flag {
            flags.push(format!("Sleep-and-Flash Mule: ratio={sleep_flash_ratio:.0}x, dormant={}d", days_slept as i64));
        }

        let mut features = std::collections::BTreeMap::new();
        features.insert("days_slept".to_string(), days_slept);
        features.insert("inactivity_score".to_string(), inactivity_score);
        features.insert("spike_score".to_string(), spike_score);
        features.insert("is_dormant".to_string(), if is_dormant { 1.0 } else { 0.0 });
        features.insert("is_first_strike".to_string(), if is_first_strike { 1.0 } else { 0.0 });
        features.insert("sleep_flash_flag".to_string(), if sleep_flash_flag { 1.0 } else { 0.0 });
        features.insert("sleep_flash_ratio".to_string(), sleep_flash_ratio);

        ExtractorOutput {
            risk,
            flags,
            features,
            ..Default::default()
        }
        .clamp()
    }
}

impl DormancyExtractor {
    async fn fallback(&self, ctx: &ExtractionContext<'_>) -> ExtractorOutput {
        let rows = ctx
            .store
            .read(queries::QUERY_DORMANT_STATUS, Params::new().set("user_id", ctx.tx.sender_id()).build())
            .await
            .unwrap_or_default();
        let is_dormant: bool = rows.first().and_then(|r| r.get("is_dormant").ok()).unwrap_or(false);
        if is_dormant {
            let mut features = std::collections::BTreeMap::new();
            features.insert("is_dormant".to_string(), 1.0);
            ExtractorOutput {
                risk: 10.0,
                flags: vec!["Account flagged dormant with no recent-activity data".to_string()],
                features,
                ..Default::default()
            }
        } else {
            ExtractorOutput::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn::AsnClassifier;
    use crate::features::test_support::{sample_tx, StubStore};

    #[tokio::test]
    async fn unknown_account_falls_back_without_panicking() {
        let store = StubStore::empty();
        let asn = AsnClassifier::new("unused.mmdb");
        let tx = sample_tx();
        let ctx = ExtractionContext {
            store: &store,
            asn: &asn,
            tx: &tx,
            now: chrono::Utc::now(),
        };
        let out = DormancyExtractor.extract(&ctx).await;
        assert_eq!(out.risk, 0.0);
    }
}
