//! Alerts and geo-evidence synthesis. Grounded on
//! `original_source/backend/app/core/worker_pool.py::WorkerPool::_publish_alert` and
//! `_build_geo_evidence`: once C9 decides a transaction is worth surfacing, it builds
//! an [`Alert`] and hands it to whatever [`AlertSink`] the deployment wired up. The
//! geo evidence attached to an alert is presentation dressing only — a human-readable
//! "nearest gateway city" guess plus a randomized travel-time estimate — and must
//! never be read back by a feature extractor; nothing in `src/features/` imports this
//! module.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::models::{RiskLevel, TransactionResult};
use crate::stream::{encode_payload, StreamClient};

#[derive(Debug, Clone, Serialize)]
pub struct GeoEvidence {
    pub nearest_gateway_city: &'static str,
    pub estimated_travel_time_min: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub tx_id: String,
    pub user_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub flags: Vec<String>,
    pub geo_evidence: Option<GeoEvidence>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Alert {
    pub fn from_result(user_id: &str, result: &TransactionResult, geo_evidence: Option<GeoEvidence>) -> Self {
        Alert {
            tx_id: result.tx_id.clone(),
            user_id: user_id.to_string(),
            risk_score: result.risk_score,
            risk_level: result.risk_level,
            reason: result.reason.clone(),
            flags: result.flags.clone(),
            geo_evidence,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Publishes onto the Redis pub/sub channel dashboards subscribe to.
pub struct RedisAlertSink {
    stream: StreamClient,
    channel: String,
}

impl RedisAlertSink {
    pub fn new(stream: StreamClient, channel: impl Into<String>) -> Self {
        RedisAlertSink { stream, channel: channel.into() }
    }
}

#[async_trait]
impl AlertSink for RedisAlertSink {
    async fn publish(&self, alert: &Alert) -> anyhow::Result<()> {
        let payload = serde_json::to_value(alert)?;
        let encoded = encode_payload(&payload);
        self.stream.publish_alert(&self.channel, &encoded).await?;
        Ok(())
    }
}

/// In-process fan-out, used by tests and by any in-process consumer (a TUI, a local
/// dashboard) that doesn't need the Redis hop.
pub struct BroadcastAlertSink {
    sender: tokio::sync::broadcast::Sender<Alert>,
}

impl BroadcastAlertSink {
    pub fn new(capacity: usize) -> (Self, tokio::sync::broadcast::Receiver<Alert>) {
        let (sender, receiver) = tokio::sync::broadcast::channel(capacity);
        (BroadcastAlertSink { sender }, receiver)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Alert> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl AlertSink for BroadcastAlertSink {
    async fn publish(&self, alert: &Alert) -> anyhow::Result<()> {
        // No active subscribers is not an error — the boundary hook has no guaranteed
        // listener, matching the original's fire-and-forget pub/sub semantics.
        let _ = self.sender.send(alert.clone());
        Ok(())
    }
}

/// Major UPI gateway cities with approximate lat/lon, used only to manufacture a
/// plausible "nearest gateway" story for analysts reading an alert.
const GATEWAY_CITIES: &[(&str, f64, f64)] = &[
    ("Mumbai", 19.0760, 72.8777),
    ("Delhi", 28.7041, 77.1025),
    ("Bengaluru", 12.9716, 77.5946),
    ("Chennai", 13.0827, 80.2707),
    ("Kolkata", 22.5726, 88.3639),
    ("Hyderabad", 17.3850, 78.4867),
    ("Pune", 18.5204, 73.8567),
    ("Ahmedabad", 23.0225, 72.5714),
];

/// Synthesizes non-authoritative geo evidence for an alert's display. Takes an
/// injectable RNG so tests can assert on deterministic output instead of patching a
/// global generator.
pub struct GeoEvidenceSynth {
    rng: ChaCha8Rng,
}

impl GeoEvidenceSynth {
    pub fn new(seed: u64) -> Self {
        GeoEvidenceSynth { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        GeoEvidenceSynth { rng: ChaCha8Rng::from_entropy() }
    }

    pub fn synthesize(&mut self, lat: Option<f64>, lon: Option<f64>) -> GeoEvidence {
        let city = match (lat, lon) {
            (Some(lat), Some(lon)) => nearest_gateway_city(lat, lon),
            _ => GATEWAY_CITIES[self.rng.gen_range(0..GATEWAY_CITIES.len())].0,
        };
        GeoEvidence {
            nearest_gateway_city: city,
            estimated_travel_time_min: self.rng.gen_range(5..90),
        }
    }
}

/// Also used by C9's IP-enrichment path to tag an `IP` node with a human-readable
/// city label when the MaxMind lookup doesn't resolve one.
pub fn nearest_gateway_city(lat: f64, lon: f64) -> &'static str {
    GATEWAY_CITIES
        .iter()
        .min_by(|a, b| {
            let da = crate::features::stats::haversine_km(lat, lon, a.1, a.2);
            let db = crate::features::stats::haversine_km(lat, lon, b.1, b.2);
            da.partial_cmp(&db).unwrap()
        })
        .map(|(name, _, _)| *name)
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_gateway_city_picks_bengaluru_for_bengaluru_coords() {
        assert_eq!(nearest_gateway_city(12.9716, 77.5946), "Bengaluru");
    }

    #[tokio::test]
    async fn broadcast_sink_does_not_error_without_subscribers() {
        let (sink, _rx) = BroadcastAlertSink::new(8);
        let alert = Alert {
            tx_id: "t1".into(),
            user_id: "u1".into(),
            risk_score: 10.0,
            risk_level: RiskLevel::Low,
            reason: "ok".into(),
            flags: vec![],
            geo_evidence: None,
            timestamp: chrono::Utc::now(),
        };
        drop(sink.subscribe());
        assert!(sink.publish(&alert).await.is_ok());
    }

    #[test]
    fn synth_is_deterministic_for_a_fixed_seed() {
        let mut a = GeoEvidenceSynth::new(42);
        let mut b = GeoEvidenceSynth::new(42);
        let ea = a.synthesize(None, None);
        let eb = b.synthesize(None, None);
        assert_eq!(ea.nearest_gateway_city, eb.nearest_gateway_city);
        assert_eq!(ea.estimated_travel_time_min, eb.estimated_travel_time_min);
    }
}
