//! Feature extractors (C4): five independent signal families that each read the graph
//! and return a `(risk, flags, features)` triple. Grounded on the original source's
//! five `*FeatureExtractor`/`*Detector` classes under `features/`; structured here as
//! implementations of one shared trait so C6 can hold and join them homogeneously,
//! the way the teacher's `src/signals/detector.rs` drives several signal kinds through
//! one `SignalDetector` entry point.

pub mod behavioral;
pub mod device;
pub mod dormancy;
pub mod graph_intel;
pub mod velocity;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::asn::AsnClassifier;
use crate::graph::GraphStore;
use crate::models::TransactionInput;

/// Everything an extractor needs for one scoring pass. Built once per transaction by
/// C6 and shared (by reference) across the five concurrent extractors.
pub struct ExtractionContext<'a> {
    pub store: &'a dyn GraphStore,
    pub asn: &'a AsnClassifier,
    pub tx: &'a TransactionInput,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractorOutput {
    pub risk: f64,
    pub flags: Vec<String>,
    pub features: BTreeMap<String, f64>,
    /// Set by the behavioral extractor; read by C6 for the circadian/new-device
    /// compound boost (SPEC_FULL.md §4.6 step 3).
    pub circadian_anomaly: bool,
    /// Set by the device extractor; read by C6 for the same compound boost.
    pub new_device: bool,
    /// The single highest-magnitude flag this extractor raised, if any. Read by C6's
    /// reason assembly (SPEC_FULL.md §4.6) to surface "the single highest-magnitude
    /// behavioral flag" without re-deriving magnitude from flag text.
    pub top_flag: Option<String>,
}

impl ExtractorOutput {
    pub fn clamp(mut self) -> Self {
        self.risk = self.risk.clamp(0.0, 100.0);
        self
    }
}

#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> ExtractorOutput;
}

/// The five extractors, held as trait objects so C6 can `tokio::join!` them without
/// five distinct generic parameters.
pub fn default_extractors() -> Vec<Arc<dyn FeatureExtractor>> {
    vec![
        Arc::new(graph_intel::GraphIntelligenceExtractor),
        Arc::new(behavioral::BehavioralExtractor),
        Arc::new(device::DeviceRiskExtractor),
        Arc::new(dormancy::DormancyExtractor),
        Arc::new(velocity::VelocityExtractor),
    ]
}

/// Test-only graph store stub shared by every extractor's unit tests so each one
/// doesn't reimplement the same empty-result `GraphStore`.
#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use neo4rs::Row;

    use crate::error::GraphError;
    use crate::graph::{GraphStore, HealthReport, QueryParams};
    use crate::models::{Receiver, Sender, TransactionInput, TxnType};

    pub struct StubStore {
        pub rows: Vec<Row>,
    }

    impl StubStore {
        pub fn empty() -> Self {
            StubStore { rows: vec![] }
        }
    }

    #[async_trait]
    impl GraphStore for StubStore {
        async fn read(&self, _query: &str, _params: QueryParams) -> Result<Vec<Row>, GraphError> {
            // `Row` has no public constructor or `Clone` impl outside the Bolt driver,
            // and `StubStore` is only ever built via `empty()`.
            debug_assert!(self.rows.is_empty());
            Ok(Vec::new())
        }
        async fn write(&self, _query: &str, _params: QueryParams) -> Result<Vec<Row>, GraphError> {
            debug_assert!(self.rows.is_empty());
            Ok(Vec::new())
        }
        async fn bootstrap_schema(&self, _c: &[&str], _i: &[&str]) -> Result<(), GraphError> {
            Ok(())
        }
        async fn health(&self) -> Result<HealthReport, GraphError> {
            Ok(Default::default())
        }
    }

    pub fn sample_tx() -> TransactionInput {
        TransactionInput {
            tx_id: "t1".into(),
            timestamp: chrono::Utc::now(),
            amount: 100.0,
            currency: "INR".into(),
            txn_type: TxnType::Pay,
            sender: Sender {
                sender_id: "U1".into(),
                ..Default::default()
            },
            credential: None,
            receiver: Receiver {
                receiver_id: "U2".into(),
                ..Default::default()
            },
            _meta: Default::default(),
        }
    }
}

/// Shared statistical helpers (grounded on
/// `original_source/backend/app/detection/anomaly_detection.py`), used by more than
/// one extractor.
pub mod stats {
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    pub fn std_dev(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        let m = mean(values);
        let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
        variance.sqrt()
    }

    pub fn z_score(value: f64, mean: f64, std: f64) -> f64 {
        if std <= 0.0 {
            0.0
        } else {
            (value - mean) / std
        }
    }

    /// Tukey's IQR outlier rule with k=1.5, as the original's `iqr_outlier` uses.
    pub fn iqr_outlier(value: f64, values: &[f64]) -> bool {
        if values.len() < 4 {
            return false;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let q1 = percentile(&sorted, 0.25);
        let q3 = percentile(&sorted, 0.75);
        let iqr = q3 - q1;
        value < q1 - 1.5 * iqr || value > q3 + 1.5 * iqr
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = p * (sorted.len() as f64 - 1.0);
        let lower = idx.floor() as usize;
        let upper = idx.ceil() as usize;
        if lower == upper {
            sorted[lower]
        } else {
            let frac = idx - lower as f64;
            sorted[lower] * (1.0 - frac) + sorted[upper] * frac
        }
    }

    /// Haversine distance in kilometers.
    pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
        let dlat = (lat2 - lat1).to_radians();
        let dlon = (lon2 - lon1).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }

    #[cfg(test)]
    pub(crate) mod tests {
        use super::*;

        #[test]
        fn haversine_zero_for_identical_points() {
            assert!(haversine_km(12.97, 77.59, 12.97, 77.59) < 1e-6);
        }

        #[test]
        fn haversine_roughly_matches_known_distance() {
            // Bengaluru to New York is roughly 14000km.
            let d = haversine_km(12.9716, 77.5946, 40.7128, -74.0060);
            assert!(d > 13000.0 && d < 15500.0, "distance was {d}");
        }

        #[test]
        fn iqr_outlier_requires_four_points() {
            assert!(!iqr_outlier(1000.0, &[1.0, 2.0, 3.0]));
        }

        #[test]
        fn z_score_zero_when_std_is_zero() {
            assert_eq!(z_score(5.0, 5.0, 0.0), 0.0);
        }
    }
}
