//! Collusive-pattern cache (C5). Grounded on
//! `original_source/backend/app/detection/collusive_fraud.py::CollusiveFraudDetector`:
//! six pattern queries run periodically (driven by C8) and the results are published
//! as one immutable snapshot that every scoring request reads without taking a lock,
//! the same single-writer/many-reader shape the teacher uses its `arc_swap::ArcSwap`
//! for in `src/state/book.rs`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::error::GraphError;
use crate::graph::{queries, GraphStore, Params};

#[derive(Debug, Clone, Default)]
pub struct CollusiveSnapshot {
    /// user_id -> flag texts contributed by every pattern that named them.
    user_flags: HashMap<String, Vec<String>>,
    /// user_id -> cluster id, last writer wins (a user can appear in more than one
    /// pattern; the snapshot keeps whichever assigned a cluster most recently).
    user_cluster: HashMap<String, String>,
    pub pattern_count: usize,
    pub flagged_user_count: usize,
}

impl CollusiveSnapshot {
    pub fn flags_for(&self, user_id: &str) -> &[String] {
        self.user_flags.get(user_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn cluster_for(&self, user_id: &str) -> Option<&str> {
        self.user_cluster.get(user_id).map(|s| s.as_str())
    }
}

pub struct CollusiveCache {
    snapshot: ArcSwap<CollusiveSnapshot>,
}

impl Default for CollusiveCache {
    fn default() -> Self {
        CollusiveCache {
            snapshot: ArcSwap::from_pointee(CollusiveSnapshot::default()),
        }
    }
}

impl CollusiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Arc<CollusiveSnapshot> {
        self.snapshot.load_full()
    }

    pub fn user_flags(&self, user_id: &str) -> Vec<String> {
        self.current().flags_for(user_id).to_vec()
    }

    pub fn user_cluster_id(&self, user_id: &str) -> Option<String> {
        self.current().cluster_for(user_id).map(|s| s.to_string())
    }

    /// Runs all six pattern queries and atomically publishes a new snapshot. Any one
    /// query failing degrades that pattern to "found nothing" rather than aborting the
    /// refresh; C8 logs the failure count but keeps running the rest.
    pub async fn refresh(&self, store: &dyn GraphStore, since: chrono::DateTime<chrono::Utc>) -> usize {
        let since_str = since.to_rfc3339();
        let mut failures = 0;

        let fraud_islands = run(store, queries::DETECT_FRAUD_ISLANDS, Params::new().build(), &mut failures).await;
        let money_routers = run(store, queries::DETECT_MONEY_ROUTERS, Params::new().build(), &mut failures).await;
        let circular_flows = run(store, queries::DETECT_CIRCULAR_FLOWS, Params::new().set("since", since_str.clone()).build(), &mut failures).await;
        let rapid_chains = run(store, queries::DETECT_RAPID_CHAINS, Params::new().set("since", since_str.clone()).build(), &mut failures).await;
        let star_hubs = run(store, queries::DETECT_STAR_HUBS, Params::new().build(), &mut failures).await;
        let relay_mules = run(store, queries::DETECT_RELAY_MULE, Params::new().set("since", since_str).build(), &mut failures).await;

        let mut user_flags: HashMap<String, Vec<String>> = HashMap::new();
        let mut user_cluster: HashMap<String, String> = HashMap::new();
        let mut pattern_count = 0;

        for row in &fraud_islands {
            let cid: i64 = row.get("cid").unwrap_or(0);
            let members: i64 = row.get("members").unwrap_or(0);
            let avg_risk: f64 = row.get("avg_risk").unwrap_or(0.0);
            let sample: Vec<String> = row.get("sample").unwrap_or_default();
            let flag = format!("Fraud island: community {cid} ({members} members, avg risk {avg_risk:.0})");
            let cluster_id = format!("island-{cid}");
            for user_id in &sample {
                user_flags.entry(user_id.clone()).or_default().push(flag.clone());
                user_cluster.insert(user_id.clone(), cluster_id.clone());
            }
            pattern_count += 1;
        }

        for row in &money_routers {
            let user_id: String = row.get("user_id").unwrap_or_default();
            let betweenness: f64 = row.get("betweenness").unwrap_or(0.0);
            if user_id.is_empty() {
                continue;
            }
            let flag = format!("Money router: centrality {betweenness:.2}");
            user_flags.entry(user_id).or_default().push(flag);
            pattern_count += 1;
        }

        for row in &circular_flows {
            let a: String = row.get("a").unwrap_or_default();
            let b: String = row.get("b").unwrap_or_default();
            let c: String = row.get("c").unwrap_or_default();
            if a.is_empty() || b.is_empty() || c.is_empty() {
                continue;
            }
            let cluster_id = format!("circular-{a}-{b}-{c}");
            let flag = "CIRCULAR MONEY FLOW DETECTED".to_string();
            for user_id in [&a, &b, &c] {
                user_flags.entry(user_id.clone()).or_default().push(flag.clone());
                user_cluster.insert(user_id.clone(), cluster_id.clone());
            }
            pattern_count += 1;
        }

        for row in &rapid_chains {
            let a: String = row.get("a").unwrap_or_default();
            let b: String = row.get("b").unwrap_or_default();
            let c: String = row.get("c").unwrap_or_default();
            if a.is_empty() || b.is_empty() || c.is_empty() {
                continue;
            }
            let flag = "Rapid pass-through chain detected".to_string();
            for user_id in [&a, &b, &c] {
                user_flags.entry(user_id.clone()).or_default().push(flag.clone());
            }
            pattern_count += 1;
        }

        for row in &star_hubs {
            let user_id: String = row.get("user_id").unwrap_or_default();
            let hub_type: String = row.get("hub_type").unwrap_or_default();
            if user_id.is_empty() {
                continue;
            }
            let flag = format!("Star hub: {hub_type}");
            user_flags.entry(user_id).or_default().push(flag);
            pattern_count += 1;
        }

        for row in &relay_mules {
            let user_id: String = row.get("user_id").unwrap_or_default();
            let total_in: f64 = row.get("total_in").unwrap_or(0.0);
            let total_out: f64 = row.get("total_out").unwrap_or(0.0);
            if user_id.is_empty() {
                continue;
            }
            let flag = format!("Relay mule: in={total_in:.0} out={total_out:.0}");
            user_flags.entry(user_id).or_default().push(flag);
            pattern_count += 1;
        }

        let flagged: HashSet<&String> = user_flags.keys().collect();
        let snapshot = CollusiveSnapshot {
            flagged_user_count: flagged.len(),
            pattern_count,
            user_flags,
            user_cluster,
        };
        self.snapshot.store(Arc::new(snapshot));
        info!(pattern_count, failures, "collusive cache refreshed");
        failures
    }
}

async fn run(store: &dyn GraphStore, query: &str, params: crate::graph::QueryParams, failures: &mut usize) -> Vec<neo4rs::Row> {
    match store.read(query, params).await {
        Ok(rows) => rows,
        Err(e) => {
            log_failure(&e);
            *failures += 1;
            Vec::new()
        }
    }
}

fn log_failure(e: &GraphError) {
    tracing::warn!(error = %e, "collusive pattern query failed, treating as no match");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_flags() {
        let snapshot = CollusiveSnapshot::default();
        assert!(snapshot.flags_for("anyone").is_empty());
        assert!(snapshot.cluster_for("anyone").is_none());
    }

    #[tokio::test]
    async fn refresh_against_empty_store_publishes_empty_snapshot() {
        use crate::features::test_support::StubStore;
        let cache = CollusiveCache::new();
        let store = StubStore::empty();
        let failures = cache.refresh(&store, chrono::Utc::now()).await;
        assert_eq!(failures, 0);
        assert_eq!(cache.current().pattern_count, 0);
    }
}
