//! Analytics batch (C8). Grounded on
//! `original_source/backend/app/core/graph_analyzer.py::GraphAnalyzer.run_cycle`: a
//! periodic six-step pass that keeps the aggregate stats, dormancy flags, and
//! graph-derived centrality/community scores the feature extractors read fresh, then
//! refreshes the collusive-pattern cache (C5) from whatever the cycle just computed.

pub mod algorithms;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::collusive::CollusiveCache;
use crate::config::thresholds as t;
use crate::graph::{queries, GraphStore, Params};

use algorithms::SubgraphEdge;

#[derive(Debug, Clone, Default)]
pub struct BatchCycleReport {
    pub users_aggregated: i64,
    pub devices_aggregated: i64,
    pub accounts_flagged_dormant: i64,
    pub used_native_path: bool,
    pub nodes_scored: usize,
    pub collusive_failures: usize,
}

pub struct AnalyticsBatch<S: GraphStore> {
    store: Arc<S>,
    collusive: Arc<CollusiveCache>,
}

impl<S: GraphStore> AnalyticsBatch<S> {
    pub fn new(store: Arc<S>, collusive: Arc<CollusiveCache>) -> Self {
        AnalyticsBatch { store, collusive }
    }

    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        S: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let report = self.run_cycle().await;
                info!(?report, "analytics cycle complete");
            }
        })
    }

    pub async fn run_cycle(&self) -> BatchCycleReport {
        let now = chrono::Utc::now();
        let since = now - chrono::Duration::hours(1);
        let mut report = BatchCycleReport::default();

        // Step 1: aggregate rolling per-user/per-device statistics.
        match self.store.write(queries::BATCH_UPDATE_USER_STATS, Params::new().set("since", since.to_rfc3339()).build()).await {
            Ok(rows) => report.users_aggregated = rows.first().and_then(|r| r.get("updated").ok()).unwrap_or(0),
            Err(e) => warn!(error = %e, "user stats aggregation failed"),
        }
        match self.store.write(queries::BATCH_UPDATE_DEVICE_STATS, Params::new().build()).await {
            Ok(rows) => report.devices_aggregated = rows.first().and_then(|r| r.get("updated").ok()).unwrap_or(0),
            Err(e) => warn!(error = %e, "device stats aggregation failed"),
        }

        // Step 2: flag accounts that crossed the dormancy threshold.
        let cutoff = now - chrono::Duration::days(t::DORMANT_DAYS_THRESHOLD as i64);
        match self.store.write(queries::QUERY_FLAG_DORMANT_ACCOUNTS, Params::new().set("cutoff", cutoff.to_rfc3339()).build()).await {
            Ok(rows) => report.accounts_flagged_dormant = rows.first().and_then(|r| r.get("flagged").ok()).unwrap_or(0),
            Err(e) => warn!(error = %e, "dormancy flagging failed"),
        }

        // Step 3 + 4: community/centrality/clustering, native path when the active
        // subgraph is small enough, pure-Cypher fallback otherwise.
        let edges = self
            .store
            .read(queries::BATCH_ACTIVE_SUBGRAPH_EDGES, Params::new().set("since", since.to_rfc3339()).build())
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| {
                let source: String = row.get("source").ok()?;
                let target: String = row.get("target").ok()?;
                let weight: f64 = row.get("weight").unwrap_or(1.0);
                Some(SubgraphEdge { source, target, weight })
            })
            .collect::<Vec<_>>();

        if algorithms::probe_native(&edges) {
            report.used_native_path = true;
            self.run_native(&edges, &mut report).await;
        } else {
            self.run_fallback(since, &mut report).await;
        }

        // Step 5: refresh the collusive-pattern cache from what this cycle wrote.
        report.collusive_failures = self.collusive.refresh(self.store.as_ref(), since).await;

        report
    }

    async fn run_native(&self, edges: &[SubgraphEdge], report: &mut BatchCycleReport) {
        let results = algorithms::run_all(edges);
        report.nodes_scored = results.community.len();

        for (user_id, community_id) in &results.community {
            let _ = self
                .store
                .write(queries::BATCH_WRITE_COMMUNITY, Params::new().set("user_id", user_id.as_str()).set("community_id", *community_id).build())
                .await;
        }
        for (user_id, betweenness) in &results.betweenness {
            let _ = self
                .store
                .write(queries::BATCH_WRITE_BETWEENNESS, Params::new().set("user_id", user_id.as_str()).set("betweenness", *betweenness).build())
                .await;
        }
        for (user_id, pagerank) in &results.pagerank {
            let _ = self
                .store
                .write(queries::BATCH_WRITE_PAGERANK, Params::new().set("user_id", user_id.as_str()).set("pagerank", *pagerank).build())
                .await;
        }
        for (user_id, clustering_coeff) in &results.clustering {
            let _ = self
                .store
                .write(
                    queries::BATCH_WRITE_CLUSTERING,
                    Params::new().set("user_id", user_id.as_str()).set("clustering_coeff", *clustering_coeff).build(),
                )
                .await;
        }
    }

    async fn run_fallback(&self, since: chrono::DateTime<chrono::Utc>, report: &mut BatchCycleReport) {
        let since_str = since.to_rfc3339();
        for query in [
            queries::FALLBACK_COMMUNITY_DETECTION,
            queries::FALLBACK_BETWEENNESS,
            queries::FALLBACK_PAGERANK,
            queries::FALLBACK_CLUSTERING_COEFF,
            queries::FALLBACK_CLUSTERING_COEFF_ZERO,
        ] {
            match self.store.write(query, Params::new().set("since", since_str.clone()).build()).await {
                Ok(rows) => {
                    let updated: i64 = rows.first().and_then(|r| r.get("updated").ok()).unwrap_or(0);
                    report.nodes_scored = report.nodes_scored.max(updated as usize);
                }
                Err(e) => warn!(error = %e, query, "fallback analytics query failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::StubStore;

    #[tokio::test]
    async fn empty_store_cycle_completes_without_panicking() {
        let store = Arc::new(StubStore::empty());
        let collusive = Arc::new(CollusiveCache::new());
        let batch = AnalyticsBatch::new(store, collusive);
        let report = batch.run_cycle().await;
        assert_eq!(report.users_aggregated, 0);
        assert!(report.used_native_path);
    }
}
