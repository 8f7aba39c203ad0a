//! Graph store client (C1): typed, pooled access to the property graph. Grounded on
//! `original_source/backend/app/neo4j_manager.py`'s `Neo4jManager`, which wraps both a
//! sync and an async Neo4j driver behind `run_sync`/`write_sync`/`run_async`/
//! `write_async`/`health_check`. This crate is async end to end (no sync hot path), so
//! the split collapses to one trait with read/write/health methods, matching the
//! seam-as-trait convention in the teacher's `src/auth/mod.rs`.

pub mod queries;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{BoltType, Graph, Row};
use tracing::{instrument, warn};

use crate::error::GraphError;

pub type QueryParams = BTreeMap<String, BoltType>;

/// Builds a [`QueryParams`] map without repeating `.to_string()`/`.into()` boilerplate
/// at every call site, mirroring the teacher's builder-method style (`Signal::with_market`).
#[derive(Default)]
pub struct Params(QueryParams);

impl Params {
    pub fn new() -> Self {
        Params(BTreeMap::new())
    }

    pub fn set(mut self, key: &str, value: impl Into<BoltType>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> QueryParams {
        self.0
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn read(&self, query: &str, params: QueryParams) -> Result<Vec<Row>, GraphError>;
    async fn write(&self, query: &str, params: QueryParams) -> Result<Vec<Row>, GraphError>;
    async fn bootstrap_schema(&self, constraints: &[&str], indexes: &[&str]) -> Result<(), GraphError>;
    async fn health(&self) -> Result<HealthReport, GraphError>;
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub node_counts: Vec<(String, i64)>,
    pub relationship_count: i64,
}

/// Production [`GraphStore`] backed by a pooled `neo4rs::Graph` (Bolt protocol).
pub struct BoltGraphStore {
    graph: Graph,
}

impl BoltGraphStore {
    pub async fn connect(uri: &str, user: &str, password: &str, pool_size: usize) -> anyhow::Result<Self> {
        let config = neo4rs::ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .max_connections(pool_size)
            .build()?;
        let graph = Graph::connect(config).await?;
        Ok(BoltGraphStore { graph })
    }

    fn bind(query: &str, params: QueryParams) -> neo4rs::Query {
        let mut q = neo4rs::query(query);
        for (k, v) in params {
            q = q.param(&k, v);
        }
        q
    }
}

#[async_trait]
impl GraphStore for BoltGraphStore {
    #[instrument(skip(self, params))]
    async fn read(&self, query: &str, params: QueryParams) -> Result<Vec<Row>, GraphError> {
        let mut txn = self.graph.start_txn().await.map_err(|e| GraphError::classify(e))?;
        let mut stream = txn
            .execute(Self::bind(query, params))
            .await
            .map_err(|e| GraphError::classify(e))?;
        let mut rows = Vec::new();
        while let Ok(Some(row)) = stream.next(&mut txn).await {
            rows.push(row);
        }
        txn.commit().await.map_err(|e| GraphError::classify(e))?;
        Ok(rows)
    }

    #[instrument(skip(self, params))]
    async fn write(&self, query: &str, params: QueryParams) -> Result<Vec<Row>, GraphError> {
        let mut txn = self.graph.start_txn().await.map_err(|e| GraphError::classify(e))?;
        let result = async {
            let mut stream = txn.execute(Self::bind(query, params)).await?;
            let mut rows = Vec::new();
            while let Ok(Some(row)) = stream.next(&mut txn).await {
                rows.push(row);
            }
            Ok::<_, neo4rs::Error>(rows)
        }
        .await;
        match result {
            Ok(rows) => {
                txn.commit().await.map_err(|e| GraphError::classify(e))?;
                Ok(rows)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(GraphError::classify(e))
            }
        }
    }

    async fn bootstrap_schema(&self, constraints: &[&str], indexes: &[&str]) -> Result<(), GraphError> {
        for stmt in constraints.iter().chain(indexes.iter()) {
            match self.graph.run(neo4rs::query(stmt)).await {
                Ok(_) => {}
                Err(e) => {
                    let classified = GraphError::classify(e);
                    if !classified.is_integrity() {
                        warn!(statement = %stmt, error = %classified, "schema statement failed");
                        return Err(classified);
                    }
                }
            }
        }
        Ok(())
    }

    async fn health(&self) -> Result<HealthReport, GraphError> {
        let budget = Duration::from_secs(3);
        let node_counts = tokio::time::timeout(budget, self.read(queries::HEALTH_NODE_COUNTS, Params::new().build()))
            .await
            .map_err(|_| GraphError::Transient("health probe timed out".into()))??;
        let mut report = HealthReport::default();
        for row in node_counts {
            let label: String = row.get("label").unwrap_or_default();
            let count: i64 = row.get("count").unwrap_or(0);
            report.node_counts.push((label, count));
        }
        let rel_rows = tokio::time::timeout(budget, self.read(queries::HEALTH_REL_COUNT, Params::new().build()))
            .await
            .map_err(|_| GraphError::Transient("health probe timed out".into()))??;
        if let Some(row) = rel_rows.first() {
            report.relationship_count = row.get("count").unwrap_or(0);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_builder_collects_entries() {
        let p = Params::new().set("a", 1i64).set("b", "x").build();
        assert_eq!(p.len(), 2);
        assert!(p.contains_key("a"));
        assert!(p.contains_key("b"));
    }
}
