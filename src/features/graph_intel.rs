//! Graph intelligence extractor (C4.1). Grounded on
//! `original_source/backend/app/features/graph_intelligence.py::GraphIntelligenceExtractor`.

use async_trait::async_trait;

use crate::graph::{queries, Params};

use super::{ExtractionContext, ExtractorOutput, FeatureExtractor};

pub struct GraphIntelligenceExtractor;

#[async_trait]
impl FeatureExtractor for GraphIntelligenceExtractor {
    fn name(&self) -> &'static str {
        "graph_intelligence"
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> ExtractorOutput {
        let sender_id = ctx.tx.sender_id();
        let rows = ctx
            .store
            .read(queries::QUERY_USER_GRAPH_FEATURES, Params::new().set("user_id", sender_id).build())
            .await
            .unwrap_or_default();

        let Some(row) = rows.first() else {
            return ExtractorOutput::default();
        };

        let community_id: Option<i64> = row.get("community_id").ok();
        let betweenness: f64 = row.get("betweenness").unwrap_or(0.0);
        let pagerank: f64 = row.get("pagerank").unwrap_or(0.0);
        let clustering_coeff: f64 = row.get("clustering_coeff").unwrap_or(0.0);
        let out_degree: i64 = row.get("out_degree").unwrap_or(0);
        let in_degree: i64 = row.get("in_degree").unwrap_or(0);
        let avg_neighbor_risk: f64 = row.get("avg_neighbor_risk").unwrap_or(0.0);

        let mut flags = Vec::new();

        let community_risk = if let Some(cid) = community_id {
            let stats_rows = ctx
                .store
                .read(queries::QUERY_COMMUNITY_STATS, Params::new().set("community_id", cid).build())
                .await
                .unwrap_or_default();
            if let Some(stat_row) = stats_rows.first() {
                let members: i64 = stat_row.get("members").unwrap_or(0);
                let avg_risk: f64 = stat_row.get("avg_risk").unwrap_or(0.0);
                let high_risk_count: i64 = stat_row.get("high_risk_count").unwrap_or(0);
                if members >= 3 && avg_risk > 50.0 {
                    flags.push(format!("Part of high-risk community {cid} ({members} members, avg risk {avg_risk:.0})"));
                    avg_risk.min(100.0)
                } else if high_risk_count >= 2 {
                    flags.push(format!("Community {cid} has {high_risk_count} high-risk members"));
                    40.0
                } else {
                    0.0
                }
            } else {
                0.0
            }
        } else {
            0.0
        };

        let centrality_score = (betweenness * 200.0).min(30.0);
        let pagerank_score = (pagerank * 500.0).min(15.0);

        let mut structural_score = 0.0;
        if out_degree >= 5 && in_degree <= 2 {
            structural_score += 15.0;
            flags.push(format!("Fan-out pattern: {out_degree} outgoing, {in_degree} incoming"));
        }
        if in_degree >= 5 && out_degree <= 2 {
            structural_score += 15.0;
            flags.push(format!("Fan-in pattern: {in_degree} incoming, {out_degree} outgoing"));
        }
        if clustering_coeff > 0.5 && (in_degree + out_degree) > 4 {
            structural_score += 10.0;
            flags.push(format!("Dense local cluster: coefficient {clustering_coeff:.2}"));
        }

        let neighbor_contagion = (avg_neighbor_risk * 0.3).min(15.0);
        if neighbor_contagion > 5.0 {
            flags.push(format!("Neighbor contagion: avg linked-user risk {avg_neighbor_risk:.0}"));
        }

        let risk = community_risk * 0.30 + centrality_score + pagerank_score + structural_score + neighbor_contagion;

        let mut features = std::collections::BTreeMap::new();
        features.insert("community_risk".to_string(), community_risk);
        features.insert("centrality_score".to_string(), centrality_score);
        features.insert("pagerank_score".to_string(), pagerank_score);
        features.insert("structural_score".to_string(), structural_score);
        features.insert("neighbor_contagion".to_string(), neighbor_contagion);

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
    async fn empty_graph_produces_zero_risk_no_nan() {
        let store = StubStore::empty();
        let asn = AsnClassifier::new("unused.mmdb");
        let tx = sample_tx();
        let ctx = ExtractionContext {
            store: &store,
            asn: &asn,
            tx: &tx,
            now: chrono::Utc::now(),
        };
        let out = GraphIntelligenceExtractor.extract(&ctx).await;
        assert_eq!(out.risk, 0.0);
        assert!(out.flags.is_empty());
    }
}
