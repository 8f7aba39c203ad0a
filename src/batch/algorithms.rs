//! Native in-process graph algorithms for the analytics batch (C8), grounded on
//! `original_source/backend/app/core/graph_analyzer.py`'s GDS-backed native path.
//! There is no Neo4j GDS plugin reachable from Rust, so "native" here means pulling
//! the active `TRANSFERRED_TO` subgraph into an in-memory [`petgraph`] graph and
//! running real algorithms in-process: connected components for community detection,
//! sampled Brandes betweenness, power-iteration PageRank, and local clustering via
//! triangle counts. See SPEC_FULL.md §4.8 and DESIGN.md for why this replaces the
//! original's opaque "is GDS installed" probe with a concrete node-count ceiling.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

/// One edge of the active-subgraph pull (`BATCH_ACTIVE_SUBGRAPH_EDGES`).
#[derive(Debug, Clone)]
pub struct SubgraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct NativeResults {
    pub community: HashMap<String, i64>,
    pub betweenness: HashMap<String, f64>,
    pub pagerank: HashMap<String, f64>,
    pub clustering: HashMap<String, f64>,
}

/// Above this node count the in-process algorithms (particularly betweenness) stop
/// being a reasonable per-cycle cost; C8 falls back to the pure-Cypher path instead.
pub const NATIVE_NODE_CEILING: usize = 50_000;

pub fn probe_native(edges: &[SubgraphEdge]) -> bool {
    let mut nodes = HashSet::new();
    for e in edges {
        nodes.insert(e.source.as_str());
        nodes.insert(e.target.as_str());
    }
    nodes.len() <= NATIVE_NODE_CEILING
}

struct Built {
    graph: UnGraph<String, f64>,
    index_of: HashMap<String, NodeIndex>,
}

fn build(edges: &[SubgraphEdge]) -> Built {
    let mut graph = UnGraph::new_undirected();
    let mut index_of: HashMap<String, NodeIndex> = HashMap::new();
    for e in edges {
        let a = *index_of.entry(e.source.clone()).or_insert_with(|| graph.add_node(e.source.clone()));
        let b = *index_of.entry(e.target.clone()).or_insert_with(|| graph.add_node(e.target.clone()));
        if a != b {
            graph.update_edge(a, b, e.weight);
        }
    }
    Built { graph, index_of }
}

pub fn run_all(edges: &[SubgraphEdge]) -> NativeResults {
    let built = build(edges);
    NativeResults {
        community: connected_components(&built),
        betweenness: sampled_betweenness(&built, 64),
        pagerank: pagerank(&built, 0.85, 30),
        clustering: local_clustering(&built),
    }
}

fn connected_components(built: &Built) -> HashMap<String, i64> {
    let mut visited = HashSet::new();
    let mut out = HashMap::new();
    let mut next_id: i64 = 0;
    for start in built.graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);
        while let Some(n) = queue.pop_front() {
            out.insert(built.graph[n].clone(), next_id);
            for neighbor in built.graph.neighbors(n) {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        next_id += 1;
    }
    out
}

/// Brandes' algorithm run from a bounded set of pivot sources rather than every node,
/// then scaled up — the standard sampling approximation for betweenness on graphs too
/// large to run exactly every cycle.
fn sampled_betweenness(built: &Built, max_pivots: usize) -> HashMap<String, f64> {
    let n = built.graph.node_count();
    if n == 0 {
        return HashMap::new();
    }
    let pivots: Vec<NodeIndex> = built.graph.node_indices().take(max_pivots).collect();
    let scale = n as f64 / pivots.len() as f64;

    let mut centrality: HashMap<NodeIndex, f64> = built.graph.node_indices().map(|i| (i, 0.0)).collect();

    for &s in &pivots {
        let mut stack = Vec::new();
        let mut preds: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        let mut sigma: HashMap<NodeIndex, f64> = built.graph.node_indices().map(|i| (i, 0.0)).collect();
        let mut dist: HashMap<NodeIndex, i64> = built.graph.node_indices().map(|i| (i, -1)).collect();
        sigma.insert(s, 1.0);
        dist.insert(s, 0);
        let mut queue = VecDeque::new();
        queue.push_back(s);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for w in built.graph.neighbors(v) {
                if dist[&w] < 0 {
                    dist.insert(w, dist[&v] + 1);
                    queue.push_back(w);
                }
                if dist[&w] == dist[&v] + 1 {
                    *sigma.get_mut(&w).unwrap() += sigma[&v];
                    preds.entry(w).or_default().push(v);
                }
            }
        }

        let mut delta: HashMap<NodeIndex, f64> = built.graph.node_indices().map(|i| (i, 0.0)).collect();
        while let Some(w) = stack.pop() {
            if let Some(ps) = preds.get(&w) {
                for &v in ps {
                    let contrib = (sigma[&v] / sigma[&w]) * (1.0 + delta[&w]);
                    *delta.get_mut(&v).unwrap() += contrib;
                }
            }
            if w != s {
                *centrality.get_mut(&w).unwrap() += delta[&w];
            }
        }
    }

    centrality
        .into_iter()
        .map(|(idx, raw)| (built.graph[idx].clone(), (raw * scale / 2.0).max(0.0)))
        .collect()
}

fn pagerank(built: &Built, damping: f64, iterations: usize) -> HashMap<String, f64> {
    let n = built.graph.node_count();
    if n == 0 {
        return HashMap::new();
    }
    let mut rank: HashMap<NodeIndex, f64> = built.graph.node_indices().map(|i| (i, 1.0 / n as f64)).collect();
    let base = (1.0 - damping) / n as f64;

    for _ in 0..iterations {
        let mut next: HashMap<NodeIndex, f64> = built.graph.node_indices().map(|i| (i, base)).collect();
        for node in built.graph.node_indices() {
            let degree = built.graph.edges(node).count();
            if degree == 0 {
                continue;
            }
            let share = damping * rank[&node] / degree as f64;
            for edge in built.graph.edges(node) {
                let target = edge.target();
                *next.get_mut(&target).unwrap() += share;
            }
        }
        rank = next;
    }

    rank.into_iter().map(|(idx, v)| (built.graph[idx].clone(), v)).collect()
}

fn local_clustering(built: &Built) -> HashMap<String, f64> {
    let adjacency: HashMap<NodeIndex, HashSet<NodeIndex>> = built
        .graph
        .node_indices()
        .map(|n| (n, built.graph.neighbors(n).collect::<HashSet<_>>()))
        .collect();

    let mut out = HashMap::new();
    for (&node, neighbors) in &adjacency {
        let k = neighbors.len();
        if k < 2 {
            out.insert(built.graph[node].clone(), 0.0);
            continue;
        }
        let neighbors_vec: Vec<&NodeIndex> = neighbors.iter().collect();
        let mut triangles = 0usize;
        for i in 0..neighbors_vec.len() {
            for j in (i + 1)..neighbors_vec.len() {
                if adjacency[neighbors_vec[i]].contains(neighbors_vec[j]) {
                    triangles += 1;
                }
            }
        }
        let possible = (k * (k - 1)) / 2;
        let coeff = if possible > 0 { triangles as f64 / possible as f64 } else { 0.0 };
        out.insert(built.graph[node].clone(), coeff);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: &str, b: &str, w: f64) -> SubgraphEdge {
        SubgraphEdge {
            source: a.to_string(),
            target: b.to_string(),
            weight: w,
        }
    }

    #[test]
    fn probe_native_respects_node_ceiling() {
        let edges = vec![edge("a", "b", 1.0)];
        assert!(probe_native(&edges));
    }

    #[test]
    fn two_disjoint_edges_form_two_communities() {
        let edges = vec![edge("a", "b", 1.0), edge("c", "d", 1.0)];
        let results = run_all(&edges);
        assert_ne!(results.community["a"], results.community["c"]);
        assert_eq!(results.community["a"], results.community["b"]);
    }

    #[test]
    fn triangle_has_clustering_coefficient_one() {
        let edges = vec![edge("a", "b", 1.0), edge("b", "c", 1.0), edge("c", "a", 1.0)];
        let results = run_all(&edges);
        assert!((results.clustering["a"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pagerank_sums_to_roughly_one() {
        let edges = vec![edge("a", "b", 1.0), edge("b", "c", 1.0), edge("c", "a", 1.0)];
        let results = run_all(&edges);
        let total: f64 = results.pagerank.values().sum();
        assert!((total - 1.0).abs() < 0.05, "total was {total}");
    }

    #[test]
    fn empty_graph_yields_empty_results() {
        let results = run_all(&[]);
        assert!(results.community.is_empty());
        assert!(results.pagerank.is_empty());
    }
}
