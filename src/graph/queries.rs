//! The query repository (SPEC_FULL.md §9, "query repository as data"): every Cypher
//! string this crate ever sends lives here as a named constant, grouped the way the
//! original source's `utils/cypher_queries.py` documents its own convention
//! (`SCHEMA_*`, `INGEST_*`, `QUERY_*`, `FALLBACK_*`, `DETECT_*`, `BATCH_*`). The
//! original's `GDS_*` family (calls into the Neo4j Graph Data Science plugin) has no
//! counterpart here — C8's native path runs the equivalent algorithms in-process over
//! `petgraph` instead, see `batch::algorithms`. No other module in this crate inlines
//! a Cypher fragment.

// ---- SCHEMA ----

pub const SCHEMA_CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT user_id_unique IF NOT EXISTS FOR (u:User) REQUIRE u.user_id IS UNIQUE",
    "CREATE CONSTRAINT device_id_unique IF NOT EXISTS FOR (d:Device) REQUIRE d.device_id IS UNIQUE",
    "CREATE CONSTRAINT tx_id_unique IF NOT EXISTS FOR (t:Transaction) REQUIRE t.tx_id IS UNIQUE",
    "CREATE CONSTRAINT ip_addr_unique IF NOT EXISTS FOR (i:IP) REQUIRE i.ip_address IS UNIQUE",
    "CREATE CONSTRAINT cluster_id_unique IF NOT EXISTS FOR (c:Cluster) REQUIRE c.cluster_id IS UNIQUE",
];

pub const SCHEMA_INDEXES: &[&str] = &[
    "CREATE INDEX user_risk_score IF NOT EXISTS FOR (u:User) ON (u.risk_score)",
    "CREATE INDEX user_is_dormant IF NOT EXISTS FOR (u:User) ON (u.is_dormant)",
    "CREATE INDEX user_last_active IF NOT EXISTS FOR (u:User) ON (u.last_active)",
    "CREATE INDEX tx_timestamp IF NOT EXISTS FOR (t:Transaction) ON (t.timestamp)",
    "CREATE INDEX tx_risk_score IF NOT EXISTS FOR (t:Transaction) ON (t.risk_score)",
    "CREATE INDEX device_score IF NOT EXISTS FOR (d:Device) ON (d.device_score)",
    "CREATE INDEX cluster_risk_level IF NOT EXISTS FOR (c:Cluster) ON (c.risk_level)",
    "CREATE INDEX ip_asn IF NOT EXISTS FOR (i:IP) ON (i.asn)",
];

pub const HEALTH_NODE_COUNTS: &str = r#"
MATCH (n)
RETURN labels(n)[0] AS label, count(*) AS count
"#;

pub const HEALTH_REL_COUNT: &str = "MATCH ()-[r]->() RETURN count(r) AS count";

// ---- INGEST ----

/// Lock-free ingest path: `MATCH`es pre-existing User/Device; fails with not-found if
/// either is missing so the caller can fall back to `INGEST_TRANSACTION_SAFE`.
pub const INGEST_TRANSACTION: &str = r#"
MATCH (sender:User {user_id: $sender_id})
MATCH (receiver:User {user_id: $receiver_id})
CREATE (t:Transaction {
  tx_id: $tx_id, amount: $amount, timestamp: $timestamp, currency: $currency,
  txn_type: $txn_type, credential_type: $credential_type, credential_sub: $credential_sub,
  receiver_type: $receiver_type, mcc_code: $mcc_code, status: 'PENDING',
  risk_score: 0.0, reason: '', sender_lat: $sender_lat, sender_lon: $sender_lon
})
CREATE (sender)-[:SENT]->(t)
CREATE (t)-[:RECEIVED_BY]->(receiver)
MERGE (sender)-[r:TRANSFERRED_TO]->(receiver)
  ON CREATE SET r.total_amount = $amount, r.tx_count = 1, r.last_tx = $timestamp
  ON MATCH SET r.total_amount = r.total_amount + $amount, r.tx_count = r.tx_count + 1, r.last_tx = $timestamp
SET sender.last_active = $timestamp, sender.is_dormant = false, sender.tx_count = coalesce(sender.tx_count, 0) + 1
RETURN t.tx_id AS tx_id
"#;

/// Safe (merge-on-missing) ingest path, used after a not-found on the lock-free path.
pub const INGEST_TRANSACTION_SAFE: &str = r#"
MERGE (sender:User {user_id: $sender_id})
  ON CREATE SET sender.created_at = $timestamp, sender.tx_count = 0, sender.total_inflow = 0.0, sender.total_outflow = 0.0
MERGE (receiver:User {user_id: $receiver_id})
  ON CREATE SET receiver.created_at = $timestamp, receiver.tx_count = 0, receiver.total_inflow = 0.0, receiver.total_outflow = 0.0
MERGE (t:Transaction {tx_id: $tx_id})
  ON CREATE SET t.amount = $amount, t.timestamp = $timestamp, t.currency = $currency,
    t.txn_type = $txn_type, t.credential_type = $credential_type, t.credential_sub = $credential_sub,
    t.receiver_type = $receiver_type, t.mcc_code = $mcc_code, t.status = 'PENDING', t.risk_score = 0.0,
    t.reason = '', t.sender_lat = $sender_lat, t.sender_lon = $sender_lon
MERGE (sender)-[:SENT]->(t)
MERGE (t)-[:RECEIVED_BY]->(receiver)
MERGE (sender)-[r:TRANSFERRED_TO]->(receiver)
  ON CREATE SET r.total_amount = $amount, r.tx_count = 1, r.last_tx = $timestamp
  ON MATCH SET r.total_amount = r.total_amount + $amount, r.tx_count = r.tx_count + 1, r.last_tx = $timestamp
SET sender.last_active = $timestamp, sender.is_dormant = false, sender.tx_count = coalesce(sender.tx_count, 0) + 1
RETURN t.tx_id AS tx_id
"#;

pub const INGEST_DEVICE_LINK: &str = r#"
MERGE (u:User {user_id: $user_id})
MERGE (d:Device {device_id: $device_id})
  ON CREATE SET d.os = $os, d.device_type = $device_type, d.app_version = $app_version,
    d.capability_mask = $capability_mask, d.device_score = 0.0, d.account_count = 0, d.created_at = $timestamp
MERGE (u)-[:USES_DEVICE]->(d)
RETURN d.device_id AS device_id
"#;

pub const INGEST_IP: &str = r#"
MERGE (u:User {user_id: $user_id})
MERGE (i:IP {ip_address: $ip_address})
  ON CREATE SET i.geo_lat = $geo_lat, i.geo_lon = $geo_lon, i.city = $city, i.country = $country,
    i.asn = $asn, i.asn_type = $asn_type, i.asn_org = $asn_org
MERGE (u)-[:ACCESSED_FROM]->(i)
RETURN i.ip_address AS ip_address
"#;

// ---- WRITE-BACK ----

pub const UPDATE_TX_RISK: &str = r#"
MATCH (t:Transaction {tx_id: $tx_id})
SET t.risk_score = $risk_score, t.status = $status, t.reason = $reason
RETURN t.tx_id AS tx_id
"#;

pub const UPDATE_USER_RISK: &str = r#"
MATCH (u:User {user_id: $user_id})
SET u.risk_score = $risk_score
RETURN u.user_id AS user_id
"#;

// ---- FEATURE READS ----

pub const QUERY_USER_PROFILE: &str = r#"
MATCH (u:User {user_id: $user_id})
RETURN u.tx_count AS tx_count, u.total_inflow AS total_inflow, u.total_outflow AS total_outflow,
       u.avg_tx_amount AS avg_tx_amount, u.std_tx_amount AS std_tx_amount,
       u.last_lat AS last_lat, u.last_lon AS last_lon, u.last_active AS last_active,
       u.is_dormant AS is_dormant, u.risk_score AS risk_score
"#;

pub const QUERY_USER_TX_HISTORY: &str = r#"
MATCH (u:User {user_id: $user_id})-[:SENT]->(t:Transaction)
RETURN t.amount AS amount, t.timestamp AS timestamp
ORDER BY t.timestamp DESC
LIMIT $limit
"#;

pub const QUERY_RECENT_AMOUNTS: &str = r#"
MATCH (u:User {user_id: $user_id})-[:SENT]->(t:Transaction)
WHERE t.timestamp >= $since
RETURN t.amount AS amount
"#;

pub const QUERY_USER_HOUR_DISTRIBUTION: &str = r#"
MATCH (u:User {user_id: $user_id})-[:SENT]->(t:Transaction)
RETURN t.timestamp AS timestamp
"#;

pub const QUERY_IDENTICAL_TX_RECEIVER: &str = r#"
MATCH (u:User {user_id: $user_id})-[:SENT]->(t:Transaction)-[:RECEIVED_BY]->(r:User {user_id: $receiver_id})
WHERE t.timestamp >= $since
RETURN t.amount AS amount
"#;

pub const QUERY_IP_ROTATION: &str = r#"
MATCH (u:User {user_id: $user_id})-[:ACCESSED_FROM]->(i:IP)
WHERE NOT EXISTS { MATCH (u)-[acc:ACCESSED_FROM]->(i) WHERE acc.first_seen < $since }
RETURN count(DISTINCT i.ip_address) AS unique_ips
"#;

pub const QUERY_USER_ASN_HISTORY: &str = r#"
MATCH (u:User {user_id: $user_id})-[:ACCESSED_FROM]->(i:IP)
RETURN i.asn AS asn
"#;

pub const QUERY_ASN_DENSITY: &str = r#"
MATCH (:User)-[:ACCESSED_FROM]->(i:IP {asn: $asn})
RETURN count(DISTINCT i) AS accounts
"#;

pub const QUERY_DEVICE_INFO: &str = r#"
MATCH (d:Device {device_id: $device_id})
RETURN d.os AS os, d.capability_mask AS capability_mask, d.account_count AS account_count
"#;

pub const QUERY_USER_DEVICE_HISTORY: &str = r#"
MATCH (u:User {user_id: $user_id})-[:USES_DEVICE]->(d:Device {device_id: $device_id})
RETURN d.device_id AS device_id
"#;

pub const QUERY_DEVICE_USERS_24H: &str = r#"
MATCH (u:User)-[:SENT]->(t:Transaction)
MATCH (u)-[:USES_DEVICE]->(d:Device {device_id: $device_id})
WHERE t.timestamp >= $since
RETURN count(DISTINCT u.user_id) AS distinct_users
"#;

pub const QUERY_DEVICE_RISK_PROPAGATION: &str = r#"
MATCH (d:Device {device_id: $device_id})<-[:USES_DEVICE]-(u:User)
RETURN count(DISTINCT u) AS linked_accounts, max(u.risk_score) AS max_risk, avg(u.risk_score) AS avg_risk
"#;

pub const QUERY_DORMANT_WAKEUP: &str = r#"
MATCH (u:User {user_id: $user_id})
OPTIONAL MATCH (u)-[:SENT]->(recent:Transaction)
WHERE recent.timestamp >= $since_1h
WITH u, count(recent) AS recent_tx_count_1h, sum(recent.amount) AS recent_volume_1h
RETURN u.last_active AS last_active, u.avg_tx_amount AS avg_tx_amount, u.tx_count AS tx_count,
       recent_tx_count_1h, coalesce(recent_volume_1h, 0.0) AS recent_volume_1h
"#;

pub const QUERY_RECENT_INFLOW_OUTFLOW: &str = r#"
MATCH (u:User {user_id: $user_id})
OPTIONAL MATCH (u)-[:SENT]->(out:Transaction) WHERE out.timestamp >= $since
OPTIONAL MATCH (u)<-[:RECEIVED_BY]-(inn:Transaction) WHERE inn.timestamp >= $since
RETURN coalesce(sum(out.amount), 0.0) AS total_out, coalesce(sum(inn.amount), 0.0) AS total_in
"#;

pub const QUERY_VELOCITY_FEATURES: &str = r#"
MATCH (u:User {user_id: $user_id})
OPTIONAL MATCH (u)-[:SENT]->(out:Transaction) WHERE out.timestamp >= $since
OPTIONAL MATCH (u)<-[:RECEIVED_BY]-(inn:Transaction) WHERE inn.timestamp >= $since
RETURN count(DISTINCT out) AS out_count, count(DISTINCT inn) AS in_count,
       coalesce(sum(out.amount), 0.0) AS total_out, coalesce(sum(inn.amount), 0.0) AS total_in
"#;

pub const QUERY_USER_GRAPH_FEATURES: &str = r#"
MATCH (u:User {user_id: $user_id})
OPTIONAL MATCH (u)-[out:TRANSFERRED_TO]->()
OPTIONAL MATCH (u)<-[inc:TRANSFERRED_TO]-()
OPTIONAL MATCH (u)-[:TRANSFERRED_TO]-(neighbor:User)
RETURN u.community_id AS community_id, u.betweenness AS betweenness, u.pagerank AS pagerank,
       u.clustering_coeff AS clustering_coeff,
       count(DISTINCT out) AS out_degree, count(DISTINCT inc) AS in_degree,
       avg(neighbor.risk_score) AS avg_neighbor_risk
"#;

pub const QUERY_COMMUNITY_STATS: &str = r#"
MATCH (u:User {community_id: $community_id})
RETURN count(u) AS members, avg(u.risk_score) AS avg_risk,
       sum(CASE WHEN u.risk_score > 70 THEN 1 ELSE 0 END) AS high_risk_count
"#;

// ---- BATCH AGGREGATION ----

pub const BATCH_UPDATE_USER_STATS: &str = r#"
MATCH (u:User {user_id: $user_id})-[:SENT]->(out:Transaction) WHERE out.timestamp >= $since
OPTIONAL MATCH (u)<-[:RECEIVED_BY]-(inn:Transaction) WHERE inn.timestamp >= $since
WITH u, count(out) AS tx_count, sum(out.amount) AS total_outflow, avg(out.amount) AS avg_amt,
     stDev(out.amount) AS std_amt, sum(inn.amount) AS total_inflow
SET u.tx_count = tx_count, u.total_outflow = coalesce(total_outflow, 0.0),
    u.total_inflow = coalesce(total_inflow, 0.0), u.avg_tx_amount = coalesce(avg_amt, 0.0),
    u.std_tx_amount = coalesce(std_amt, 0.0)
RETURN count(u) AS updated
"#;

pub const BATCH_UPDATE_DEVICE_STATS: &str = r#"
MATCH (d:Device)<-[:USES_DEVICE]-(u:User)
WITH d, count(DISTINCT u) AS account_count
SET d.account_count = account_count
RETURN count(d) AS updated
"#;

pub const QUERY_FLAG_DORMANT_ACCOUNTS: &str = r#"
MATCH (u:User)
WHERE u.last_active < $cutoff
SET u.is_dormant = true
RETURN count(u) AS flagged
"#;

pub const QUERY_DORMANT_STATUS: &str = r#"
MATCH (u:User {user_id: $user_id})
RETURN u.is_dormant AS is_dormant, u.last_active AS last_active
"#;

// ---- NATIVE GRAPH ALGORITHMS (in-process `petgraph`, SPEC_FULL.md §4.8) ----

/// Full edge pull for the in-process `petgraph` native path (see `batch::algorithms`):
/// every `TRANSFERRED_TO` edge among users active in the analytics window.
pub const BATCH_ACTIVE_SUBGRAPH_EDGES: &str = r#"
MATCH (a:User)-[r:TRANSFERRED_TO]->(b:User)
WHERE a.last_active >= $since OR b.last_active >= $since
RETURN a.user_id AS source, b.user_id AS target, r.total_amount AS weight
"#;

/// Per-node write-back for the native (`petgraph`) path results. One call per node
/// rather than an `UNWIND $rows` batch: the native path already holds every value in
/// process memory, and keeping every query parameter scalar (string/int/float) avoids
/// building Bolt list/map parameters by hand for a result set that's refreshed only
/// once per analytics cycle.
pub const BATCH_WRITE_COMMUNITY: &str = "MATCH (u:User {user_id: $user_id}) SET u.community_id = $community_id";
pub const BATCH_WRITE_BETWEENNESS: &str = "MATCH (u:User {user_id: $user_id}) SET u.betweenness = $betweenness";
pub const BATCH_WRITE_PAGERANK: &str = "MATCH (u:User {user_id: $user_id}) SET u.pagerank = $pagerank";
pub const BATCH_WRITE_CLUSTERING: &str = "MATCH (u:User {user_id: $user_id}) SET u.clustering_coeff = $clustering_coeff";

// ---- PURE-QUERY FALLBACK (SPEC_FULL.md §4.8 step 5) ----

pub const FALLBACK_COMMUNITY_DETECTION: &str = r#"
MATCH (u:User)-[:TRANSFERRED_TO*1..6]-(reachable:User)
WHERE u.last_active >= $since
WITH u, min(reachable.user_id) AS component_label
SET u.community_id = component_label
RETURN count(u) AS updated
"#;

pub const FALLBACK_BETWEENNESS: &str = r#"
MATCH (u:User)
OPTIONAL MATCH (u)-[:TRANSFERRED_TO]->()
OPTIONAL MATCH (u)<-[:TRANSFERRED_TO]-()
WITH u, count(DISTINCT []) AS _unused
MATCH (u)
OPTIONAL MATCH (u)-[o:TRANSFERRED_TO]->()
OPTIONAL MATCH (u)<-[i:TRANSFERRED_TO]-()
WITH u, count(DISTINCT o) AS out_deg, count(DISTINCT i) AS in_deg
SET u.betweenness = toFloat(out_deg * in_deg) / 100.0
RETURN count(u) AS updated
"#;

pub const FALLBACK_PAGERANK: &str = r#"
MATCH (u:User)
OPTIONAL MATCH (u)<-[r:TRANSFERRED_TO]-()
WITH u, coalesce(sum(r.total_amount), 0.0) AS weighted_in
MATCH (all:User)
WITH u, weighted_in, sum(coalesce(all.total_inflow, 0.0)) AS total
SET u.pagerank = CASE WHEN total > 0 THEN weighted_in / total ELSE 0.0 END
RETURN count(u) AS updated
"#;

pub const FALLBACK_CLUSTERING_COEFF: &str = r#"
MATCH (u:User)-[:TRANSFERRED_TO]-(n:User)
WITH u, collect(DISTINCT n) AS neighbors
WHERE size(neighbors) >= 2
UNWIND neighbors AS n1
UNWIND neighbors AS n2
WITH u, neighbors, n1, n2 WHERE id(n1) < id(n2)
OPTIONAL MATCH (n1)-[:TRANSFERRED_TO]-(n2)
WITH u, size(neighbors) AS k, count(n2) AS triangles
SET u.clustering_coeff = CASE WHEN k >= 2 THEN toFloat(triangles) / (toFloat(k) * (toFloat(k) - 1) / 2.0) ELSE 0.0 END
RETURN count(u) AS updated
"#;

pub const FALLBACK_CLUSTERING_COEFF_ZERO: &str = r#"
MATCH (u:User)
WHERE NOT (u)-[:TRANSFERRED_TO]-(:User) OR u.clustering_coeff IS NULL
SET u.clustering_coeff = 0.0
RETURN count(u) AS updated
"#;

// ---- COLLUSIVE PATTERN DETECTION (SPEC_FULL.md §4.5) ----

pub const DETECT_FRAUD_ISLANDS: &str = r#"
MATCH (u:User)
WHERE u.community_id IS NOT NULL
WITH u.community_id AS cid, count(u) AS members, avg(u.risk_score) AS avg_risk, collect(u.user_id)[0..10] AS sample
WHERE members >= 3 AND avg_risk > 50
RETURN cid, members, avg_risk, sample
"#;

pub const DETECT_MONEY_ROUTERS: &str = r#"
MATCH (u:User)
WHERE u.betweenness > 0.5
RETURN u.user_id AS user_id, u.betweenness AS betweenness
LIMIT 500
"#;

pub const DETECT_CIRCULAR_FLOWS: &str = r#"
MATCH (a:User)-[:TRANSFERRED_TO]->(b:User)-[:TRANSFERRED_TO]->(c:User)-[:TRANSFERRED_TO]->(a)
WHERE a.last_active >= $since
RETURN DISTINCT a.user_id AS a, b.user_id AS b, c.user_id AS c
LIMIT 500
"#;

pub const DETECT_RAPID_CHAINS: &str = r#"
MATCH p=(a:User)-[:SENT]->(:Transaction)-[:RECEIVED_BY]->(b:User)-[:SENT]->(:Transaction)-[:RECEIVED_BY]->(c:User)
WHERE a.last_active >= $since
RETURN DISTINCT a.user_id AS a, b.user_id AS b, c.user_id AS c
LIMIT 500
"#;

pub const DETECT_STAR_HUBS: &str = r#"
MATCH (u:User)
OPTIONAL MATCH (u)-[o:TRANSFERRED_TO]->()
OPTIONAL MATCH (u)<-[i:TRANSFERRED_TO]-()
WITH u, count(DISTINCT o) AS out_deg, count(DISTINCT i) AS in_deg
WHERE out_deg >= 8 OR in_deg >= 8
RETURN u.user_id AS user_id, out_deg, in_deg, CASE WHEN out_deg > in_deg THEN 'FAN_OUT' ELSE 'FAN_IN' END AS hub_type
LIMIT 500
"#;

pub const DETECT_RELAY_MULE: &str = r#"
MATCH (u:User)
OPTIONAL MATCH (u)<-[:RECEIVED_BY]-(inn:Transaction) WHERE inn.timestamp >= $since
OPTIONAL MATCH (u)-[:SENT]->(out:Transaction) WHERE out.timestamp >= $since
WITH u, coalesce(sum(inn.amount), 0.0) AS total_in, coalesce(sum(out.amount), 0.0) AS total_out
WHERE total_in > 0 AND total_out / total_in > 0.9
RETURN u.user_id AS user_id, total_in, total_out
LIMIT 500
"#;
