//! Process entrypoint: loads configuration, brings up the graph and stream clients,
//! bootstraps the schema, then runs the stream adapter, worker pool, and analytics
//! batch as cooperating background tasks until one of them exits.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sentry_mesh::adapter::StreamAdapter;
use sentry_mesh::alerts::RedisAlertSink;
use sentry_mesh::asn::AsnClassifier;
use sentry_mesh::batch::AnalyticsBatch;
use sentry_mesh::collusive::CollusiveCache;
use sentry_mesh::config::Settings;
use sentry_mesh::graph::{queries, BoltGraphStore, GraphStore};
use sentry_mesh::stream::StreamClient;
use sentry_mesh::worker::WorkerPool;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let settings = Settings::load();
    info!(graph_uri = %settings.graph_uri, redis_url = %settings.redis_url, "starting sentry-mesh");

    let store = Arc::new(
        BoltGraphStore::connect(&settings.graph_uri, &settings.graph_user, &settings.graph_password, settings.graph_pool_size)
            .await
            .context("failed to connect to the graph store")?,
    );
    store
        .bootstrap_schema(queries::SCHEMA_CONSTRAINTS, queries::SCHEMA_INDEXES)
        .await
        .context("schema bootstrap failed")?;

    let stream = StreamClient::connect(&settings.redis_url).await.context("failed to connect to redis")?;
    let asn = Arc::new(AsnClassifier::new(settings.mmdb_path.clone()));
    let collusive = Arc::new(CollusiveCache::new());

    let adapter = Arc::new(StreamAdapter::new(stream.clone(), &settings).await.context("stream adapter setup failed")?);
    let alert_sink = Arc::new(RedisAlertSink::new(stream.clone(), settings.alerts_channel.clone()));
    let worker_pool = Arc::new(
        WorkerPool::new(store.clone(), stream.clone(), asn.clone(), collusive.clone(), alert_sink, &settings)
            .await
            .context("worker pool setup failed")?,
    );
    let batch = Arc::new(AnalyticsBatch::new(store.clone(), collusive.clone()));

    let mut handles = adapter.spawn_consumers(settings.adapter_workers);
    handles.extend(worker_pool.spawn(settings.worker_count));
    handles.push(batch.spawn(std::time::Duration::from_secs(settings.analytics_interval_sec)));

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "a background task panicked");
        }
    }

    Ok(())
}
