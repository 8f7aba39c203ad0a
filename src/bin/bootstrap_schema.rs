//! Standalone schema bootstrap CLI. Lets an operator (or a deploy hook) apply the
//! graph's constraints and indexes without bringing up the full pipeline — the same
//! step `main.rs` runs on every start, pulled out so it can be run once against a
//! fresh database ahead of time.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sentry_mesh::config::Settings;
use sentry_mesh::graph::{queries, BoltGraphStore, GraphStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let settings = Settings::load();
    let store = BoltGraphStore::connect(&settings.graph_uri, &settings.graph_user, &settings.graph_password, settings.graph_pool_size)
        .await
        .context("failed to connect to the graph store")?;

    store
        .bootstrap_schema(queries::SCHEMA_CONSTRAINTS, queries::SCHEMA_INDEXES)
        .await
        .context("schema bootstrap failed")?;

    println!("schema bootstrap complete: {} constraints, {} indexes", queries::SCHEMA_CONSTRAINTS.len(), queries::SCHEMA_INDEXES.len());
    Ok(())
}
