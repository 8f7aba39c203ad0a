//! Startup configuration. Loaded once into an immutable [`Settings`], following the
//! teacher's `Config`-from-env convention (`src/models.rs::Config` in the teacher):
//! `dotenv` populates `std::env` from a `.env` file if present, then `clap` parses
//! everything (CLI flags take precedence over env vars, env vars over the defaults
//! below). There is no hot reload; a new `Settings` means a new process.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "sentry-mesh", about = "Real-time fraud-scoring pipeline")]
pub struct Settings {
    #[arg(long, env = "GRAPH_URI", default_value = "bolt://127.0.0.1:7687")]
    pub graph_uri: String,
    #[arg(long, env = "GRAPH_USER", default_value = "neo4j")]
    pub graph_user: String,
    #[arg(long, env = "GRAPH_PASSWORD", default_value = "neo4j")]
    pub graph_password: String,
    #[arg(long, env = "GRAPH_POOL_SIZE", default_value_t = 16)]
    pub graph_pool_size: usize,

    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,
    #[arg(long, env = "REDIS_RAW_STREAM_KEY", default_value = "upi_raw")]
    pub raw_stream_key: String,
    #[arg(long, env = "REDIS_RAW_CONSUMER_GROUP", default_value = "upi_adapter")]
    pub raw_consumer_group: String,
    #[arg(long, env = "REDIS_UPI_ADAPTER_WORKERS", default_value_t = 2)]
    pub adapter_workers: usize,
    #[arg(long, env = "REDIS_STREAM_KEY", default_value = "fraud_queue")]
    pub processing_stream_key: String,
    #[arg(long, env = "REDIS_CONSUMER_GROUP", default_value = "fraud_workers")]
    pub processing_consumer_group: String,
    #[arg(long, env = "REDIS_ALERTS_CHANNEL", default_value = "fraud_alerts")]
    pub alerts_channel: String,

    #[arg(long, env = "MMDB_PATH", default_value = "data/asn.mmdb")]
    pub mmdb_path: String,

    #[arg(long, env = "WORKER_COUNT", default_value_t = 4)]
    pub worker_count: usize,
    #[arg(long, env = "WORKER_BATCH_SIZE", default_value_t = 10)]
    pub worker_batch_size: usize,
    #[arg(long, env = "GRAPH_ANALYTICS_INTERVAL_SEC", default_value_t = 5)]
    pub analytics_interval_sec: u64,

    #[arg(long, env = "HIGH_RISK_THRESHOLD", default_value_t = 70.0)]
    pub high_risk_threshold: f64,
    #[arg(long, env = "MEDIUM_RISK_THRESHOLD", default_value_t = 40.0)]
    pub medium_risk_threshold: f64,
}

impl Settings {
    /// Loads `.env` (if present) then parses the process's real argv + environment.
    pub fn load() -> Self {
        let _ = dotenv::dotenv();
        Settings::parse()
    }
}

/// Thresholds, weights, and window sizes from `original_source/backend/app/config.py`.
/// Kept as free constants rather than `Settings` fields: the original treats the fusion
/// weights and per-feature knobs as fixed engineering constants, only the operational
/// knobs above (endpoints, pool sizes, worker counts) as tunable at deploy time.
pub mod thresholds {
    pub const WEIGHT_GRAPH: f64 = 0.30;
    pub const WEIGHT_BEHAVIORAL: f64 = 0.25;
    pub const WEIGHT_DEVICE: f64 = 0.20;
    pub const WEIGHT_DEAD_ACCOUNT: f64 = 0.15;
    pub const WEIGHT_VELOCITY: f64 = 0.10;

    pub const DORMANT_DAYS_THRESHOLD: f64 = 30.0;
    pub const DEVICE_ACCOUNT_THRESHOLD: u32 = 5;
    pub const VELOCITY_WINDOW_SEC: i64 = 60;
    pub const BEHAVIORAL_HISTORY_COUNT: usize = 25;
    pub const PASS_THROUGH_RATIO_THRESHOLD: f64 = 0.80;
    pub const BURST_TX_THRESHOLD: u32 = 10;
    pub const IMPOSSIBLE_TRAVEL_KMH: f64 = 250.0;
    pub const NIGHT_START_HOUR: u32 = 23;
    pub const NIGHT_END_HOUR: u32 = 5;
    pub const CAPABILITY_MASK_CHANGE_WEIGHT: f64 = 10.0;
    pub const NEW_DEVICE_HIGH_AMOUNT_THRESHOLD: f64 = 10_000.0;
    pub const NEW_DEVICE_PENALTY: f64 = 12.0;
    pub const DEVICE_MULTI_USER_THRESHOLD: u32 = 3;
    pub const DEVICE_MULTI_USER_WINDOW_HOURS: i64 = 24;
    pub const DEVICE_MULTI_USER_PENALTY: f64 = 25.0;
    pub const IP_ROTATION_WINDOW_HOURS: i64 = 24;
    pub const IP_ROTATION_MAX_UNIQUE: u32 = 5;
    pub const IP_ROTATION_PENALTY: f64 = 15.0;
    pub const FIXED_AMOUNT_TOLERANCE: f64 = 0.01;
    pub const FIXED_AMOUNT_MIN_COUNT: u32 = 3;
    pub const FIXED_AMOUNT_PENALTY: f64 = 10.0;
    pub const CIRCADIAN_ANOMALY_PENALTY: f64 = 20.0;
    pub const CIRCADIAN_NEW_DEVICE_PENALTY: f64 = 35.0;
    pub const TX_IDENTICALITY_WINDOW_HOURS: i64 = 1;
    pub const TX_IDENTICALITY_MIN_COUNT: u32 = 3;
    pub const TX_IDENTICALITY_PENALTY: f64 = 30.0;
    pub const SLEEP_FLASH_RATIO_THRESHOLD: f64 = 50.0;
    pub const SLEEP_FLASH_DORMANT_DAYS: f64 = 30.0;
    pub const GEO_IP_DISTANCE_THRESHOLD_KM: f64 = 500.0;

    pub const MULE_SCORE_THRESHOLD: f64 = 0.5;
    pub const MULE_FUSED_RISK_THRESHOLD: f64 = 65.0;
    /// The mule classifier's own pass-through threshold, distinct from
    /// `PASS_THROUGH_RATIO_THRESHOLD` above (0.80) — the original detector trips its
    /// relay-pattern signal earlier than the velocity extractor's own flag does.
    pub const MULE_PASSTHROUGH_THRESHOLD: f64 = 0.75;
    /// Accounts-ever-linked-to-device threshold for the mule classifier's
    /// shared-device signal; a different concept from `DEVICE_ACCOUNT_THRESHOLD` (the
    /// device extractor's own sharing tier) even though both currently read as 3-5.
    pub const MULE_DEVICE_SHARE_THRESHOLD: u32 = 3;

    pub const MAX_RETRIES: u32 = 3;
    pub const BASE_BACKOFF_MS: u64 = 20;
    pub const JITTER_MAX_MS: u64 = 10;
}
