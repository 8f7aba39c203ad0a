//! Stream adapter (C7). Grounded on
//! `original_source/backend/app/streaming/stream_adapter.py::StreamAdapter`: N
//! cooperating consumers pull raw events off the ingest log, validate their shape, and
//! republish the ones that pass onto the processing log the worker pool (C9) reads
//! from. A message that fails validation is acknowledged and dropped — there is no
//! dead-letter log in this system, matching the original's explicit choice to treat
//! malformed input as noise rather than as something to replay later.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::config::Settings;
use crate::error::StreamError;
use crate::models::TransactionInput;
use crate::stream::{decode_payload, encode_payload, StreamClient};

#[derive(Default)]
struct Counters {
    forwarded: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
    latency_sum_micros: AtomicU64,
    latency_count: AtomicU64,
}

/// Point-in-time snapshot of the adapter's throughput, read by the health endpoint /
/// logs rather than by the hot path itself.
#[derive(Debug, Clone, Copy)]
pub struct AdapterMetrics {
    pub forwarded: u64,
    pub dropped: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub tps: f64,
}

pub struct StreamAdapter {
    stream: StreamClient,
    raw_stream_key: String,
    raw_consumer_group: String,
    processing_stream_key: String,
    counters: Arc<Counters>,
    started_at: Instant,
}

impl StreamAdapter {
    pub async fn new(stream: StreamClient, settings: &Settings) -> Result<Self, StreamError> {
        stream
            .ensure_consumer_group(&settings.raw_stream_key, &settings.raw_consumer_group, false)
            .await?;
        Ok(StreamAdapter {
            stream,
            raw_stream_key: settings.raw_stream_key.clone(),
            raw_consumer_group: settings.raw_consumer_group.clone(),
            processing_stream_key: settings.processing_stream_key.clone(),
            counters: Arc::new(Counters::default()),
            started_at: Instant::now(),
        })
    }

    pub fn metrics(&self) -> AdapterMetrics {
        let forwarded = self.counters.forwarded.load(Ordering::Relaxed);
        let dropped = self.counters.dropped.load(Ordering::Relaxed);
        let errors = self.counters.errors.load(Ordering::Relaxed);
        let latency_count = self.counters.latency_count.load(Ordering::Relaxed);
        let latency_sum_micros = self.counters.latency_sum_micros.load(Ordering::Relaxed);
        let avg_latency_ms = if latency_count > 0 {
            (latency_sum_micros as f64 / latency_count as f64) / 1000.0
        } else {
            0.0
        };
        let elapsed = self.started_at.elapsed().as_secs_f64().max(1e-6);
        let tps = forwarded as f64 / elapsed;
        AdapterMetrics {
            forwarded,
            dropped,
            errors,
            avg_latency_ms,
            tps,
        }
    }

    /// Spawns `worker_count` cooperating consumer loops, each with its own consumer
    /// name so Redis can track per-consumer pending-entries independently.
    pub fn spawn_consumers(self: Arc<Self>, worker_count: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..worker_count)
            .map(|i| {
                let adapter = self.clone();
                let consumer = format!("adapter-{i}");
                tokio::spawn(async move { adapter.run(consumer).await })
            })
            .collect()
    }

    async fn run(&self, consumer: String) {
        loop {
            let messages = match self
                .stream
                .read_group(&self.raw_stream_key, &self.raw_consumer_group, &consumer, 50, Duration::from_millis(500))
                .await
            {
                Ok(msgs) => msgs,
                Err(e) => {
                    warn!(consumer = %consumer, error = %e, "raw stream read failed, backing off");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Vec::new()
                }
            };
            for message in messages {
                self.process_one(&consumer, &message.id, &message.payload).await;
            }
        }
    }

    #[instrument(skip(self, payload), fields(consumer = %consumer))]
    async fn process_one(&self, consumer: &str, msg_id: &str, payload: &str) {
        let start = Instant::now();
        let outcome = self.validate_and_forward(payload).await;
        let elapsed_micros = start.elapsed().as_micros() as u64;
        self.counters.latency_sum_micros.fetch_add(elapsed_micros, Ordering::Relaxed);
        self.counters.latency_count.fetch_add(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("adapter_forwarded_total", 1);
            }
            Err(reason) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("adapter_dropped_total", 1);
                debug!(reason = %reason, "dropping malformed event");
            }
        }

        if let Err(e) = self.stream.ack(&self.raw_stream_key, &self.raw_consumer_group, msg_id).await {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, msg_id, "failed to ack raw stream message");
        }
    }

    async fn validate_and_forward(&self, payload: &str) -> Result<(), String> {
        let value = decode_payload(payload).map_err(|e| format!("undecodable payload: {e}"))?;
        let tx: TransactionInput = serde_json::from_value(value).map_err(|e| format!("schema mismatch: {e}"))?;
        tx.validate()?;

        let canonical = serde_json::to_value(&tx).map_err(|e| format!("re-encode failed: {e}"))?;
        let encoded = encode_payload(&canonical);
        self.stream
            .append(&self.processing_stream_key, &encoded)
            .await
            .map_err(|e| format!("forward failed: {e}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_default_to_zero_before_any_traffic() {
        let counters = Counters::default();
        assert_eq!(counters.forwarded.load(Ordering::Relaxed), 0);
        assert_eq!(counters.errors.load(Ordering::Relaxed), 0);
    }
}
