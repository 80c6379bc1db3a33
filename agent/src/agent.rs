// Per-vehicle agent loop: compress, ship or buffer, drain on reconnect.
// Invariants: buffered records are drained before the next live record is
// sent; a sample is only lost on an explicit buffer append failure, and that
// loss is logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use telemetry_core::codec;
use telemetry_core::model::{Sample, TransmissionRecord};
use telemetry_core::predictor::Predictor;

use crate::buffer::{BufferStore, StoreError};
use crate::constants::{DRAIN_PAUSE_MS, STATS_CHECKPOINT_SAMPLES};
use crate::source::{SampleSource, SourceError};
use crate::transport::Uploader;

pub struct Agent<U> {
    vin: String,
    predictor: Predictor,
    buffer: BufferStore,
    transport: U,
    link_online: Arc<AtomicBool>,
    was_offline: bool,
    needs_drain: bool,
}

impl<U: Uploader> Agent<U> {
    pub fn new(
        vin: String,
        predictor: Predictor,
        buffer: BufferStore,
        transport: U,
        link_online: Arc<AtomicBool>,
    ) -> Result<Self, StoreError> {
        // A previous run may have left a backlog behind.
        let needs_drain = buffer.pending_count()? > 0;
        Ok(Self {
            vin,
            predictor,
            buffer,
            transport,
            link_online,
            was_offline: false,
            needs_drain,
        })
    }

    pub fn buffer(&self) -> &BufferStore {
        &self.buffer
    }

    pub async fn run(mut self, source: &mut SampleSource) {
        while let Some(next) = source.next_sample().await {
            let sample = match next {
                Ok(sample) => sample,
                Err(SourceError::Parse(err)) => {
                    warn!(vin = %self.vin, ?err, "skipping malformed sample line");
                    continue;
                }
                Err(SourceError::Io(err)) => {
                    error!(vin = %self.vin, ?err, "sample source read failed; stopping");
                    break;
                }
            };

            let delay = source.pacing_delay(&sample);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.process_sample(&sample).await;
        }
        self.shutdown().await;
    }

    pub async fn process_sample(&mut self, sample: &Sample) {
        let decisions = self.predictor.decide(sample, Instant::now());
        let compressed = codec::encode(&TransmissionRecord::compressed(sample, &decisions));

        if self.link_online.load(Ordering::Relaxed) {
            if self.was_offline || self.needs_drain {
                self.drain().await;
                self.was_offline = false;
            }
            match self.transport.upload(&compressed).await {
                Ok(()) => {
                    info!(
                        vin = %self.vin,
                        timestamp = sample.timestamp,
                        resync = decisions.is_resync,
                        "sample shipped"
                    );
                }
                Err(err) => {
                    warn!(
                        vin = %self.vin,
                        timestamp = sample.timestamp,
                        ?err,
                        "upload failed; buffering full record"
                    );
                    self.buffer_full_record(sample);
                }
            }
        } else {
            // Offline backlog must be self-sufficient ground truth; the
            // server predictor drifts arbitrarily during an outage.
            self.buffer_full_record(sample);
            self.was_offline = true;
        }

        let stats = self.predictor.stats();
        if stats.total % STATS_CHECKPOINT_SAMPLES == 0 {
            info!(
                vin = %self.vin,
                total = stats.total,
                transmitted = stats.transmitted,
                skipped = stats.skipped,
                compression_pct = stats.compression_ratio(),
                "compression checkpoint"
            );
        }
    }

    fn buffer_full_record(&mut self, sample: &Sample) {
        let payload = codec::encode(&TransmissionRecord::full(sample));
        match self.buffer.store(sample.timestamp, &payload) {
            Ok(()) => {
                self.needs_drain = true;
                info!(vin = %self.vin, timestamp = sample.timestamp, "sample buffered");
            }
            Err(err) => {
                error!(
                    vin = %self.vin,
                    timestamp = sample.timestamp,
                    ?err,
                    "buffer append failed; sample lost"
                );
            }
        }
    }

    /// Uploads buffered records oldest-first, removing each on success and
    /// pausing between uploads so downstream rate derivatives stay sane.
    /// Stops at the first transport failure; the backlog is retried on the
    /// next pass.
    pub async fn drain(&mut self) {
        let entries = match self.buffer.oldest_first() {
            Ok(entries) => entries,
            Err(err) => {
                error!(vin = %self.vin, ?err, "buffer read failed; drain skipped");
                return;
            }
        };
        if entries.is_empty() {
            self.needs_drain = false;
            return;
        }
        info!(vin = %self.vin, pending = entries.len(), "draining buffered records");

        for entry in entries {
            if let Err(err) = codec::decode(&entry.payload) {
                warn!(vin = %self.vin, id = entry.id, ?err, "malformed buffered record");
                match self.buffer.record_poison(entry.id) {
                    Ok(true) => {
                        warn!(vin = %self.vin, id = entry.id, "buffered record moved to dead letter")
                    }
                    Ok(false) => {}
                    Err(store_err) => {
                        error!(vin = %self.vin, id = entry.id, ?store_err, "poison strike not recorded")
                    }
                }
                continue;
            }

            match self.transport.upload(&entry.payload).await {
                Ok(()) => {
                    if let Err(err) = self.buffer.remove(entry.id) {
                        warn!(
                            vin = %self.vin,
                            id = entry.id,
                            ?err,
                            "drained entry not removed; may upload again"
                        );
                    }
                    info!(
                        vin = %self.vin,
                        id = entry.id,
                        timestamp = entry.timestamp,
                        "buffered record drained"
                    );
                    tokio::time::sleep(Duration::from_millis(DRAIN_PAUSE_MS)).await;
                }
                Err(err) => {
                    warn!(
                        vin = %self.vin,
                        id = entry.id,
                        ?err,
                        "drain upload failed; will resume from this entry"
                    );
                    break;
                }
            }
        }

        self.needs_drain = match self.buffer.pending_count() {
            Ok(count) => count > 0,
            Err(_) => true,
        };
    }

    pub async fn shutdown(mut self) {
        if self.link_online.load(Ordering::Relaxed) && (self.was_offline || self.needs_drain) {
            self.drain().await;
        }

        let stats = self.predictor.stats();
        info!(
            vin = %self.vin,
            total = stats.total,
            transmitted = stats.transmitted,
            skipped = stats.skipped,
            compression_pct = stats.compression_ratio(),
            "agent shutting down"
        );

        if let Err(err) = self.buffer.close() {
            warn!(?err, "buffer close failed");
        }
    }
}
