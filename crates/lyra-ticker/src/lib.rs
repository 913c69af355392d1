//! # Lyra Ticker
//!
//! Epoch clock for the Lyra runtime. Emits a [`TickEvent`] with a strictly
//! increasing epoch on the `ticker` topic at a fixed cadence.
//!
//! Epochs count emitted ticks, not elapsed wall time: missed or delayed
//! ticks are not compensated.

use lyra_bus::{topics, Bus};
use lyra_core::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default tick interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Event emitted by the ticker at regular intervals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TickEvent {
    /// Monotonically increasing tick counter, starting at zero.
    pub epoch: u64,
    /// Emission time.
    pub timestamp: Timestamp,
}

/// Emits [`TickEvent`]s through the bus at a fixed interval.
pub struct Ticker {
    bus: Arc<Bus>,
    interval: Duration,
    epoch: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    /// Creates a new ticker publishing on the `ticker` topic.
    pub fn new(bus: Arc<Bus>, interval_ms: u64) -> Self {
        debug!(interval_ms, "ticker initialized");
        Self {
            bus,
            interval: Duration::from_millis(interval_ms),
            epoch: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Starts the tick loop. Starting a running ticker is a warning no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("ticker is already running");
            return;
        }

        let bus = self.bus.clone();
        let interval = self.interval;
        let epoch = self.epoch.clone();
        let running = self.running.clone();

        let handle = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let event = TickEvent {
                    epoch: epoch.fetch_add(1, Ordering::SeqCst),
                    timestamp: Timestamp::now(),
                };
                match serde_json::to_value(event) {
                    Ok(payload) => {
                        bus.publish(topics::TICKER, payload, Some("ticker".to_string()));
                    }
                    Err(err) => warn!(error = %err, "failed to encode tick event"),
                }
                debug!(epoch = event.epoch, "emitted tick");
                tokio::time::sleep(interval).await;
            }
        });

        *self.task.lock() = Some(handle);
        info!(interval_ms = self.interval.as_millis() as u64, "ticker started");
    }

    /// Stops the tick loop, cancelling any in-flight sleep. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        info!("ticker stopped");
    }

    /// Returns true while the tick loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The epoch the next tick will carry.
    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
