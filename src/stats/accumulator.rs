use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use super::models::{MetricMap, RawStatEvent};
use super::repository::RawEventLog;
use super::{StatName, StatsError};

/// In-process counter table fed by game-logic callers.
///
/// Increments are coalesced per (room, user, stat) until the next flush
/// turns them into raw stat events. Purely in-memory; incrementing never
/// fails and performs no I/O.
#[derive(Debug, Default)]
pub struct StatAccumulator {
    pending: Mutex<HashMap<(String, String), MetricMap>>,
}

impl StatAccumulator {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Adds `amount` to the running total for (room, user, stat).
    pub fn increment(&self, room: &str, user: &str, stat: StatName, amount: i64) {
        let mut pending = self.pending.lock().unwrap();
        let metrics = pending
            .entry((room.to_string(), user.to_string()))
            .or_default();
        let entry = metrics.entry(stat).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Per-room increment handle handed to game-logic collaborators.
    pub fn updater(self: &Arc<Self>, room: &str) -> RoomStatsUpdater {
        RoomStatsUpdater {
            accumulator: Arc::clone(self),
            room: room.to_string(),
        }
    }

    /// Snapshots and clears the table, then appends one event per
    /// (room, user) pair with at least one nonzero metric as a single batch.
    /// Returns the number of events written; an empty table writes nothing.
    #[instrument(skip(self, log))]
    pub async fn flush(&self, log: &dyn RawEventLog) -> Result<usize, StatsError> {
        let drained = {
            let mut pending = self.pending.lock().unwrap();
            std::mem::take(&mut *pending)
        };

        let end_time = Utc::now();
        let events: Vec<RawStatEvent> = drained
            .iter()
            .filter_map(|((room, user), metrics)| {
                let metrics: MetricMap = metrics
                    .iter()
                    .filter(|(_, amount)| **amount != 0)
                    .map(|(stat, amount)| (*stat, *amount))
                    .collect();
                if metrics.is_empty() {
                    return None;
                }
                Some(RawStatEvent {
                    room: room.clone(),
                    user: user.clone(),
                    end_time,
                    metrics,
                })
            })
            .collect();

        if events.is_empty() {
            debug!("Nothing accumulated, skipping flush");
            return Ok(0);
        }

        let count = events.len();
        if let Err(e) = log.append(events).await {
            // Counters drained for a failed batch go back so the next
            // flush retries them.
            let mut pending = self.pending.lock().unwrap();
            for ((room, user), metrics) in drained {
                let entry = pending.entry((room, user)).or_default();
                for (stat, amount) in metrics {
                    let total = entry.entry(stat).or_insert(0);
                    *total = total.saturating_add(amount);
                }
            }
            return Err(e);
        }

        info!(event_count = count, "Flushed stat events to raw log");
        Ok(count)
    }

    #[cfg(test)]
    pub fn pending_pairs(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

/// Increment handle bound to one room.
#[derive(Clone)]
pub struct RoomStatsUpdater {
    accumulator: Arc<StatAccumulator>,
    room: String,
}

impl RoomStatsUpdater {
    pub fn inc(&self, stat: StatName, user: &str, amount: i64) {
        self.accumulator.increment(&self.room, user, stat, amount);
    }
}

/// Configuration for the periodic flush task
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// How often accumulated counters are flushed to the raw event log
    pub flush_interval: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(10),
        }
    }
}

/// Starts the background task that periodically flushes the accumulator
/// into the raw event log.
#[instrument(skip(accumulator, log))]
pub async fn start_flush_task(
    accumulator: Arc<StatAccumulator>,
    log: Arc<dyn RawEventLog>,
    config: FlushConfig,
) {
    info!(
        flush_interval_secs = config.flush_interval.as_secs(),
        "Starting stat flush background task"
    );

    let mut flush_interval = interval(config.flush_interval);

    loop {
        flush_interval.tick().await;

        match accumulator.flush(log.as_ref()).await {
            Ok(0) => {}
            Ok(count) => {
                debug!(event_count = count, "Flush cycle completed");
            }
            Err(e) => {
                error!(error = %e, "Flush cycle failed, counters retained");
            }
        }
    }
}
