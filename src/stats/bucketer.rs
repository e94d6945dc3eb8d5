use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument};

use super::models::{MaxRecord, MetricMap, RawStatEvent, StatBucket};
use super::repository::{BucketOp, BucketRepository, MaxRecordRepository};
use super::{Granularity, StatsError};

use strum::IntoEnumIterator;

/// What one granularity merge did, for consolidation logging.
#[derive(Debug, Clone, Copy)]
pub struct MergeSummary {
    pub ops_applied: usize,
    pub indices_touched: usize,
}

/// Folds raw stat events into per-granularity cumulative buckets and keeps
/// the per-bucket maximum records current.
///
/// Merges on the same granularity are serialized through a per-granularity
/// lock; different granularities merge concurrently.
pub struct Bucketer {
    buckets: Arc<dyn BucketRepository>,
    max_records: Arc<dyn MaxRecordRepository>,
    granularity_locks: HashMap<Granularity, AsyncMutex<()>>,
}

impl Bucketer {
    pub fn new(
        buckets: Arc<dyn BucketRepository>,
        max_records: Arc<dyn MaxRecordRepository>,
    ) -> Self {
        let granularity_locks = Granularity::iter()
            .map(|g| (g, AsyncMutex::new(())))
            .collect();
        Self {
            buckets,
            max_records,
            granularity_locks,
        }
    }

    /// Merges a batch of raw events into one granularity's buckets and
    /// refreshes the granularity's max records for the touched buckets
    /// inside the current trailing window.
    ///
    /// Each (bucket_index, user, room) key gets exactly one read-modify-write:
    /// existing rows are loaded, deltas added, and the result applied as a
    /// minimal set of insert/update operations in one bulk write.
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    pub async fn merge_batch(
        &self,
        granularity: Granularity,
        events: &[RawStatEvent],
        now: DateTime<Utc>,
    ) -> Result<MergeSummary, StatsError> {
        let _guard = self.granularity_locks[&granularity].lock().await;

        // Group deltas by key; one event per (room, user) per flush cycle,
        // but several cycles can land in the same bucket.
        let mut grouped: HashMap<(i64, String, String), MetricMap> = HashMap::new();
        for event in events {
            let index = granularity.bucket_index(event.end_time);
            let deltas = grouped
                .entry((index, event.user.clone(), event.room.clone()))
                .or_default();
            for (stat, amount) in &event.metrics {
                let entry = deltas.entry(*stat).or_insert(0);
                *entry = entry.saturating_add(*amount);
            }
        }

        if grouped.is_empty() {
            return Ok(MergeSummary {
                ops_applied: 0,
                indices_touched: 0,
            });
        }

        let touched: BTreeSet<i64> = grouped.keys().map(|(index, _, _)| *index).collect();

        // Load every current row of the touched buckets so the max
        // recomputation sees rows this batch did not touch.
        let mut current: HashMap<(i64, String, String), StatBucket> = HashMap::new();
        for index in &touched {
            for bucket in self.buckets.find_by_index(granularity, *index).await? {
                current.insert(
                    (bucket.bucket_index, bucket.user.clone(), bucket.room.clone()),
                    bucket,
                );
            }
        }

        let mut ops = Vec::with_capacity(grouped.len());
        for ((index, user, room), deltas) in grouped {
            match current.get_mut(&(index, user.clone(), room.clone())) {
                Some(bucket) => {
                    bucket.merge(&deltas);
                    ops.push(BucketOp::Update(bucket.clone()));
                }
                None => {
                    let bucket = StatBucket {
                        granularity,
                        bucket_index: index,
                        user: user.clone(),
                        room: room.clone(),
                        metrics: deltas,
                    };
                    current.insert((index, user, room), bucket.clone());
                    ops.push(BucketOp::Insert(bucket));
                }
            }
        }

        let ops_applied = ops.len();
        self.buckets.bulk_apply(granularity, ops).await?;

        self.refresh_max_records(granularity, &touched, &current, now)
            .await?;

        debug!(
            granularity = %granularity,
            ops_applied = ops_applied,
            indices_touched = touched.len(),
            "Merged stat batch"
        );

        Ok(MergeSummary {
            ops_applied,
            indices_touched: touched.len(),
        })
    }

    /// Recomputes the per-metric maximum for each touched bucket index that
    /// is still inside the trailing window, across all users and rooms, and
    /// raises the stored record where the observed value is higher.
    ///
    /// The recorded maxima may combine values from different users and rooms
    /// in the same bucket; that coarseness is accepted.
    async fn refresh_max_records(
        &self,
        granularity: Granularity,
        touched: &BTreeSet<i64>,
        current: &HashMap<(i64, String, String), StatBucket>,
        now: DateTime<Utc>,
    ) -> Result<(), StatsError> {
        let window_start = granularity.window_start(now);
        let now_index = granularity.bucket_index(now);

        for index in touched {
            if *index < window_start || *index > now_index {
                continue;
            }

            let mut maxima = MetricMap::new();
            for bucket in current.values().filter(|b| b.bucket_index == *index) {
                for (stat, value) in &bucket.metrics {
                    if *value > 0 && *value > maxima.get(stat).copied().unwrap_or(0) {
                        maxima.insert(*stat, *value);
                    }
                }
            }

            if maxima.is_empty() {
                continue;
            }

            self.max_records
                .upsert_max(MaxRecord {
                    granularity,
                    bucket_index: *index,
                    metrics: maxima,
                })
                .await?;
        }

        Ok(())
    }
}
