use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::models::{MaxRecord, RawStatEvent, StatBucket};
use super::{Granularity, StatsError};

/// Append-only store of flushed stat events awaiting consolidation.
#[async_trait]
pub trait RawEventLog: Send + Sync {
    /// Appends a flush batch as one write.
    async fn append(&self, events: Vec<RawStatEvent>) -> Result<(), StatsError>;

    /// Returns the full current content of the log.
    async fn fetch_all(&self) -> Result<Vec<RawStatEvent>, StatsError>;

    /// Removes events with `end_time <= cutoff`, returning how many were
    /// removed. Events appended after the cutoff survive to the next pass.
    async fn prune_through(&self, cutoff: DateTime<Utc>) -> Result<usize, StatsError>;

    async fn clear(&self) -> Result<(), StatsError>;
}

/// One element of a bucket merge's bulk write.
#[derive(Debug, Clone)]
pub enum BucketOp {
    /// First event for the key: the row is created with the raw deltas.
    Insert(StatBucket),
    /// Existing key: the row's metrics are replaced with the merged values.
    Update(StatBucket),
}

/// Aggregate rows per granularity, keyed (bucket_index, user, room).
#[async_trait]
pub trait BucketRepository: Send + Sync {
    async fn find_by_index(
        &self,
        granularity: Granularity,
        bucket_index: i64,
    ) -> Result<Vec<StatBucket>, StatsError>;

    async fn find_user_since(
        &self,
        granularity: Granularity,
        user: &str,
        from_index: i64,
    ) -> Result<Vec<StatBucket>, StatsError>;

    async fn find_room_user_since(
        &self,
        granularity: Granularity,
        room: &str,
        user: &str,
        from_index: i64,
    ) -> Result<Vec<StatBucket>, StatsError>;

    async fn find_rooms_since(
        &self,
        granularity: Granularity,
        rooms: &[String],
        from_index: i64,
    ) -> Result<Vec<StatBucket>, StatsError>;

    /// Applies a merge's insert/update set in one bulk write.
    async fn bulk_apply(
        &self,
        granularity: Granularity,
        ops: Vec<BucketOp>,
    ) -> Result<(), StatsError>;

    async fn clear(&self, granularity: Granularity) -> Result<(), StatsError>;
}

/// Monotonic per-bucket maxima, keyed (granularity, bucket_index).
#[async_trait]
pub trait MaxRecordRepository: Send + Sync {
    async fn find_all(&self) -> Result<Vec<MaxRecord>, StatsError>;

    async fn find_since(
        &self,
        granularity: Granularity,
        from_index: i64,
    ) -> Result<Vec<MaxRecord>, StatsError>;

    /// Raises the stored maxima to `record`'s values where they are higher.
    /// Existing maxima are never lowered.
    async fn upsert_max(&self, record: MaxRecord) -> Result<(), StatsError>;

    async fn clear(&self) -> Result<(), StatsError>;
}

/// In-memory implementation of the raw event log for development and testing
#[derive(Debug, Default)]
pub struct InMemoryRawEventLog {
    events: RwLock<Vec<RawStatEvent>>,
}

impl InMemoryRawEventLog {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RawEventLog for InMemoryRawEventLog {
    #[instrument(skip(self, events))]
    async fn append(&self, events: Vec<RawStatEvent>) -> Result<(), StatsError> {
        debug!(event_count = events.len(), "Appending stat event batch");
        self.events.write().await.extend(events);
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<RawStatEvent>, StatsError> {
        Ok(self.events.read().await.clone())
    }

    #[instrument(skip(self))]
    async fn prune_through(&self, cutoff: DateTime<Utc>) -> Result<usize, StatsError> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|event| event.end_time > cutoff);
        let pruned = before - events.len();
        debug!(pruned = pruned, "Pruned consumed stat events");
        Ok(pruned)
    }

    async fn clear(&self) -> Result<(), StatsError> {
        self.events.write().await.clear();
        Ok(())
    }
}

type BucketKey = (Granularity, i64, String, String);

/// In-memory implementation of the bucket store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryBucketRepository {
    buckets: RwLock<HashMap<BucketKey, StatBucket>>,
}

impl InMemoryBucketRepository {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
        }
    }

    fn key(bucket: &StatBucket) -> BucketKey {
        (
            bucket.granularity,
            bucket.bucket_index,
            bucket.user.clone(),
            bucket.room.clone(),
        )
    }
}

#[async_trait]
impl BucketRepository for InMemoryBucketRepository {
    async fn find_by_index(
        &self,
        granularity: Granularity,
        bucket_index: i64,
    ) -> Result<Vec<StatBucket>, StatsError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .values()
            .filter(|b| b.granularity == granularity && b.bucket_index == bucket_index)
            .cloned()
            .collect())
    }

    async fn find_user_since(
        &self,
        granularity: Granularity,
        user: &str,
        from_index: i64,
    ) -> Result<Vec<StatBucket>, StatsError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .values()
            .filter(|b| {
                b.granularity == granularity && b.user == user && b.bucket_index >= from_index
            })
            .cloned()
            .collect())
    }

    async fn find_room_user_since(
        &self,
        granularity: Granularity,
        room: &str,
        user: &str,
        from_index: i64,
    ) -> Result<Vec<StatBucket>, StatsError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .values()
            .filter(|b| {
                b.granularity == granularity
                    && b.room == room
                    && b.user == user
                    && b.bucket_index >= from_index
            })
            .cloned()
            .collect())
    }

    async fn find_rooms_since(
        &self,
        granularity: Granularity,
        rooms: &[String],
        from_index: i64,
    ) -> Result<Vec<StatBucket>, StatsError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .values()
            .filter(|b| {
                b.granularity == granularity
                    && b.bucket_index >= from_index
                    && rooms.contains(&b.room)
            })
            .cloned()
            .collect())
    }

    #[instrument(skip(self, ops))]
    async fn bulk_apply(
        &self,
        granularity: Granularity,
        ops: Vec<BucketOp>,
    ) -> Result<(), StatsError> {
        debug!(op_count = ops.len(), "Applying bucket bulk write");

        let mut buckets = self.buckets.write().await;
        for op in ops {
            match op {
                BucketOp::Insert(bucket) => {
                    let key = Self::key(&bucket);
                    if buckets.contains_key(&key) {
                        return Err(StatsError::Storage(format!(
                            "bucket already exists for {}/{}/{}/{}",
                            bucket.granularity, bucket.bucket_index, bucket.user, bucket.room
                        )));
                    }
                    buckets.insert(key, bucket);
                }
                BucketOp::Update(bucket) => {
                    let key = Self::key(&bucket);
                    match buckets.get_mut(&key) {
                        Some(existing) => existing.metrics = bucket.metrics,
                        None => {
                            return Err(StatsError::Storage(format!(
                                "no bucket to update for {}/{}/{}/{}",
                                bucket.granularity,
                                bucket.bucket_index,
                                bucket.user,
                                bucket.room
                            )))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self, granularity: Granularity) -> Result<(), StatsError> {
        let mut buckets = self.buckets.write().await;
        buckets.retain(|_, b| b.granularity != granularity);
        Ok(())
    }
}

/// In-memory implementation of the max-record store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryMaxRecordRepository {
    records: RwLock<HashMap<(Granularity, i64), MaxRecord>>,
}

impl InMemoryMaxRecordRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MaxRecordRepository for InMemoryMaxRecordRepository {
    async fn find_all(&self) -> Result<Vec<MaxRecord>, StatsError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn find_since(
        &self,
        granularity: Granularity,
        from_index: i64,
    ) -> Result<Vec<MaxRecord>, StatsError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.granularity == granularity && r.bucket_index >= from_index)
            .cloned()
            .collect())
    }

    #[instrument(skip(self, record))]
    async fn upsert_max(&self, record: MaxRecord) -> Result<(), StatsError> {
        let mut records = self.records.write().await;
        let key = (record.granularity, record.bucket_index);
        match records.get_mut(&key) {
            Some(existing) => {
                for (stat, observed) in record.metrics {
                    let entry = existing.metrics.entry(stat).or_insert(0);
                    if observed > *entry {
                        *entry = observed;
                    }
                }
            }
            None => {
                records.insert(key, record);
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StatsError> {
        self.records.write().await.clear();
        Ok(())
    }
}
