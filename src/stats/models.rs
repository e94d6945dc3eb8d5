use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Granularity, StatName};

/// Per-metric counter values. Only nonzero metrics are stored.
pub type MetricMap = HashMap<StatName, i64>;

/// One flushed batch entry: everything a single (room, user) pair
/// accumulated during one flush cycle. Immutable once appended to the raw
/// event log; deleted by the consolidation pass that consumed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStatEvent {
    pub room: String,
    pub user: String,
    pub end_time: DateTime<Utc>,
    pub metrics: MetricMap,
}

/// Cumulative aggregate for one (granularity, bucket index, user, room) key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatBucket {
    pub granularity: Granularity,
    pub bucket_index: i64,
    pub user: String,
    pub room: String,
    pub metrics: MetricMap,
}

impl StatBucket {
    /// Adds `deltas` into the bucket's cumulative metrics.
    pub fn merge(&mut self, deltas: &MetricMap) {
        for (stat, amount) in deltas {
            let entry = self.metrics.entry(*stat).or_insert(0);
            *entry = entry.saturating_add(*amount);
        }
    }
}

/// Highest per-metric value observed in one bucket, across all users and
/// rooms that contributed to it. Values never decrease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxRecord {
    pub granularity: Granularity,
    pub bucket_index: i64,
    pub metrics: MetricMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_deltas_into_existing_metrics() {
        let mut bucket = StatBucket {
            granularity: Granularity::Minutes8,
            bucket_index: 10,
            user: "u1".to_string(),
            room: "W1N1".to_string(),
            metrics: HashMap::from([(StatName::EnergyHarvested, 100)]),
        };

        bucket.merge(&HashMap::from([
            (StatName::EnergyHarvested, 50),
            (StatName::CreepsProduced, 2),
        ]));

        assert_eq!(bucket.metrics[&StatName::EnergyHarvested], 150);
        assert_eq!(bucket.metrics[&StatName::CreepsProduced], 2);
    }

    #[test]
    fn merge_saturates_instead_of_wrapping() {
        let mut bucket = StatBucket {
            granularity: Granularity::Minutes8,
            bucket_index: 0,
            user: "u1".to_string(),
            room: "W1N1".to_string(),
            metrics: HashMap::from([(StatName::EnergyHarvested, i64::MAX)]),
        };

        bucket.merge(&HashMap::from([(StatName::EnergyHarvested, 1)]));

        assert_eq!(bucket.metrics[&StatName::EnergyHarvested], i64::MAX);
    }
}
