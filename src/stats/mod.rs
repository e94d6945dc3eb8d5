pub mod accumulator;
pub mod bucketer;
pub mod consolidator;
pub mod service;

mod errors;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod types;

pub use accumulator::{RoomStatsUpdater, StatAccumulator};
pub use bucketer::Bucketer;
pub use consolidator::{ConsolidationConfig, ConsolidationOutcome, Consolidator};
pub use errors::StatsError;
pub use models::*;
pub use repository::{
    BucketOp, BucketRepository, InMemoryBucketRepository, InMemoryMaxRecordRepository,
    InMemoryRawEventLog, MaxRecordRepository, RawEventLog,
};
pub use service::StatsQueryService;

use std::fmt;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// The per-room counters tracked by the aggregation engine.
///
/// Wire names are camelCase to match what game-logic callers and the
/// frontend use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, EnumIter,
)]
#[serde(rename_all = "camelCase")]
pub enum StatName {
    EnergyHarvested,
    EnergyConstruction,
    EnergyCreeps,
    EnergyControl,
    CreepsProduced,
    CreepsLost,
    PowerProcessed,
}

impl fmt::Display for StatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                StatName::EnergyHarvested => "energyHarvested",
                StatName::EnergyConstruction => "energyConstruction",
                StatName::EnergyCreeps => "energyCreeps",
                StatName::EnergyControl => "energyControl",
                StatName::CreepsProduced => "creepsProduced",
                StatName::CreepsLost => "creepsLost",
                StatName::PowerProcessed => "powerProcessed",
            }
        )
    }
}

impl TryFrom<&str> for StatName {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "energyHarvested" => Ok(StatName::EnergyHarvested),
            "energyConstruction" => Ok(StatName::EnergyConstruction),
            "energyCreeps" => Ok(StatName::EnergyCreeps),
            "energyControl" => Ok(StatName::EnergyControl),
            "creepsProduced" => Ok(StatName::CreepsProduced),
            "creepsLost" => Ok(StatName::CreepsLost),
            "powerProcessed" => Ok(StatName::PowerProcessed),
            _ => Err(s.to_string()),
        }
    }
}

/// A configured time-bucket width at which metrics are aggregated.
///
/// Each granularity runs independently: 8-minute buckets for the short
/// window, 3-hour buckets for the day view, daily buckets for the week view.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, EnumIter,
)]
pub enum Granularity {
    Minutes8,
    Minutes180,
    Minutes1440,
}

impl Granularity {
    /// Bucket width in minutes. This is also the wire representation used
    /// by the query API (`interval=8`).
    pub fn minutes(&self) -> u32 {
        match self {
            Granularity::Minutes8 => 8,
            Granularity::Minutes180 => 180,
            Granularity::Minutes1440 => 1440,
        }
    }

    /// How many trailing buckets queries consider still open.
    pub fn retained_buckets(&self) -> i64 {
        match self {
            Granularity::Minutes8 => 8,
            Granularity::Minutes180 => 8,
            Granularity::Minutes1440 => 7,
        }
    }

    pub fn interval_millis(&self) -> i64 {
        self.minutes() as i64 * 60 * 1000
    }

    /// Integer time-bucket identifier for a wall-clock instant.
    pub fn bucket_index(&self, at: chrono::DateTime<chrono::Utc>) -> i64 {
        at.timestamp_millis().div_euclid(self.interval_millis())
    }

    /// First bucket index of the trailing window that ends at `at`.
    pub fn window_start(&self, at: chrono::DateTime<chrono::Utc>) -> i64 {
        self.bucket_index(at) - self.retained_buckets() + 1
    }

    pub fn from_minutes(minutes: u32) -> Option<Granularity> {
        Granularity::iter().find(|g| g.minutes() == minutes)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.minutes())
    }
}
