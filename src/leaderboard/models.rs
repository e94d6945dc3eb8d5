use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An administratively bounded scoring period. Immutable once created; the
/// active season is a separate pointer held by the season repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: String,
    pub name: String,
    pub date: DateTime<Utc>,
}

/// One user's standing on one board for one season.
///
/// Rank is dense and 0-based, recomputed from a full sort on every ranking
/// pass rather than maintained incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub season: String,
    pub user: String,
    pub score: i64,
    pub rank: u32,
}
