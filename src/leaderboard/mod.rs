pub mod ranker;
pub mod season;
pub mod service;

mod errors;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod types;

pub use errors::LeaderboardError;
pub use models::{LeaderboardEntry, Season};
pub use ranker::LeaderboardRanker;
pub use repository::{
    EntryOp, InMemoryLeaderboardRepository, InMemorySeasonRepository, LeaderboardRepository,
    SeasonRepository,
};
pub use season::SeasonController;
pub use service::LeaderboardQueryService;

use std::fmt;
use strum_macros::EnumIter;

use crate::stats::StatName;

/// A named leaderboard, each scored from one source metric.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    World,
    Power,
}

impl ScoringMode {
    /// The metric whose per-user deltas feed this board's scores.
    pub fn source_stat(&self) -> StatName {
        match self {
            ScoringMode::World => StatName::EnergyControl,
            ScoringMode::Power => StatName::PowerProcessed,
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ScoringMode::World => "world",
                ScoringMode::Power => "power",
            }
        )
    }
}

impl TryFrom<&str> for ScoringMode {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "world" => Ok(ScoringMode::World),
            "power" => Ok(ScoringMode::Power),
            _ => Err(s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_map_to_their_source_stats() {
        assert_eq!(ScoringMode::World.source_stat(), StatName::EnergyControl);
        assert_eq!(ScoringMode::Power.source_stat(), StatName::PowerProcessed);
    }

    #[test]
    fn mode_wire_names_round_trip() {
        assert_eq!(ScoringMode::try_from("world"), Ok(ScoringMode::World));
        assert_eq!(ScoringMode::try_from("power"), Ok(ScoringMode::Power));
        assert!(ScoringMode::try_from("combat").is_err());
        assert_eq!(ScoringMode::World.to_string(), "world");
    }
}
