// Library crate for the room stats aggregation server
// This file exposes the public API for integration tests

pub mod console;
pub mod leaderboard;
pub mod room;
pub mod shared;
pub mod stats;
pub mod user;

// Re-export commonly used types for easier access in tests
pub use leaderboard::{
    LeaderboardEntry, LeaderboardRanker, ScoringMode, Season, SeasonController,
};
pub use shared::{AppError, AppState};
pub use stats::{
    Consolidator, Granularity, RawStatEvent, StatAccumulator, StatBucket, StatName,
};

use axum::Router;

/// The full HTTP surface: read-only queries plus the operator console.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(stats::handlers::routes())
        .merge(leaderboard::handlers::routes())
        .merge(console::handlers::routes())
        .with_state(state)
}
