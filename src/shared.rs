use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::leaderboard::repository::{LeaderboardRepository, SeasonRepository};
use crate::leaderboard::{LeaderboardError, LeaderboardRanker};
use crate::room::repository::{InMemoryRoomRepository, RoomRepository};
use crate::stats::repository::{
    BucketRepository, InMemoryBucketRepository, InMemoryMaxRecordRepository, InMemoryRawEventLog,
    MaxRecordRepository, RawEventLog,
};
use crate::stats::{Bucketer, Consolidator, StatAccumulator, StatsError};
use crate::user::directory::{InMemoryUserDirectory, UserDirectory};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub accumulator: Arc<StatAccumulator>,
    pub raw_event_log: Arc<dyn RawEventLog>,
    pub bucket_repository: Arc<dyn BucketRepository>,
    pub max_record_repository: Arc<dyn MaxRecordRepository>,
    pub leaderboard_repository: Arc<dyn LeaderboardRepository>,
    pub season_repository: Arc<dyn SeasonRepository>,
    pub room_repository: Arc<dyn RoomRepository>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub consolidator: Arc<Consolidator>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accumulator: Arc<StatAccumulator>,
        raw_event_log: Arc<dyn RawEventLog>,
        bucket_repository: Arc<dyn BucketRepository>,
        max_record_repository: Arc<dyn MaxRecordRepository>,
        leaderboard_repository: Arc<dyn LeaderboardRepository>,
        season_repository: Arc<dyn SeasonRepository>,
        room_repository: Arc<dyn RoomRepository>,
        user_directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let bucketer = Arc::new(Bucketer::new(
            Arc::clone(&bucket_repository),
            Arc::clone(&max_record_repository),
        ));
        let ranker = Arc::new(LeaderboardRanker::new(
            Arc::clone(&season_repository),
            Arc::clone(&leaderboard_repository),
        ));
        let consolidator = Arc::new(Consolidator::new(
            Arc::clone(&raw_event_log),
            bucketer,
            ranker,
        ));

        Self {
            accumulator,
            raw_event_log,
            bucket_repository,
            max_record_repository,
            leaderboard_repository,
            season_repository,
            room_repository,
            user_directory,
            consolidator,
        }
    }

    /// Fully in-memory wiring, for development and tests.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(StatAccumulator::new()),
            Arc::new(InMemoryRawEventLog::new()),
            Arc::new(InMemoryBucketRepository::new()),
            Arc::new(InMemoryMaxRecordRepository::new()),
            Arc::new(crate::leaderboard::repository::InMemoryLeaderboardRepository::new()),
            Arc::new(crate::leaderboard::repository::InMemorySeasonRepository::new()),
            Arc::new(InMemoryRoomRepository::new()),
            Arc::new(InMemoryUserDirectory::new()),
        )
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal server error")]
    Internal,
}

impl From<StatsError> for AppError {
    fn from(e: StatsError) -> Self {
        match e {
            StatsError::InvalidParams(msg) => AppError::InvalidParams(msg),
            StatsError::Storage(msg) => AppError::StorageError(msg),
        }
    }
}

impl From<LeaderboardError> for AppError {
    fn from(e: LeaderboardError) -> Self {
        match e {
            LeaderboardError::InvalidParams(msg) => AppError::InvalidParams(msg),
            LeaderboardError::Storage(msg) => AppError::StorageError(msg),
            LeaderboardError::PartialFailure { failed, attempted } => AppError::StorageError(
                format!("ranking failed for {failed} of {attempted} modes"),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidParams(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::StorageError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Storage error: {}", msg),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
