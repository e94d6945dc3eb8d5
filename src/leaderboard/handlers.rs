use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::instrument;

use super::service::LeaderboardQueryService;
use super::types::{
    LeaderboardFindQuery, LeaderboardFindResponse, LeaderboardListQuery, LeaderboardListResponse,
    SeasonsResponse,
};
use crate::shared::{AppError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/leaderboard/list", get(list))
        .route("/api/leaderboard/find", get(find))
        .route("/api/leaderboard/seasons", get(seasons))
}

fn service(state: &AppState) -> LeaderboardQueryService {
    LeaderboardQueryService::new(
        Arc::clone(&state.leaderboard_repository),
        Arc::clone(&state.season_repository),
        Arc::clone(&state.user_directory),
    )
}

/// HTTP handler for a season's standings page
///
/// GET /api/leaderboard/list?mode=world&season=2024-01&limit=10&offset=0
#[instrument(name = "leaderboard_list", skip(state))]
async fn list(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardListQuery>,
) -> Result<Json<LeaderboardListResponse>, AppError> {
    let response = service(&state)
        .list(&query.mode, &query.season, query.limit, query.offset)
        .await?;
    Ok(Json(response))
}

/// HTTP handler for a single user's standing
///
/// GET /api/leaderboard/find?mode=world&username=alice[&season=2024-01]
#[instrument(name = "leaderboard_find", skip(state))]
async fn find(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardFindQuery>,
) -> Result<Json<LeaderboardFindResponse>, AppError> {
    let response = service(&state)
        .find(&query.mode, &query.username, query.season.as_deref())
        .await?;
    Ok(Json(response))
}

/// HTTP handler for the season list
///
/// GET /api/leaderboard/seasons
#[instrument(name = "leaderboard_seasons", skip(state))]
async fn seasons(State(state): State<AppState>) -> Result<Json<SeasonsResponse>, AppError> {
    let response = service(&state).seasons().await?;
    Ok(Json(response))
}
