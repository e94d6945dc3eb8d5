use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::service::StatsQueryService;
use super::types::{
    MapStatsRequest, MapStatsResponse, RoomOverviewQuery, RoomOverviewResponse, UserStatsQuery,
    UserStatsResponse,
};
use crate::shared::{AppError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/user/stats", get(user_stats))
        .route("/api/game/room-overview", get(room_overview))
        .route("/api/game/map-stats", post(map_stats))
}

fn service(state: &AppState) -> StatsQueryService {
    StatsQueryService::new(
        Arc::clone(&state.bucket_repository),
        Arc::clone(&state.max_record_repository),
        Arc::clone(&state.room_repository),
        Arc::clone(&state.user_directory),
    )
}

/// HTTP handler for a user's summed window stats
///
/// GET /api/user/stats?interval=8&id=<userId>
#[instrument(name = "user_stats", skip(state))]
async fn user_stats(
    State(state): State<AppState>,
    Query(query): Query<UserStatsQuery>,
) -> Result<Json<UserStatsResponse>, AppError> {
    let stats = service(&state).user_stats(&query.id, query.interval).await?;
    Ok(Json(UserStatsResponse { ok: 1, stats }))
}

/// HTTP handler for a room's time series and records
///
/// GET /api/game/room-overview?room=<roomName>&interval=<minutes per chunk>
#[instrument(name = "room_overview", skip(state))]
async fn room_overview(
    State(state): State<AppState>,
    Query(query): Query<RoomOverviewQuery>,
) -> Result<Json<RoomOverviewResponse>, AppError> {
    let interval = query.interval.unwrap_or(8);
    let overview = service(&state).room_overview(&query.room, interval).await?;
    Ok(Json(overview))
}

/// HTTP handler for the map overlay snapshot
///
/// POST /api/game/map-stats
#[instrument(name = "map_stats", skip(state, request))]
async fn map_stats(
    State(state): State<AppState>,
    Json(request): Json<MapStatsRequest>,
) -> Result<Json<MapStatsResponse>, AppError> {
    info!(
        room_count = request.rooms.len(),
        stat_name = %request.stat_name,
        "Serving map stats"
    );
    let response = service(&state)
        .map_stats(&request.rooms, &request.stat_name)
        .await?;
    Ok(Json(response))
}
