use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{info, instrument};

use crate::leaderboard::models::Season;
use crate::leaderboard::SeasonController;
use crate::shared::{AppError, AppState};
use crate::stats::repository::{BucketRepository, MaxRecordRepository, RawEventLog};
use crate::stats::{ConsolidationOutcome, Granularity};

/// Operator endpoints: season rotation and resets, stat wipes, and
/// out-of-cycle consolidation. These mutate, so they live apart from the
/// read-only query API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/console/rotate-season", post(rotate_season))
        .route("/api/console/reset-season", post(reset_season))
        .route("/api/console/clear-stats", post(clear_stats))
        .route("/api/console/consolidate", post(consolidate))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RotateSeasonResponse {
    pub ok: u8,
    pub season: Season,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConsolidateResponse {
    pub ok: u8,
    /// false when a previous pass was still in flight and this trigger was
    /// skipped
    pub ran: bool,
    pub events_seen: usize,
    pub events_pruned: usize,
}

fn season_controller(state: &AppState) -> SeasonController {
    SeasonController::new(
        Arc::clone(&state.season_repository),
        Arc::clone(&state.leaderboard_repository),
    )
}

/// HTTP handler for starting or re-activating the current calendar season
///
/// POST /api/console/rotate-season
#[instrument(name = "rotate_season", skip(state))]
async fn rotate_season(
    State(state): State<AppState>,
) -> Result<Json<RotateSeasonResponse>, AppError> {
    let season = season_controller(&state).rotate().await?;
    info!(season_id = %season.id, "Season rotated");
    Ok(Json(RotateSeasonResponse { ok: 1, season }))
}

/// HTTP handler for wiping all leaderboards
///
/// POST /api/console/reset-season
#[instrument(name = "reset_season", skip(state))]
async fn reset_season(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    season_controller(&state).reset().await?;
    Ok(Json(OkResponse { ok: 1 }))
}

/// HTTP handler for wiping buckets, records, and the raw event log
///
/// POST /api/console/clear-stats
#[instrument(name = "clear_stats", skip(state))]
async fn clear_stats(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    state.raw_event_log.clear().await?;
    for granularity in Granularity::iter() {
        state.bucket_repository.clear(granularity).await?;
    }
    state.max_record_repository.clear().await?;
    info!("Cleared all stat data");
    Ok(Json(OkResponse { ok: 1 }))
}

/// HTTP handler for an out-of-cycle consolidation pass
///
/// POST /api/console/consolidate
#[instrument(name = "consolidate", skip(state))]
async fn consolidate(State(state): State<AppState>) -> Result<Json<ConsolidateResponse>, AppError> {
    let outcome = state.consolidator.run_once().await?;
    let response = match outcome {
        ConsolidationOutcome::Completed(report) => ConsolidateResponse {
            ok: 1,
            ran: true,
            events_seen: report.events_seen,
            events_pruned: report.events_pruned,
        },
        ConsolidationOutcome::Skipped => ConsolidateResponse {
            ok: 1,
            ran: false,
            events_seen: 0,
            events_pruned: 0,
        },
    };
    Ok(Json(response))
}
