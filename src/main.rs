use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomstats::stats::accumulator::{start_flush_task, FlushConfig};
use roomstats::stats::consolidator::{start_consolidation_task, ConsolidationConfig};
use roomstats::{api_router, AppState};

fn duration_from_env(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomstats=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting room stats server");

    // Fully in-memory wiring by default.
    let state = AppState::in_memory();

    // For production with PostgreSQL-backed leaderboards:
    // let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    // let pool = sqlx::PgPool::connect(&database_url).await.expect("Failed to connect to database");
    // let leaderboard_repository = Arc::new(PostgresLeaderboardRepository::new(pool));

    let flush_config = FlushConfig {
        flush_interval: duration_from_env("FLUSH_INTERVAL_SECS", Duration::from_secs(10)),
    };
    tokio::spawn(start_flush_task(
        state.accumulator.clone(),
        state.raw_event_log.clone(),
        flush_config,
    ));

    let consolidation_config = ConsolidationConfig {
        consolidation_interval: duration_from_env(
            "CONSOLIDATION_INTERVAL_SECS",
            Duration::from_secs(60),
        ),
    };
    tokio::spawn(start_consolidation_task(
        state.consolidator.clone(),
        consolidation_config,
    ));

    let app = api_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    info!("Server running on http://localhost:3000");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for shutdown signal");
        })
        .await
        .unwrap();

    // Drain whatever accumulated since the last flush cycle.
    match state.accumulator.flush(state.raw_event_log.as_ref()).await {
        Ok(count) => info!(event_count = count, "Drained accumulator on shutdown"),
        Err(e) => tracing::error!(error = %e, "Failed to drain accumulator on shutdown"),
    }
}
