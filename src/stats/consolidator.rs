use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::interval;
use tracing::{error, info, instrument, warn};

use super::bucketer::Bucketer;
use super::repository::RawEventLog;
use super::{Granularity, StatsError};
use crate::leaderboard::LeaderboardRanker;

/// Configuration for the consolidation task
#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// How often raw stat events are consolidated into buckets and boards
    pub consolidation_interval: Duration,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            consolidation_interval: Duration::from_secs(60),
        }
    }
}

/// What one consolidation pass did.
#[derive(Debug, Clone, Copy)]
pub struct ConsolidationReport {
    pub events_seen: usize,
    pub granularities_merged: usize,
    pub granularities_failed: usize,
    pub ranker_ok: bool,
    pub events_pruned: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum ConsolidationOutcome {
    Completed(ConsolidationReport),
    /// A previous pass was still in flight; this trigger did nothing.
    Skipped,
}

/// Drives consolidation: reads the raw event log, fans out to the bucketer
/// (per granularity) and the leaderboard ranker, then prunes the consumed
/// events.
///
/// Passes are single-flight; an overlapping trigger is skipped rather than
/// queued. Pruning only happens when every unit of the pass succeeded, so a
/// partial failure leaves the batch in place for the next pass. Because
/// merges are additive, that retry double-counts the units that had already
/// succeeded; consolidation favors not losing events over not repeating
/// them.
pub struct Consolidator {
    raw_log: Arc<dyn RawEventLog>,
    bucketer: Arc<Bucketer>,
    ranker: Arc<LeaderboardRanker>,
    in_flight: AsyncMutex<()>,
}

impl Consolidator {
    pub fn new(
        raw_log: Arc<dyn RawEventLog>,
        bucketer: Arc<Bucketer>,
        ranker: Arc<LeaderboardRanker>,
    ) -> Self {
        Self {
            raw_log,
            bucketer,
            ranker,
            in_flight: AsyncMutex::new(()),
        }
    }

    /// Runs one consolidation pass over the full current raw log.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ConsolidationOutcome, StatsError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("Consolidation pass already in flight, skipping trigger");
            return Ok(ConsolidationOutcome::Skipped);
        };

        let query_time = Utc::now();
        let events = self.raw_log.fetch_all().await?;

        let merges = join_all(Granularity::iter().map(|granularity| {
            let events = &events;
            async move {
                (
                    granularity,
                    self.bucketer.merge_batch(granularity, events, query_time).await,
                )
            }
        }));
        let (merge_results, ranker_result) = tokio::join!(merges, self.ranker.apply_batch(&events));

        let mut granularities_merged = 0;
        let mut granularities_failed = 0;
        for (granularity, result) in merge_results {
            match result {
                Ok(_) => granularities_merged += 1,
                Err(e) => {
                    error!(granularity = %granularity, error = %e, "Granularity merge failed");
                    granularities_failed += 1;
                }
            }
        }

        let ranker_ok = match ranker_result {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Leaderboard ranking failed");
                false
            }
        };

        let events_pruned = if granularities_failed == 0 && ranker_ok {
            self.raw_log.prune_through(query_time).await?
        } else {
            warn!(
                granularities_failed = granularities_failed,
                ranker_ok = ranker_ok,
                "Skipping raw log prune after partial failure"
            );
            0
        };

        Ok(ConsolidationOutcome::Completed(ConsolidationReport {
            events_seen: events.len(),
            granularities_merged,
            granularities_failed,
            ranker_ok,
            events_pruned,
        }))
    }
}

/// Starts the background task that periodically consolidates the raw event
/// log into buckets, records, and leaderboards.
#[instrument(skip(consolidator))]
pub async fn start_consolidation_task(consolidator: Arc<Consolidator>, config: ConsolidationConfig) {
    info!(
        consolidation_interval_secs = config.consolidation_interval.as_secs(),
        "Starting consolidation background task"
    );

    let mut consolidation_interval = interval(config.consolidation_interval);

    loop {
        consolidation_interval.tick().await;

        match consolidator.run_once().await {
            Ok(ConsolidationOutcome::Completed(report)) => {
                info!(
                    events_seen = report.events_seen,
                    events_pruned = report.events_pruned,
                    granularities_failed = report.granularities_failed,
                    "Consolidation pass completed"
                );
            }
            Ok(ConsolidationOutcome::Skipped) => {}
            Err(e) => {
                error!(error = %e, "Consolidation pass failed");
            }
        }
    }
}
