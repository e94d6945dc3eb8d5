use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use strum::IntoEnumIterator;

use super::models::LeaderboardEntry;
use super::repository::{EntryOp, LeaderboardRepository, SeasonRepository};
use super::{LeaderboardError, ScoringMode};
use crate::stats::RawStatEvent;

struct Standing {
    user: String,
    score: i64,
    prior: Option<(i64, u32)>,
}

/// Recomputes full leaderboard standings from raw stat batches.
///
/// Each pass folds the batch's per-user deltas of every mode's source
/// metric into cumulative season scores, re-sorts the whole board, and
/// persists only the rows that moved.
pub struct LeaderboardRanker {
    seasons: Arc<dyn SeasonRepository>,
    entries: Arc<dyn LeaderboardRepository>,
}

impl LeaderboardRanker {
    pub fn new(
        seasons: Arc<dyn SeasonRepository>,
        entries: Arc<dyn LeaderboardRepository>,
    ) -> Self {
        Self { seasons, entries }
    }

    /// Runs one ranking pass over a raw stat batch.
    ///
    /// No active season means no leaderboard updates at all, silently. A
    /// failing mode does not stop the remaining modes; the pass reports
    /// failure if any mode's writes failed.
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    pub async fn apply_batch(&self, events: &[RawStatEvent]) -> Result<(), LeaderboardError> {
        let Some(season) = self.seasons.get_active().await? else {
            debug!("No active season, skipping leaderboard update");
            return Ok(());
        };

        let mut attempted = 0;
        let mut failed = 0;
        for mode in ScoringMode::iter() {
            let deltas = Self::fold_deltas(mode, events);
            if deltas.is_empty() {
                continue;
            }

            attempted += 1;
            if let Err(e) = self.rank_mode(mode, &season, &deltas).await {
                error!(mode = %mode, error = %e, "Ranking failed for mode");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(LeaderboardError::PartialFailure { failed, attempted });
        }
        Ok(())
    }

    /// Sums the batch's per-user deltas of the mode's source metric,
    /// preserving each user's first appearance in the batch. That order is
    /// the tie-break for users entering the board in the same pass.
    fn fold_deltas(mode: ScoringMode, events: &[RawStatEvent]) -> Vec<(String, i64)> {
        let mut order: Vec<String> = Vec::new();
        let mut totals: HashMap<String, i64> = HashMap::new();

        for event in events {
            let Some(delta) = event.metrics.get(&mode.source_stat()) else {
                continue;
            };
            if *delta == 0 {
                continue;
            }
            if !totals.contains_key(&event.user) {
                order.push(event.user.clone());
            }
            let total = totals.entry(event.user.clone()).or_insert(0);
            *total = total.saturating_add(*delta);
        }

        order
            .into_iter()
            .map(|user| {
                let total = totals[&user];
                (user, total)
            })
            .collect()
    }

    /// Full re-rank of one board: merge deltas into the season's standings,
    /// stable-sort descending by score (equal scores keep prior rank order,
    /// new users follow in first-appearance order), assign dense ranks, and
    /// write back only what changed.
    async fn rank_mode(
        &self,
        mode: ScoringMode,
        season: &str,
        deltas: &[(String, i64)],
    ) -> Result<(), LeaderboardError> {
        let existing = self.entries.find_by_season(mode, season).await?;

        let mut standings: Vec<Standing> = existing
            .into_iter()
            .map(|entry| Standing {
                user: entry.user,
                score: entry.score,
                prior: Some((entry.score, entry.rank)),
            })
            .collect();
        let mut positions: HashMap<String, usize> = standings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.user.clone(), i))
            .collect();

        for (user, delta) in deltas {
            match positions.get(user) {
                Some(i) => {
                    let standing = &mut standings[*i];
                    standing.score = standing.score.saturating_add(*delta);
                }
                None => {
                    positions.insert(user.clone(), standings.len());
                    standings.push(Standing {
                        user: user.clone(),
                        score: *delta,
                        prior: None,
                    });
                }
            }
        }

        // Vec::sort_by_key is stable, so the assembly order above is the
        // tie-break.
        standings.sort_by_key(|s| std::cmp::Reverse(s.score));

        let mut ops = Vec::new();
        for (position, standing) in standings.iter().enumerate() {
            let rank = position as u32;
            match standing.prior {
                Some((prior_score, prior_rank))
                    if prior_score == standing.score && prior_rank == rank => {}
                Some(_) => ops.push(EntryOp::Update {
                    season: season.to_string(),
                    user: standing.user.clone(),
                    score: standing.score,
                    rank,
                }),
                None => ops.push(EntryOp::Insert(LeaderboardEntry {
                    season: season.to_string(),
                    user: standing.user.clone(),
                    score: standing.score,
                    rank,
                })),
            }
        }

        debug!(
            mode = %mode,
            season = %season,
            standings = standings.len(),
            writes = ops.len(),
            "Ranked leaderboard"
        );

        if !ops.is_empty() {
            self.entries.bulk_apply(mode, ops).await?;
        }
        Ok(())
    }
}
