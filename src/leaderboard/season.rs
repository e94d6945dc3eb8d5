use chrono::{DateTime, Utc};
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{info, instrument};

use super::models::Season;
use super::repository::{LeaderboardRepository, SeasonRepository};
use super::{LeaderboardError, ScoringMode};

/// Owns the active-season pointer and season lifecycle.
pub struct SeasonController {
    seasons: Arc<dyn SeasonRepository>,
    entries: Arc<dyn LeaderboardRepository>,
}

impl SeasonController {
    pub fn new(
        seasons: Arc<dyn SeasonRepository>,
        entries: Arc<dyn LeaderboardRepository>,
    ) -> Self {
        Self { seasons, entries }
    }

    pub async fn active(&self) -> Result<Option<String>, LeaderboardError> {
        self.seasons.get_active().await
    }

    /// Rotates to the season derived from the current calendar time.
    pub async fn rotate(&self) -> Result<Season, LeaderboardError> {
        self.rotate_at(Utc::now()).await
    }

    /// Rotates to the season for `now`: id `YYYY-MM`, display name
    /// "<Month> <Year>". Idempotent: an existing season is only
    /// re-activated, otherwise the row is created and then activated.
    #[instrument(skip(self))]
    pub async fn rotate_at(&self, now: DateTime<Utc>) -> Result<Season, LeaderboardError> {
        let id = now.format("%Y-%m").to_string();

        if let Some(existing) = self.seasons.get_season(&id).await? {
            self.seasons.set_active(&id).await?;
            return Ok(existing);
        }

        let season = Season {
            id: id.clone(),
            name: now.format("%B %Y").to_string(),
            date: now,
        };
        self.seasons.insert_season(season.clone()).await?;
        info!(season_id = %id, "Started new season");
        self.seasons.set_active(&id).await?;
        Ok(season)
    }

    /// Wipes every configured board completely, all seasons included. The
    /// active-season pointer is left as it is.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<(), LeaderboardError> {
        for mode in ScoringMode::iter() {
            self.entries.clear(mode).await?;
        }
        info!("Cleared all leaderboards");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::models::LeaderboardEntry;
    use crate::leaderboard::repository::{
        EntryOp, InMemoryLeaderboardRepository, InMemorySeasonRepository,
    };
    use chrono::TimeZone;

    fn controller() -> (
        SeasonController,
        Arc<InMemorySeasonRepository>,
        Arc<InMemoryLeaderboardRepository>,
    ) {
        let seasons = Arc::new(InMemorySeasonRepository::new());
        let entries = Arc::new(InMemoryLeaderboardRepository::new());
        let controller = SeasonController::new(seasons.clone(), entries.clone());
        (controller, seasons, entries)
    }

    #[tokio::test]
    async fn rotate_derives_id_and_name_from_calendar_time() {
        let (controller, seasons, _) = controller();
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        let season = controller.rotate_at(at).await.unwrap();

        assert_eq!(season.id, "2024-01");
        assert_eq!(season.name, "January 2024");
        assert_eq!(seasons.get_active().await.unwrap(), Some("2024-01".to_string()));
    }

    #[tokio::test]
    async fn rotate_is_idempotent_for_an_existing_season() {
        let (controller, seasons, _) = controller();
        let january = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let first = controller.rotate_at(january).await.unwrap();
        controller
            .rotate_at(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();

        // Rotating back re-activates without creating a second row
        let again = controller
            .rotate_at(Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap())
            .await
            .unwrap();

        assert_eq!(again, first);
        assert_eq!(seasons.list_seasons().await.unwrap().len(), 2);
        assert_eq!(seasons.get_active().await.unwrap(), Some("2024-01".to_string()));
    }

    #[tokio::test]
    async fn reset_wipes_all_boards_but_keeps_the_pointer() {
        let (controller, seasons, entries) = controller();
        controller
            .rotate_at(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();

        for mode in ScoringMode::iter() {
            entries
                .bulk_apply(
                    mode,
                    vec![EntryOp::Insert(LeaderboardEntry {
                        season: "2024-03".to_string(),
                        user: "u1".to_string(),
                        score: 10,
                        rank: 0,
                    })],
                )
                .await
                .unwrap();
        }

        controller.reset().await.unwrap();

        for mode in ScoringMode::iter() {
            assert_eq!(entries.count(mode, "2024-03").await.unwrap(), 0);
        }
        assert_eq!(seasons.get_active().await.unwrap(), Some("2024-03".to_string()));
    }
}
