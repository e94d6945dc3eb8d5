use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use super::models::Season;
use super::repository::{LeaderboardRepository, SeasonRepository};
use super::types::{LeaderboardFindResponse, LeaderboardListResponse, SeasonsResponse};
use super::ScoringMode;
use crate::shared::AppError;
use crate::user::directory::{UserDirectory, UserModel};

/// The largest standings page a single query may request.
pub const MAX_PAGE_SIZE: usize = 20;

/// Read-side leaderboard queries.
pub struct LeaderboardQueryService {
    entries: Arc<dyn LeaderboardRepository>,
    seasons: Arc<dyn SeasonRepository>,
    users: Arc<dyn UserDirectory>,
}

impl LeaderboardQueryService {
    pub fn new(
        entries: Arc<dyn LeaderboardRepository>,
        seasons: Arc<dyn SeasonRepository>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            entries,
            seasons,
            users,
        }
    }

    fn mode(mode: &str) -> Result<ScoringMode, AppError> {
        ScoringMode::try_from(mode)
            .map_err(|unknown| AppError::InvalidParams(format!("unknown mode {unknown}")))
    }

    /// A rank-ordered page of a season's standings with display info for
    /// the users on it.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        mode: &str,
        season: &str,
        limit: usize,
        offset: usize,
    ) -> Result<LeaderboardListResponse, AppError> {
        let mode = Self::mode(mode)?;
        if limit > MAX_PAGE_SIZE {
            return Err(AppError::InvalidParams(format!(
                "limit must be at most {MAX_PAGE_SIZE}"
            )));
        }

        let count = self.entries.count(mode, season).await?;
        let list = self.entries.page(mode, season, limit, offset).await?;

        let user_ids: Vec<String> = list.iter().map(|entry| entry.user.clone()).collect();
        let users: HashMap<String, UserModel> = self
            .users
            .get_users(&user_ids)
            .await?
            .into_iter()
            .map(|user| (user.id.clone(), user))
            .collect();

        Ok(LeaderboardListResponse {
            ok: 1,
            count,
            list,
            users,
        })
    }

    /// One user's standing: a single season's entry when a season is given,
    /// otherwise every season the user appears in.
    #[instrument(skip(self))]
    pub async fn find(
        &self,
        mode: &str,
        username: &str,
        season: Option<&str>,
    ) -> Result<LeaderboardFindResponse, AppError> {
        let mode = Self::mode(mode)?;
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("unknown user {username}")))?;

        match season {
            Some(season) => {
                let entry = self.entries.find_entry(mode, season, &user.id).await?;
                Ok(LeaderboardFindResponse {
                    ok: 1,
                    entry,
                    list: None,
                })
            }
            None => {
                let list = self.entries.find_user(mode, &user.id).await?;
                Ok(LeaderboardFindResponse {
                    ok: 1,
                    entry: None,
                    list: Some(list),
                })
            }
        }
    }

    /// All known seasons. A lone real season gets a synthetic companion
    /// appended; the season picker cannot render a single entry.
    #[instrument(skip(self))]
    pub async fn seasons(&self) -> Result<SeasonsResponse, AppError> {
        let mut seasons = self.seasons.list_seasons().await?;
        if seasons.len() == 1 {
            seasons.push(Season {
                id: "fake".to_string(),
                name: "Didn't Happen".to_string(),
                date: Utc::now(),
            });
        }
        Ok(SeasonsResponse { ok: 1, seasons })
    }
}
