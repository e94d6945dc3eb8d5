use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::models::{LeaderboardEntry, Season};
use super::{LeaderboardError, ScoringMode};

/// One element of a ranking pass's differential bulk write.
#[derive(Debug, Clone)]
pub enum EntryOp {
    /// User's first contribution this season.
    Insert(LeaderboardEntry),
    /// Existing row whose score or rank moved.
    Update {
        season: String,
        user: String,
        score: i64,
        rank: u32,
    },
}

/// Per-mode leaderboard standings, keyed (season, user).
#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    /// All entries for a season, ordered by rank ascending.
    async fn find_by_season(
        &self,
        mode: ScoringMode,
        season: &str,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError>;

    /// A rank-ordered page of a season's standings.
    async fn page(
        &self,
        mode: ScoringMode,
        season: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError>;

    async fn count(&self, mode: ScoringMode, season: &str) -> Result<usize, LeaderboardError>;

    async fn find_entry(
        &self,
        mode: ScoringMode,
        season: &str,
        user: &str,
    ) -> Result<Option<LeaderboardEntry>, LeaderboardError>;

    /// A user's entries across all seasons.
    async fn find_user(
        &self,
        mode: ScoringMode,
        user: &str,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError>;

    /// Applies a ranking pass's insert/update set. Rows are never deleted
    /// by a ranking pass.
    async fn bulk_apply(
        &self,
        mode: ScoringMode,
        ops: Vec<EntryOp>,
    ) -> Result<(), LeaderboardError>;

    /// Removes every entry on this board, all seasons included.
    async fn clear(&self, mode: ScoringMode) -> Result<(), LeaderboardError>;
}

/// Season rows plus the active-season pointer.
#[async_trait]
pub trait SeasonRepository: Send + Sync {
    async fn insert_season(&self, season: Season) -> Result<(), LeaderboardError>;
    async fn get_season(&self, id: &str) -> Result<Option<Season>, LeaderboardError>;
    async fn list_seasons(&self) -> Result<Vec<Season>, LeaderboardError>;
    async fn set_active(&self, id: &str) -> Result<(), LeaderboardError>;
    async fn get_active(&self) -> Result<Option<String>, LeaderboardError>;
}

type EntryKey = (String, String);

/// In-memory implementation of the leaderboard store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryLeaderboardRepository {
    boards: RwLock<HashMap<ScoringMode, HashMap<EntryKey, LeaderboardEntry>>>,
}

impl InMemoryLeaderboardRepository {
    pub fn new() -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LeaderboardRepository for InMemoryLeaderboardRepository {
    async fn find_by_season(
        &self,
        mode: ScoringMode,
        season: &str,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let boards = self.boards.read().await;
        let mut entries: Vec<LeaderboardEntry> = boards
            .get(&mode)
            .map(|board| {
                board
                    .values()
                    .filter(|e| e.season == season)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by_key(|e| e.rank);
        Ok(entries)
    }

    async fn page(
        &self,
        mode: ScoringMode,
        season: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let entries = self.find_by_season(mode, season).await?;
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, mode: ScoringMode, season: &str) -> Result<usize, LeaderboardError> {
        let boards = self.boards.read().await;
        Ok(boards
            .get(&mode)
            .map(|board| board.values().filter(|e| e.season == season).count())
            .unwrap_or(0))
    }

    async fn find_entry(
        &self,
        mode: ScoringMode,
        season: &str,
        user: &str,
    ) -> Result<Option<LeaderboardEntry>, LeaderboardError> {
        let boards = self.boards.read().await;
        Ok(boards
            .get(&mode)
            .and_then(|board| board.get(&(season.to_string(), user.to_string())))
            .cloned())
    }

    async fn find_user(
        &self,
        mode: ScoringMode,
        user: &str,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let boards = self.boards.read().await;
        let mut entries: Vec<LeaderboardEntry> = boards
            .get(&mode)
            .map(|board| {
                board
                    .values()
                    .filter(|e| e.user == user)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.season.cmp(&b.season));
        Ok(entries)
    }

    #[instrument(skip(self, ops))]
    async fn bulk_apply(
        &self,
        mode: ScoringMode,
        ops: Vec<EntryOp>,
    ) -> Result<(), LeaderboardError> {
        debug!(mode = %mode, op_count = ops.len(), "Applying leaderboard bulk write");

        let mut boards = self.boards.write().await;
        let board = boards.entry(mode).or_default();
        for op in ops {
            match op {
                EntryOp::Insert(entry) => {
                    board.insert((entry.season.clone(), entry.user.clone()), entry);
                }
                EntryOp::Update {
                    season,
                    user,
                    score,
                    rank,
                } => match board.get_mut(&(season.clone(), user.clone())) {
                    Some(entry) => {
                        entry.score = score;
                        entry.rank = rank;
                    }
                    None => {
                        return Err(LeaderboardError::Storage(format!(
                            "no entry to update for {season}/{user}"
                        )))
                    }
                },
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self, mode: ScoringMode) -> Result<(), LeaderboardError> {
        let mut boards = self.boards.write().await;
        boards.remove(&mode);
        Ok(())
    }
}

/// In-memory implementation of the season store for development and testing
#[derive(Debug, Default)]
pub struct InMemorySeasonRepository {
    seasons: RwLock<Vec<Season>>,
    active: RwLock<Option<String>>,
}

impl InMemorySeasonRepository {
    pub fn new() -> Self {
        Self {
            seasons: RwLock::new(Vec::new()),
            active: RwLock::new(None),
        }
    }
}

#[async_trait]
impl SeasonRepository for InMemorySeasonRepository {
    #[instrument(skip(self, season))]
    async fn insert_season(&self, season: Season) -> Result<(), LeaderboardError> {
        let mut seasons = self.seasons.write().await;
        if seasons.iter().any(|s| s.id == season.id) {
            return Err(LeaderboardError::Storage(format!(
                "season {} already exists",
                season.id
            )));
        }
        debug!(season_id = %season.id, "Inserting season");
        seasons.push(season);
        Ok(())
    }

    async fn get_season(&self, id: &str) -> Result<Option<Season>, LeaderboardError> {
        let seasons = self.seasons.read().await;
        Ok(seasons.iter().find(|s| s.id == id).cloned())
    }

    async fn list_seasons(&self) -> Result<Vec<Season>, LeaderboardError> {
        let mut seasons = self.seasons.read().await.clone();
        seasons.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(seasons)
    }

    async fn set_active(&self, id: &str) -> Result<(), LeaderboardError> {
        *self.active.write().await = Some(id.to_string());
        Ok(())
    }

    async fn get_active(&self) -> Result<Option<String>, LeaderboardError> {
        Ok(self.active.read().await.clone())
    }
}

/// PostgreSQL implementation of the leaderboard store
pub struct PostgresLeaderboardRepository {
    pool: PgPool,
}

impl PostgresLeaderboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> LeaderboardEntry {
        LeaderboardEntry {
            season: row.get("season"),
            user: row.get("user_id"),
            score: row.get("score"),
            rank: row.get::<i64, _>("rank") as u32,
        }
    }
}

#[async_trait]
impl LeaderboardRepository for PostgresLeaderboardRepository {
    #[instrument(skip(self))]
    async fn find_by_season(
        &self,
        mode: ScoringMode,
        season: &str,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let rows = sqlx::query(
            "SELECT season, user_id, score, rank FROM leaderboard_entries WHERE mode = $1 AND season = $2 ORDER BY rank ASC"
        )
        .bind(mode.to_string())
        .bind(season)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, mode = %mode, "Failed to fetch season standings");
            LeaderboardError::Storage(e.to_string())
        })?;

        Ok(rows.iter().map(Self::row_to_entry).collect())
    }

    #[instrument(skip(self))]
    async fn page(
        &self,
        mode: ScoringMode,
        season: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let rows = sqlx::query(
            "SELECT season, user_id, score, rank FROM leaderboard_entries WHERE mode = $1 AND season = $2 ORDER BY rank ASC LIMIT $3 OFFSET $4"
        )
        .bind(mode.to_string())
        .bind(season)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, mode = %mode, "Failed to fetch standings page");
            LeaderboardError::Storage(e.to_string())
        })?;

        Ok(rows.iter().map(Self::row_to_entry).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self, mode: ScoringMode, season: &str) -> Result<usize, LeaderboardError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS entry_count FROM leaderboard_entries WHERE mode = $1 AND season = $2"
        )
        .bind(mode.to_string())
        .bind(season)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, mode = %mode, "Failed to count season standings");
            LeaderboardError::Storage(e.to_string())
        })?;

        Ok(row.get::<i64, _>("entry_count") as usize)
    }

    #[instrument(skip(self))]
    async fn find_entry(
        &self,
        mode: ScoringMode,
        season: &str,
        user: &str,
    ) -> Result<Option<LeaderboardEntry>, LeaderboardError> {
        let row = sqlx::query(
            "SELECT season, user_id, score, rank FROM leaderboard_entries WHERE mode = $1 AND season = $2 AND user_id = $3"
        )
        .bind(mode.to_string())
        .bind(season)
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, mode = %mode, user = %user, "Failed to fetch leaderboard entry");
            LeaderboardError::Storage(e.to_string())
        })?;

        Ok(row.as_ref().map(Self::row_to_entry))
    }

    #[instrument(skip(self))]
    async fn find_user(
        &self,
        mode: ScoringMode,
        user: &str,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let rows = sqlx::query(
            "SELECT season, user_id, score, rank FROM leaderboard_entries WHERE mode = $1 AND user_id = $2 ORDER BY season ASC"
        )
        .bind(mode.to_string())
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, mode = %mode, user = %user, "Failed to fetch user entries");
            LeaderboardError::Storage(e.to_string())
        })?;

        Ok(rows.iter().map(Self::row_to_entry).collect())
    }

    #[instrument(skip(self, ops))]
    async fn bulk_apply(
        &self,
        mode: ScoringMode,
        ops: Vec<EntryOp>,
    ) -> Result<(), LeaderboardError> {
        debug!(mode = %mode, op_count = ops.len(), "Applying leaderboard bulk write to database");

        for op in ops {
            match op {
                EntryOp::Insert(entry) => {
                    sqlx::query(
                        "INSERT INTO leaderboard_entries (mode, season, user_id, score, rank) VALUES ($1, $2, $3, $4, $5)"
                    )
                    .bind(mode.to_string())
                    .bind(&entry.season)
                    .bind(&entry.user)
                    .bind(entry.score)
                    .bind(entry.rank as i64)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, user = %entry.user, "Failed to insert leaderboard entry");
                        LeaderboardError::Storage(e.to_string())
                    })?;
                }
                EntryOp::Update {
                    season,
                    user,
                    score,
                    rank,
                } => {
                    let result = sqlx::query(
                        "UPDATE leaderboard_entries SET score = $4, rank = $5 WHERE mode = $1 AND season = $2 AND user_id = $3"
                    )
                    .bind(mode.to_string())
                    .bind(&season)
                    .bind(&user)
                    .bind(score)
                    .bind(rank as i64)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, user = %user, "Failed to update leaderboard entry");
                        LeaderboardError::Storage(e.to_string())
                    })?;

                    if result.rows_affected() == 0 {
                        warn!(season = %season, user = %user, "Leaderboard entry missing for update");
                        return Err(LeaderboardError::Storage(format!(
                            "no entry to update for {season}/{user}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self, mode: ScoringMode) -> Result<(), LeaderboardError> {
        sqlx::query("DELETE FROM leaderboard_entries WHERE mode = $1")
            .bind(mode.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, mode = %mode, "Failed to clear leaderboard");
                LeaderboardError::Storage(e.to_string())
            })?;
        Ok(())
    }
}
