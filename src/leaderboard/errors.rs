use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Ranking failed for {failed} of {attempted} modes")]
    PartialFailure { failed: usize, attempted: usize },
}
