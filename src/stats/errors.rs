use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),
}
