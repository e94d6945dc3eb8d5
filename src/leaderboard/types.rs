use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::models::{LeaderboardEntry, Season};
use crate::user::directory::UserModel;

/// Query parameters for the standings list endpoint
#[derive(Debug, Deserialize)]
pub struct LeaderboardListQuery {
    pub mode: String,
    pub season: String,
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardListResponse {
    pub ok: u8,
    /// Total entries in the season, not just this page
    pub count: usize,
    pub list: Vec<LeaderboardEntry>,
    /// Display info for every user on the page
    pub users: HashMap<String, UserModel>,
}

/// Query parameters for the single-entry lookup endpoint
#[derive(Debug, Deserialize)]
pub struct LeaderboardFindQuery {
    pub mode: String,
    pub username: String,
    pub season: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardFindResponse {
    pub ok: u8,
    /// The season's entry, when a season was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<LeaderboardEntry>,
    /// All of the user's entries, when no season was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<LeaderboardEntry>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeasonsResponse {
    pub ok: u8,
    pub seasons: Vec<Season>,
}
