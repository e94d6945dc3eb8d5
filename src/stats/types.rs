use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::StatName;
use crate::room::models::{MineralDeposit, RoomSign};
use crate::user::directory::UserModel;

/// Query parameters for the user stats endpoint
#[derive(Debug, Deserialize)]
pub struct UserStatsQuery {
    pub interval: u32,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserStatsResponse {
    pub ok: u8,
    pub stats: HashMap<StatName, i64>,
}

/// Query parameters for the room overview endpoint
#[derive(Debug, Deserialize)]
pub struct RoomOverviewQuery {
    pub room: String,
    pub interval: Option<u32>,
}

/// One slot of a room's per-metric time series, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatPoint {
    #[serde(rename = "endTime")]
    pub end_time: i64,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomOwner {
    pub username: String,
    pub badge: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomOverviewResponse {
    pub ok: u8,
    pub owner: Option<RoomOwner>,
    pub stats: HashMap<StatName, Vec<StatPoint>>,
    /// Window maxima keyed `<stat><intervalMinutes>`, across every
    /// configured granularity
    #[serde(rename = "statsMax")]
    pub stats_max: HashMap<String, i64>,
    pub totals: HashMap<StatName, i64>,
}

/// Request payload for the map overlay endpoint
#[derive(Debug, Deserialize)]
pub struct MapStatsRequest {
    pub rooms: Vec<String>,
    #[serde(rename = "statName")]
    pub stat_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapRoomOwn {
    pub user: String,
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMetricValue {
    pub user: String,
    pub value: i64,
}

/// One room's slice of the map overlay snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapRoomStats {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub novice: Option<i64>,
    #[serde(rename = "openTime", skip_serializing_if = "Option::is_none")]
    pub open_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own: Option<MapRoomOwn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign: Option<RoomSign>,
    #[serde(rename = "safeMode", skip_serializing_if = "Option::is_none")]
    pub safe_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minerals: Option<MineralDeposit>,
    /// Per-user sums of the requested metric over the current window
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub values: Vec<UserMetricValue>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MapStatsResponse {
    pub ok: u8,
    #[serde(rename = "gameTime")]
    pub game_time: i64,
    #[serde(rename = "statName")]
    pub stat_name: String,
    pub stats: HashMap<String, MapRoomStats>,
    /// Summed window maximum for the requested metric, when one was
    /// requested
    #[serde(rename = "statsMax", skip_serializing_if = "Option::is_none")]
    pub stats_max: Option<i64>,
    pub users: HashMap<String, UserModel>,
}
