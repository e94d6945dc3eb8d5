use serde::{Deserialize, Serialize};

/// Directory record for one game-world room, as maintained by the host
/// game server. The stats queries only read these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: String,
    pub status: String,
    /// Game time until which the room belongs to the novice area
    pub novice: Option<i64>,
    /// Game time at which the room opens, for not-yet-open rooms
    pub open_time: Option<i64>,
    pub controller: Option<RoomController>,
    pub mineral: Option<MineralDeposit>,
}

impl RoomRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: "normal".to_string(),
            novice: None,
            open_time: None,
            controller: None,
            mineral: None,
        }
    }
}

/// The room's controller object: ownership, reservation, sign, safe mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomController {
    pub user: Option<String>,
    pub level: u8,
    pub reservation: Option<RoomReservation>,
    pub sign: Option<RoomSign>,
    /// Game time until which safe mode is active
    pub safe_mode_until: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomReservation {
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSign {
    pub user: String,
    pub text: String,
    pub time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineralDeposit {
    pub mineral_type: String,
    pub density: u8,
}
