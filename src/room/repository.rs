use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::models::RoomRecord;
use crate::shared::AppError;

/// Read access to the game world's room directory plus the game-time
/// counter. The host game server owns the writes; the stats queries only
/// read.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, AppError>;
    async fn get_rooms(&self, room_ids: &[String]) -> Result<Vec<RoomRecord>, AppError>;
    async fn upsert_room(&self, room: RoomRecord) -> Result<(), AppError>;
    async fn game_time(&self) -> Result<i64, AppError>;
    async fn set_game_time(&self, time: i64) -> Result<(), AppError>;
}

/// In-memory implementation of the room directory for development and testing
#[derive(Debug, Default)]
pub struct InMemoryRoomRepository {
    rooms: RwLock<HashMap<String, RoomRecord>>,
    game_time: AtomicI64,
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            game_time: AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, AppError> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(room_id).cloned())
    }

    async fn get_rooms(&self, room_ids: &[String]) -> Result<Vec<RoomRecord>, AppError> {
        let rooms = self.rooms.read().await;
        Ok(room_ids
            .iter()
            .filter_map(|id| rooms.get(id).cloned())
            .collect())
    }

    #[instrument(skip(self, room))]
    async fn upsert_room(&self, room: RoomRecord) -> Result<(), AppError> {
        debug!(room_id = %room.id, "Upserting room record");
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.id.clone(), room);
        Ok(())
    }

    async fn game_time(&self) -> Result<i64, AppError> {
        Ok(self.game_time.load(Ordering::Relaxed))
    }

    async fn set_game_time(&self, time: i64) -> Result<(), AppError> {
        self.game_time.store(time, Ordering::Relaxed);
        Ok(())
    }
}
