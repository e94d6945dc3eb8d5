pub mod models;
pub mod repository;

pub use models::{MineralDeposit, RoomController, RoomRecord, RoomSign};
pub use repository::{InMemoryRoomRepository, RoomRepository};
