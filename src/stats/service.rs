use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, instrument};

use super::repository::{BucketRepository, MaxRecordRepository};
use super::types::{
    MapRoomOwn, MapRoomStats, MapStatsResponse, RoomOverviewResponse, RoomOwner, StatPoint,
    UserMetricValue,
};
use super::{Granularity, StatName};
use crate::room::repository::RoomRepository;
use crate::shared::AppError;
use crate::user::directory::{UserDirectory, UserModel};

/// What a map overlay request asks for beyond room ownership.
enum RequestedOverlay {
    /// `none`/`owner`, or a metric this deployment does not track
    Nothing,
    Minerals,
    Metric(StatName, Granularity),
}

/// Read-side queries over consolidated stats. Never mutates anything; may
/// observe a half-applied consolidation pass.
pub struct StatsQueryService {
    buckets: Arc<dyn BucketRepository>,
    max_records: Arc<dyn MaxRecordRepository>,
    rooms: Arc<dyn RoomRepository>,
    users: Arc<dyn UserDirectory>,
}

impl StatsQueryService {
    pub fn new(
        buckets: Arc<dyn BucketRepository>,
        max_records: Arc<dyn MaxRecordRepository>,
        rooms: Arc<dyn RoomRepository>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            buckets,
            max_records,
            rooms,
            users,
        }
    }

    fn granularity(interval: u32) -> Result<Granularity, AppError> {
        Granularity::from_minutes(interval)
            .ok_or_else(|| AppError::InvalidParams(format!("unknown interval {interval}")))
    }

    /// A user's metrics summed over the granularity's trailing window.
    #[instrument(skip(self))]
    pub async fn user_stats(
        &self,
        user_id: &str,
        interval: u32,
    ) -> Result<HashMap<StatName, i64>, AppError> {
        let granularity = Self::granularity(interval)?;
        let from_index = granularity.window_start(Utc::now());

        let rows = self
            .buckets
            .find_user_since(granularity, user_id, from_index)
            .await?;

        let mut totals: HashMap<StatName, i64> =
            StatName::iter().map(|stat| (stat, 0)).collect();
        for row in rows {
            for (stat, value) in row.metrics {
                let total = totals.entry(stat).or_insert(0);
                *total = total.saturating_add(value);
            }
        }
        Ok(totals)
    }

    /// Time series and totals for the room's current controlling user, plus
    /// the window maxima of every granularity.
    #[instrument(skip(self))]
    pub async fn room_overview(
        &self,
        room_id: &str,
        interval: u32,
    ) -> Result<RoomOverviewResponse, AppError> {
        let granularity = Self::granularity(interval)?;
        let now = Utc::now();
        let block_start = granularity.window_start(now);
        let blocks = granularity.retained_buckets();

        let mut owner = None;
        let mut stats: HashMap<StatName, Vec<StatPoint>> = HashMap::new();
        let mut totals: HashMap<StatName, i64> = HashMap::new();

        let controlling_user = self
            .rooms
            .get_room(room_id)
            .await?
            .and_then(|room| room.controller)
            .and_then(|controller| controller.user);

        if let Some(user_id) = controlling_user {
            owner = self.users.get_user(&user_id).await?.map(|user| RoomOwner {
                username: user.username,
                badge: user.badge,
            });

            for stat in StatName::iter() {
                let series = (0..blocks)
                    .map(|i| StatPoint {
                        end_time: block_start + i,
                        value: 0,
                    })
                    .collect();
                stats.insert(stat, series);
                totals.insert(stat, 0);
            }

            let rows = self
                .buckets
                .find_room_user_since(granularity, room_id, &user_id, block_start)
                .await?;
            for row in rows {
                let offset = (row.bucket_index - block_start) as usize;
                for (stat, value) in row.metrics {
                    if let Some(point) = stats.get_mut(&stat).and_then(|s| s.get_mut(offset)) {
                        point.value = point.value.saturating_add(value);
                    }
                    let total = totals.entry(stat).or_insert(0);
                    *total = total.saturating_add(value);
                }
            }
        } else {
            debug!(room_id = %room_id, "Room has no controlling user");
        }

        let stats_max = self.window_maxima(now).await?;

        Ok(RoomOverviewResponse {
            ok: 1,
            owner,
            stats,
            stats_max,
            totals,
        })
    }

    /// Highest still-open bucket record per stat and granularity, keyed
    /// `<stat><intervalMinutes>`.
    async fn window_maxima(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> Result<HashMap<String, i64>, AppError> {
        let mut maxima: HashMap<String, i64> = HashMap::new();
        for stat in StatName::iter() {
            for granularity in Granularity::iter() {
                maxima.insert(format!("{stat}{granularity}"), 0);
            }
        }

        for record in self.max_records.find_all().await? {
            if record.bucket_index < record.granularity.window_start(now) {
                continue;
            }
            for (stat, value) in record.metrics {
                let key = format!("{stat}{}", record.granularity);
                let entry = maxima.entry(key).or_insert(0);
                if value > *entry {
                    *entry = value;
                }
            }
        }

        Ok(maxima)
    }

    /// Map overlay snapshot for a batch of rooms: ownership, reservation,
    /// sign, safe mode, and the requested metric's per-user breakdown over
    /// its granularity's current window.
    #[instrument(skip(self, room_ids), fields(room_count = room_ids.len()))]
    pub async fn map_stats(
        &self,
        room_ids: &[String],
        stat_name: &str,
    ) -> Result<MapStatsResponse, AppError> {
        let overlay = Self::parse_overlay(stat_name)?;
        let now = Utc::now();
        let game_time = self.rooms.game_time().await?;

        let mut stats: HashMap<String, MapRoomStats> = HashMap::new();
        let mut user_ids: Vec<String> = Vec::new();

        for room in self.rooms.get_rooms(room_ids).await? {
            let mut room_stats = MapRoomStats {
                status: room.status.clone(),
                novice: room.novice,
                open_time: room.open_time,
                ..MapRoomStats::default()
            };

            if let Some(controller) = &room.controller {
                if let Some(user) = &controller.user {
                    room_stats.own = Some(MapRoomOwn {
                        user: user.clone(),
                        level: controller.level,
                    });
                    user_ids.push(user.clone());
                }
                if let Some(reservation) = &controller.reservation {
                    room_stats.own = Some(MapRoomOwn {
                        user: reservation.user.clone(),
                        level: 0,
                    });
                    user_ids.push(reservation.user.clone());
                }
                if let Some(sign) = &controller.sign {
                    room_stats.sign = Some(sign.clone());
                    user_ids.push(sign.user.clone());
                }
                if controller.safe_mode_until.is_some_and(|until| until > game_time) {
                    room_stats.safe_mode = Some(true);
                }
            }

            if matches!(overlay, RequestedOverlay::Minerals) {
                room_stats.minerals = room.mineral.clone();
            }

            stats.insert(room.id, room_stats);
        }

        let mut stats_max = None;
        if let RequestedOverlay::Metric(stat, granularity) = overlay {
            let block_start = granularity.window_start(now);

            let records = self.max_records.find_since(granularity, block_start).await?;
            stats_max = Some(
                records
                    .iter()
                    .filter_map(|r| r.metrics.get(&stat))
                    .sum::<i64>(),
            );

            let rows = self
                .buckets
                .find_rooms_since(granularity, room_ids, block_start)
                .await?;
            let mut sums: HashMap<(String, String), i64> = HashMap::new();
            for row in rows {
                if let Some(value) = row.metrics.get(&stat) {
                    let sum = sums.entry((row.room, row.user)).or_insert(0);
                    *sum = sum.saturating_add(*value);
                }
            }
            for ((room, user), value) in sums {
                if let Some(room_stats) = stats.get_mut(&room) {
                    room_stats.values.push(UserMetricValue { user, value });
                }
            }
            for room_stats in stats.values_mut() {
                room_stats.values.sort_by(|a, b| a.user.cmp(&b.user));
            }
        }

        user_ids.sort();
        user_ids.dedup();
        let users: HashMap<String, UserModel> = self
            .users
            .get_users(&user_ids)
            .await?
            .into_iter()
            .map(|user| (user.id.clone(), user))
            .collect();

        Ok(MapStatsResponse {
            ok: 1,
            game_time,
            stat_name: stat_name.to_string(),
            stats,
            stats_max,
            users,
        })
    }

    /// Overlay keys look like `energyHarvested8`: a name plus the interval
    /// minutes. `none`/`owner`/`minerals` carry a placeholder digit suffix.
    fn parse_overlay(stat_name: &str) -> Result<RequestedOverlay, AppError> {
        let digits = stat_name
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits == 0 {
            return Err(AppError::InvalidParams(format!(
                "malformed stat name {stat_name}"
            )));
        }

        let (name, suffix) = stat_name.split_at(stat_name.len() - digits);
        match name {
            "none" | "owner" => Ok(RequestedOverlay::Nothing),
            "minerals" => Ok(RequestedOverlay::Minerals),
            _ => {
                let Ok(stat) = StatName::try_from(name) else {
                    return Ok(RequestedOverlay::Nothing);
                };
                let interval: u32 = suffix
                    .parse()
                    .map_err(|_| AppError::InvalidParams(format!("bad interval {suffix}")))?;
                let granularity = Self::granularity(interval)?;
                Ok(RequestedOverlay::Metric(stat, granularity))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::models::{RoomController, RoomRecord, RoomReservation, RoomSign};
    use crate::room::repository::InMemoryRoomRepository;
    use crate::stats::models::{MaxRecord, StatBucket};
    use crate::stats::repository::{
        BucketOp, InMemoryBucketRepository, InMemoryMaxRecordRepository,
    };
    use crate::user::directory::InMemoryUserDirectory;

    struct Fixture {
        service: StatsQueryService,
        buckets: Arc<InMemoryBucketRepository>,
        max_records: Arc<InMemoryMaxRecordRepository>,
        rooms: Arc<InMemoryRoomRepository>,
        users: Arc<InMemoryUserDirectory>,
    }

    fn fixture() -> Fixture {
        let buckets = Arc::new(InMemoryBucketRepository::new());
        let max_records = Arc::new(InMemoryMaxRecordRepository::new());
        let rooms = Arc::new(InMemoryRoomRepository::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        let service = StatsQueryService::new(
            buckets.clone(),
            max_records.clone(),
            rooms.clone(),
            users.clone(),
        );
        Fixture {
            service,
            buckets,
            max_records,
            rooms,
            users,
        }
    }

    async fn seed_bucket(
        buckets: &InMemoryBucketRepository,
        granularity: Granularity,
        index_offset: i64,
        user: &str,
        room: &str,
        stat: StatName,
        value: i64,
    ) {
        let index = granularity.bucket_index(Utc::now()) + index_offset;
        buckets
            .bulk_apply(
                granularity,
                vec![BucketOp::Insert(StatBucket {
                    granularity,
                    bucket_index: index,
                    user: user.to_string(),
                    room: room.to_string(),
                    metrics: HashMap::from([(stat, value)]),
                })],
            )
            .await
            .unwrap();
    }

    fn owned_room(id: &str, user: &str) -> RoomRecord {
        let mut room = RoomRecord::new(id);
        room.controller = Some(RoomController {
            user: Some(user.to_string()),
            level: 5,
            ..RoomController::default()
        });
        room
    }

    fn user_model(id: &str, username: &str) -> UserModel {
        UserModel {
            id: id.to_string(),
            username: username.to_string(),
            badge: None,
            gcl: 3,
        }
    }

    #[tokio::test]
    async fn user_stats_sums_the_trailing_window() {
        let f = fixture();
        seed_bucket(&f.buckets, Granularity::Minutes8, 0, "u1", "W1N1", StatName::EnergyHarvested, 30).await;
        seed_bucket(&f.buckets, Granularity::Minutes8, -1, "u1", "W2N2", StatName::EnergyHarvested, 12).await;
        // outside the 8-bucket window
        seed_bucket(&f.buckets, Granularity::Minutes8, -20, "u1", "W1N1", StatName::EnergyHarvested, 999).await;
        // someone else
        seed_bucket(&f.buckets, Granularity::Minutes8, 0, "u2", "W1N1", StatName::EnergyHarvested, 5).await;

        let stats = f.service.user_stats("u1", 8).await.unwrap();

        assert_eq!(stats[&StatName::EnergyHarvested], 42);
        assert_eq!(stats[&StatName::PowerProcessed], 0);
    }

    #[tokio::test]
    async fn user_stats_rejects_unknown_intervals() {
        let f = fixture();
        let result = f.service.user_stats("u1", 9).await;
        assert!(matches!(result, Err(AppError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn room_overview_builds_series_for_the_controlling_user() {
        let f = fixture();
        f.rooms.upsert_room(owned_room("W1N1", "u1")).await.unwrap();
        f.users.register_user(user_model("u1", "alice")).await.unwrap();
        seed_bucket(&f.buckets, Granularity::Minutes8, 0, "u1", "W1N1", StatName::EnergyControl, 50).await;
        seed_bucket(&f.buckets, Granularity::Minutes8, -2, "u1", "W1N1", StatName::EnergyControl, 7).await;
        // other rooms don't contribute to this room's series
        seed_bucket(&f.buckets, Granularity::Minutes8, 0, "u1", "W9N9", StatName::EnergyControl, 100).await;

        let overview = f.service.room_overview("W1N1", 8).await.unwrap();

        assert_eq!(overview.owner.unwrap().username, "alice");
        let series = &overview.stats[&StatName::EnergyControl];
        assert_eq!(series.len(), 8);
        assert_eq!(series[7].value, 50);
        assert_eq!(series[5].value, 7);
        assert_eq!(overview.totals[&StatName::EnergyControl], 57);
        // series slots are labeled with their bucket index
        assert_eq!(series[7].end_time - series[0].end_time, 7);
    }

    #[tokio::test]
    async fn room_overview_without_owner_has_empty_series() {
        let f = fixture();
        f.rooms.upsert_room(RoomRecord::new("W1N1")).await.unwrap();

        let overview = f.service.room_overview("W1N1", 8).await.unwrap();

        assert!(overview.owner.is_none());
        assert!(overview.stats.is_empty());
        assert!(overview.totals.is_empty());
    }

    #[tokio::test]
    async fn room_overview_maxima_cover_all_granularities_in_window() {
        let f = fixture();
        f.rooms.upsert_room(RoomRecord::new("W1N1")).await.unwrap();

        let now = Utc::now();
        f.max_records
            .upsert_max(MaxRecord {
                granularity: Granularity::Minutes8,
                bucket_index: Granularity::Minutes8.bucket_index(now),
                metrics: HashMap::from([(StatName::EnergyHarvested, 77)]),
            })
            .await
            .unwrap();
        // stale record far outside the window
        f.max_records
            .upsert_max(MaxRecord {
                granularity: Granularity::Minutes180,
                bucket_index: Granularity::Minutes180.bucket_index(now) - 50,
                metrics: HashMap::from([(StatName::EnergyHarvested, 9999)]),
            })
            .await
            .unwrap();

        let overview = f.service.room_overview("W1N1", 8).await.unwrap();

        assert_eq!(overview.stats_max["energyHarvested8"], 77);
        assert_eq!(overview.stats_max["energyHarvested180"], 0);
        assert_eq!(overview.stats_max["powerProcessed1440"], 0);
    }

    #[tokio::test]
    async fn map_stats_reports_ownership_sign_and_safe_mode() {
        let f = fixture();
        let mut room = owned_room("W1N1", "u1");
        if let Some(controller) = &mut room.controller {
            controller.sign = Some(RoomSign {
                user: "u2".to_string(),
                text: "keep out".to_string(),
                time: 100,
            });
            controller.safe_mode_until = Some(5_000);
        }
        f.rooms.upsert_room(room).await.unwrap();
        f.rooms.set_game_time(1_000).await.unwrap();
        f.users.register_user(user_model("u1", "alice")).await.unwrap();
        f.users.register_user(user_model("u2", "bob")).await.unwrap();

        let response = f
            .service
            .map_stats(&["W1N1".to_string()], "none0")
            .await
            .unwrap();

        let room_stats = &response.stats["W1N1"];
        assert_eq!(room_stats.own.as_ref().unwrap().user, "u1");
        assert_eq!(room_stats.own.as_ref().unwrap().level, 5);
        assert_eq!(room_stats.sign.as_ref().unwrap().text, "keep out");
        assert_eq!(room_stats.safe_mode, Some(true));
        assert!(response.users.contains_key("u1"));
        assert!(response.users.contains_key("u2"));
        assert_eq!(response.game_time, 1_000);
    }

    #[tokio::test]
    async fn map_stats_expired_safe_mode_is_omitted() {
        let f = fixture();
        let mut room = owned_room("W1N1", "u1");
        if let Some(controller) = &mut room.controller {
            controller.safe_mode_until = Some(500);
        }
        f.rooms.upsert_room(room).await.unwrap();
        f.rooms.set_game_time(1_000).await.unwrap();

        let response = f
            .service
            .map_stats(&["W1N1".to_string()], "none0")
            .await
            .unwrap();

        assert_eq!(response.stats["W1N1"].safe_mode, None);
    }

    #[tokio::test]
    async fn map_stats_reservation_shows_as_level_zero_ownership() {
        let f = fixture();
        let mut room = RoomRecord::new("W1N1");
        room.controller = Some(RoomController {
            user: None,
            level: 0,
            reservation: Some(RoomReservation {
                user: "u3".to_string(),
            }),
            ..RoomController::default()
        });
        f.rooms.upsert_room(room).await.unwrap();

        let response = f
            .service
            .map_stats(&["W1N1".to_string()], "owner0")
            .await
            .unwrap();

        let own = response.stats["W1N1"].own.as_ref().unwrap();
        assert_eq!(own.user, "u3");
        assert_eq!(own.level, 0);
    }

    #[tokio::test]
    async fn map_stats_metric_breakdown_sums_per_user_over_window() {
        let f = fixture();
        f.rooms.upsert_room(RoomRecord::new("W1N1")).await.unwrap();
        f.rooms.upsert_room(RoomRecord::new("W2N2")).await.unwrap();
        seed_bucket(&f.buckets, Granularity::Minutes8, 0, "u1", "W1N1", StatName::EnergyHarvested, 10).await;
        seed_bucket(&f.buckets, Granularity::Minutes8, -1, "u1", "W1N1", StatName::EnergyHarvested, 15).await;
        seed_bucket(&f.buckets, Granularity::Minutes8, 0, "u2", "W1N1", StatName::EnergyHarvested, 3).await;
        // outside the window
        seed_bucket(&f.buckets, Granularity::Minutes8, -30, "u1", "W1N1", StatName::EnergyHarvested, 500).await;

        let now = Utc::now();
        f.max_records
            .upsert_max(MaxRecord {
                granularity: Granularity::Minutes8,
                bucket_index: Granularity::Minutes8.bucket_index(now),
                metrics: HashMap::from([(StatName::EnergyHarvested, 15)]),
            })
            .await
            .unwrap();

        let response = f
            .service
            .map_stats(
                &["W1N1".to_string(), "W2N2".to_string()],
                "energyHarvested8",
            )
            .await
            .unwrap();

        let values = &response.stats["W1N1"].values;
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], UserMetricValue { user: "u1".to_string(), value: 25 });
        assert_eq!(values[1], UserMetricValue { user: "u2".to_string(), value: 3 });
        assert!(response.stats["W2N2"].values.is_empty());
        assert_eq!(response.stats_max, Some(15));
    }

    #[tokio::test]
    async fn map_stats_minerals_overlay_uses_room_records() {
        let f = fixture();
        let mut room = RoomRecord::new("W1N1");
        room.mineral = Some(crate::room::models::MineralDeposit {
            mineral_type: "H".to_string(),
            density: 3,
        });
        f.rooms.upsert_room(room).await.unwrap();

        let response = f
            .service
            .map_stats(&["W1N1".to_string()], "minerals0")
            .await
            .unwrap();

        let minerals = response.stats["W1N1"].minerals.as_ref().unwrap();
        assert_eq!(minerals.mineral_type, "H");
        assert_eq!(minerals.density, 3);
    }

    #[tokio::test]
    async fn map_stats_rejects_malformed_stat_names() {
        let f = fixture();
        let result = f.service.map_stats(&["W1N1".to_string()], "energyHarvested").await;
        assert!(matches!(result, Err(AppError::InvalidParams(_))));

        let result = f.service.map_stats(&["W1N1".to_string()], "energyHarvested9").await;
        assert!(matches!(result, Err(AppError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn map_stats_unknown_metric_skips_the_breakdown() {
        let f = fixture();
        f.rooms.upsert_room(RoomRecord::new("W1N1")).await.unwrap();

        let response = f
            .service
            .map_stats(&["W1N1".to_string()], "energyStolen8")
            .await
            .unwrap();

        assert!(response.stats_max.is_none());
        assert!(response.stats["W1N1"].values.is_empty());
    }
}
