use axum::http::StatusCode;
use serde_json::json;

use roomstats::room::RoomRepository;
use roomstats::stats::RawEventLog;
use roomstats::StatName;

mod utils;

use utils::TestApp;

#[tokio::test]
async fn test_increments_flow_into_user_stats() {
    let app = TestApp::new();

    app.record_and_flush("W1N1", "u1", StatName::EnergyHarvested, 100).await;
    app.consolidate().await;

    let (status, body) = app.get("/api/user/stats?interval=8&id=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], 1);
    assert_eq!(body["stats"]["energyHarvested"], 100);
    assert_eq!(body["stats"]["creepsLost"], 0);
}

#[tokio::test]
async fn test_repeated_cycles_accumulate_in_the_same_bucket() {
    let app = TestApp::new();

    app.record_and_flush("W1N1", "u1", StatName::EnergyHarvested, 100).await;
    app.consolidate().await;
    app.record_and_flush("W1N1", "u1", StatName::EnergyHarvested, 100).await;
    app.consolidate().await;

    let (_, body) = app.get("/api/user/stats?interval=8&id=u1").await;
    assert_eq!(body["stats"]["energyHarvested"], 200);
}

#[tokio::test]
async fn test_consolidation_prunes_the_raw_log() {
    let app = TestApp::new();

    app.record_and_flush("W1N1", "u1", StatName::CreepsProduced, 3).await;
    assert_eq!(app.state.raw_event_log.fetch_all().await.unwrap().len(), 1);

    app.consolidate().await;
    assert!(app.state.raw_event_log.fetch_all().await.unwrap().is_empty());

    // A second pass over the empty log changes nothing
    app.consolidate().await;
    let (_, body) = app.get("/api/user/stats?interval=8&id=u1").await;
    assert_eq!(body["stats"]["creepsProduced"], 3);
}

#[tokio::test]
async fn test_room_overview_reports_owner_series_and_records() {
    let app = TestApp::new();
    app.register_user("u1", "alice").await;

    let mut room = roomstats::room::RoomRecord::new("W1N1");
    room.controller = Some(roomstats::room::RoomController {
        user: Some("u1".to_string()),
        level: 4,
        ..Default::default()
    });
    app.state.room_repository.upsert_room(room).await.unwrap();

    app.record_and_flush("W1N1", "u1", StatName::EnergyControl, 55).await;
    app.consolidate().await;

    let (status, body) = app.get("/api/game/room-overview?room=W1N1&interval=8").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner"]["username"], "alice");
    assert_eq!(body["totals"]["energyControl"], 55);

    let series = body["stats"]["energyControl"].as_array().unwrap();
    assert_eq!(series.len(), 8);
    assert_eq!(series.last().unwrap()["value"], 55);

    // The consolidation pass also tracked the bucket record
    assert_eq!(body["statsMax"]["energyControl8"], 55);
}

#[tokio::test]
async fn test_map_stats_breakdown_after_consolidation() {
    let app = TestApp::new();
    app.register_user("u1", "alice").await;

    let mut room = roomstats::room::RoomRecord::new("W1N1");
    room.controller = Some(roomstats::room::RoomController {
        user: Some("u1".to_string()),
        level: 2,
        ..Default::default()
    });
    app.state.room_repository.upsert_room(room).await.unwrap();

    app.record_and_flush("W1N1", "u1", StatName::EnergyHarvested, 40).await;
    app.consolidate().await;

    let (status, body) = app
        .post(
            "/api/game/map-stats",
            Some(json!({"rooms": ["W1N1"], "statName": "energyHarvested8"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let values = body["stats"]["W1N1"]["values"].as_array().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["user"], "u1");
    assert_eq!(values[0]["value"], 40);
    assert_eq!(body["users"]["u1"]["username"], "alice");
}

#[tokio::test]
async fn test_clear_stats_wipes_consolidated_data() {
    let app = TestApp::new();

    app.record_and_flush("W1N1", "u1", StatName::EnergyHarvested, 100).await;
    app.consolidate().await;

    let (status, _) = app.post("/api/console/clear-stats", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/api/user/stats?interval=8&id=u1").await;
    assert_eq!(body["stats"]["energyHarvested"], 0);
}

#[tokio::test]
async fn test_consolidation_without_season_still_buckets() {
    let app = TestApp::new();

    // No season rotated: stats consolidate, leaderboards stay empty
    app.record_and_flush("W1N1", "u1", StatName::EnergyControl, 10).await;
    app.consolidate().await;

    let (_, stats) = app.get("/api/user/stats?interval=8&id=u1").await;
    assert_eq!(stats["stats"]["energyControl"], 10);

    app.post("/api/console/rotate-season", None).await;
    let (_, body) = app.get("/api/leaderboard/seasons").await;
    let season = body["seasons"][0]["id"].as_str().unwrap().to_string();

    let (_, list) = app
        .get(&format!(
            "/api/leaderboard/list?mode=world&season={season}&limit=10"
        ))
        .await;
    assert_eq!(list["count"], 0);
}
