use chrono::{Duration, Utc};
use rocket::http::Status;

use infinite_canvas::config::Config;
use infinite_canvas::models::{Camera, RoomSnapshot};
use infinite_canvas::persistence::write_snapshot;

use crate::common::test_client_with_config;

fn stale_snapshot() -> RoomSnapshot {
    let old = Utc::now() - Duration::days(90);
    RoomSnapshot {
        elements: Vec::new(),
        layers: Vec::new(),
        camera: Camera::default(),
        admin_password_hash: None,
        readonly_password_hash: None,
        created_at: old,
        last_modified_at: old,
    }
}

#[test]
fn test_retention_prunes_stale_unloaded_room() {
    let mut config = Config::default();
    config.retention_days = 30;
    let client = test_client_with_config(config);

    write_snapshot(&client.data_root(), "ancient-room", &stale_snapshot()).unwrap();

    let res = client.post("/api/retention/run").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["rooms_checked"], 1);
    assert_eq!(body["rooms_pruned"], 1);
    assert_eq!(body["pruned_rooms"][0], "ancient-room");
}

#[test]
fn test_retention_keeps_recent_room() {
    let client = test_client_with_config(Config::default());

    let fresh = RoomSnapshot {
        last_modified_at: Utc::now(),
        created_at: Utc::now(),
        ..stale_snapshot()
    };
    write_snapshot(&client.data_root(), "active-room", &fresh).unwrap();

    let res = client.post("/api/retention/run").dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["rooms_pruned"], 0);
}

#[test]
fn test_retention_keeps_currently_loaded_room_even_if_stale() {
    let mut config = Config::default();
    config.retention_days = 30;
    let client = test_client_with_config(config);

    write_snapshot(&client.data_root(), "loaded-room", &stale_snapshot()).unwrap();

    // Touching the password endpoint loads the room into the registry,
    // which must protect it from the sweep regardless of file age.
    client
        .post("/api/room/loaded-room/password")
        .header(rocket::http::ContentType::JSON)
        .body(r#"{"admin_password": "keep-me"}"#)
        .dispatch();

    let res = client.post("/api/retention/run").dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["rooms_pruned"], 0, "a loaded room must never be pruned");
}
