use rocket::http::{ContentType, Status};
use crate::common::test_client;

#[test]
fn test_generate_room_name() {
    let client = test_client();
    let res = client.get("/api/room/generate").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let name = body["name"].as_str().unwrap();
    assert!(!name.is_empty());
}

#[test]
fn test_check_room_without_password_not_required() {
    let client = test_client();
    let res = client.get("/api/room/fresh-room/check").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["requires_password"], false);
}

#[test]
fn test_check_room_invalid_name() {
    let client = test_client();
    let res = client.get("/api/room/a!b/check").dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_set_admin_password_then_check_requires_it() {
    let client = test_client();
    let res = client
        .post("/api/room/locked-room/password")
        .header(ContentType::JSON)
        .body(r#"{"admin_password": "secret123"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get("/api/room/locked-room/check").dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["requires_password"], true);
}

#[test]
fn test_update_password_requires_current_password_once_set() {
    let client = test_client();
    client
        .post("/api/room/guarded-room/password")
        .header(ContentType::JSON)
        .body(r#"{"admin_password": "first-secret"}"#)
        .dispatch();

    // Rotating without the current password is rejected.
    let res = client
        .post("/api/room/guarded-room/password")
        .header(ContentType::JSON)
        .body(r#"{"admin_password": "second-secret"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);

    // Supplying the right current password succeeds.
    let res = client
        .post("/api/room/guarded-room/password")
        .header(ContentType::JSON)
        .body(r#"{"admin_password": "second-secret", "current_admin_password": "first-secret"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn test_update_password_invalid_room_name() {
    let client = test_client();
    let res = client
        .post("/api/room/bad!name/password")
        .header(ContentType::JSON)
        .body(r#"{"admin_password": "x"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}
