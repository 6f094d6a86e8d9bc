use rocket::http::Status;
use crate::common::test_client;

#[test]
fn test_health() {
    let client = test_client();
    let res = client.get("/api/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "infinite-canvas");
    assert!(body["version"].is_string());
}

#[test]
fn test_unknown_route_404() {
    let client = test_client();
    let res = client.get("/no/such/route").dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "Not found");
}

#[test]
fn test_retention_run_on_empty_store() {
    let client = test_client();
    let res = client.post("/api/retention/run").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["rooms_checked"], 0);
    assert_eq!(body["rooms_pruned"], 0);
}
