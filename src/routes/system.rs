use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{get, post, State};

use crate::config::Config;
use crate::retention::{self, RetentionResult};
use crate::room::RoomRegistry;

#[get("/api/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "infinite-canvas",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Manual retention trigger, exposed for operators and integration tests
/// rather than public clients.
#[post("/api/retention/run")]
pub async fn run_retention_now(
    registry: &State<Arc<RoomRegistry>>,
    config: &State<Arc<Config>>,
) -> Json<RetentionResultView> {
    let result: RetentionResult =
        retention::run_retention(registry.data_root(), registry.inner(), config.retention_days).await;
    Json(RetentionResultView {
        rooms_checked: result.rooms_checked,
        rooms_pruned: result.rooms_pruned,
        pruned_rooms: result.pruned_rooms,
    })
}

#[derive(serde::Serialize)]
pub struct RetentionResultView {
    pub rooms_checked: usize,
    pub rooms_pruned: usize,
    pub pruned_rooms: Vec<String>,
}

#[rocket::catch(429)]
pub fn too_many_requests() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Too many requests"}))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}
