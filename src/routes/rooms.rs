use std::sync::Arc;

use rand::seq::SliceRandom;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::config::Config;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::room::actor::Command;
use crate::room::registry::validate_room_name;
use crate::room::RoomRegistry;

use super::ClientIp;

const NAME_WORDS: &[&str] = &[
    "amber", "birch", "cedar", "delta", "ember", "fable", "glade", "heron", "ivory", "jade",
    "karst", "lumen", "maple", "nimbus", "opal", "prairie", "quartz", "ridge", "sable", "tundra",
    "umber", "violet", "willow", "xenon", "yarrow", "zephyr",
];

/// `GET /api/room/generate` — a random unused room name. Retries with a
/// fresh candidate if the name collides with a live room or an on-disk
/// snapshot, per the room-name generation behavior.
#[get("/api/room/generate")]
pub async fn generate_room(registry: &State<Arc<RoomRegistry>>) -> Json<serde_json::Value> {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let first = NAME_WORDS.choose(&mut rng).unwrap();
        let second = NAME_WORDS.choose(&mut rng).unwrap();
        let suffix: u32 = rand::Rng::gen_range(&mut rng, 10..99);
        let candidate = format!("{first}-{second}-{suffix}");
        if registry.get(&candidate).await.is_some() {
            continue;
        }
        if registry
            .data_root()
            .join(format!("{candidate}.json"))
            .exists()
        {
            continue;
        }
        return Json(serde_json::json!({ "name": candidate }));
    }
    Json(serde_json::json!({ "name": uuid::Uuid::new_v4().to_string() }))
}

#[derive(Serialize)]
pub struct RoomCheck {
    pub requires_password: bool,
}

/// `GET /api/room/{name}/check` — whether joining requires a password.
#[get("/api/room/<name>/check")]
pub async fn check_room(
    registry: &State<Arc<RoomRegistry>>,
    name: &str,
) -> Result<Json<RoomCheck>, (Status, Json<serde_json::Value>)> {
    if validate_room_name(name).is_err() {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": "invalid room name"})),
        ));
    }

    let requires_password = if let Some(handle) = registry.get(name).await {
        let (tx, rx) = tokio::sync::oneshot::channel();
        handle.send(Command::RequiresPassword { reply: tx }).await;
        rx.await.unwrap_or(false)
    } else if let Ok(Some(snapshot)) =
        crate::persistence::load_snapshot(registry.data_root(), name)
    {
        snapshot.admin_password_hash.is_some() || snapshot.readonly_password_hash.is_some()
    } else {
        false
    };

    Ok(Json(RoomCheck { requires_password }))
}

#[derive(Deserialize)]
pub struct PasswordUpdate {
    pub admin_password: Option<String>,
    pub readonly_password: Option<String>,
    pub current_admin_password: Option<String>,
}

/// `POST /api/room/{name}/password` — sets the room's admin/readonly
/// passwords. Requires the caller to already be admin-authenticated: if the
/// room is currently password-protected, `currentAdminPassword` must match.
#[post("/api/room/<name>/password", format = "json", data = "<body>")]
pub async fn update_password(
    registry: &State<Arc<RoomRegistry>>,
    config: &State<Arc<Config>>,
    _rate_limiter: &State<Arc<RateLimiter>>,
    _rate_config: &State<RateLimitConfig>,
    _ip: ClientIp,
    name: &str,
    body: Json<PasswordUpdate>,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    if validate_room_name(name).is_err() {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": "invalid room name"})),
        ));
    }

    let handle = registry.get_or_create(name).await.map_err(|e| {
        (
            Status::InternalServerError,
            Json(serde_json::json!({"error": e.to_string()})),
        )
    })?;

    let existing = crate::persistence::load_snapshot(registry.data_root(), name).ok().flatten();
    if let Some(snapshot) = &existing
        && let Some(current_hash) = &snapshot.admin_password_hash
    {
        let provided = body.current_admin_password.as_deref().unwrap_or("");
        if !auth::verify_password(provided, current_hash) {
            registry.release(name).await;
            return Err((
                Status::Unauthorized,
                Json(serde_json::json!({"error": "current admin password required"})),
            ));
        }
    }

    if let Some(pw) = &body.admin_password {
        let (tx, rx) = tokio::sync::oneshot::channel();
        handle
            .send(Command::ChangePassword {
                role: crate::models::Role::Admin,
                new_hash: auth::hash_password(pw),
                current_password: body.current_admin_password.clone(),
                requester_role: crate::models::Role::Admin,
                reply: tx,
            })
            .await;
        let _ = rx.await;
    }
    if let Some(pw) = &body.readonly_password {
        let (tx, rx) = tokio::sync::oneshot::channel();
        handle
            .send(Command::ChangePassword {
                role: crate::models::Role::Readonly,
                new_hash: auth::hash_password(pw),
                current_password: body.current_admin_password.clone(),
                requester_role: crate::models::Role::Admin,
                reply: tx,
            })
            .await;
        let _ = rx.await;
    }

    // Flush so the updated hashes survive an immediate retention/restart.
    let (tx, rx) = tokio::sync::oneshot::channel();
    handle.send(Command::Flush { reply: tx }).await;
    if let Ok(snapshot) = rx.await {
        let _ = crate::persistence::write_snapshot(registry.data_root(), name, &snapshot);
    }

    registry.release(name).await;
    let _ = config;
    Ok(Json(serde_json::json!({"ok": true})))
}
