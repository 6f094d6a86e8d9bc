//! Room registry (C3): the process-wide map from room name to a running
//! actor, plus the idle-unload lifecycle. Grounded on the repo's single
//! `Mutex`-guarded connection-map pattern (`Db`, `EventBus`), generalized
//! from "one thing" to "one thing per room".

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{PersistenceError, RegistryError};
use crate::models::RoomSnapshot;
use crate::persistence;
use crate::room::actor::{self, RoomHandle};
use crate::room::state::RoomState;

static ROOM_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]{3,50}$").unwrap());

pub fn validate_room_name(name: &str) -> Result<(), RegistryError> {
    if ROOM_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

struct Entry {
    handle: RoomHandle,
    /// Sessions currently attached, tracked here (not just in the actor) so
    /// `release` can decide synchronously whether to schedule an unload.
    refcount: usize,
}

pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Entry>>,
    data_root: PathBuf,
    uploads_root: PathBuf,
    idle_grace: Duration,
}

impl RoomRegistry {
    pub fn new(data_root: PathBuf, uploads_root: PathBuf, idle_grace: Duration) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            data_root,
            uploads_root,
            idle_grace,
        }
    }

    /// Returns the handle for `name`, creating the room (loading its
    /// snapshot from disk if one exists) if it isn't already loaded.
    pub async fn get_or_create(self: &Arc<Self>, name: &str) -> Result<RoomHandle, RegistryError> {
        validate_room_name(name)?;
        let mut rooms = self.rooms.lock().await;
        if let Some(entry) = rooms.get_mut(name) {
            entry.refcount += 1;
            return Ok(entry.handle.clone());
        }

        let state = match persistence::load_snapshot(&self.data_root, name) {
            Ok(Some(snapshot)) => RoomState::from_snapshot(name, snapshot),
            Ok(None) => RoomState::new(name),
            Err(PersistenceError::Corrupt(_)) => {
                warn!(room = name, "starting fresh room after quarantining corrupt snapshot");
                RoomState::new(name)
            }
            Err(e) => return Err(RegistryError::Persistence(e)),
        };
        let handle = actor::spawn(state);
        info!(room = name, "room loaded");
        rooms.insert(
            name.to_string(),
            Entry {
                handle: handle.clone(),
                refcount: 1,
            },
        );
        Ok(handle)
    }

    /// Looks up a room without creating it, for read-only HTTP endpoints.
    pub async fn get(&self, name: &str) -> Option<RoomHandle> {
        self.rooms.lock().await.get(name).map(|e| e.handle.clone())
    }

    /// Called when a session disconnects from a room. Once the last session
    /// leaves, the room is unloaded after an idle grace period rather than
    /// immediately, so a quick reconnect (page refresh) doesn't pay the cost
    /// of a reload.
    pub async fn release(self: &Arc<Self>, name: &str) {
        let should_schedule = {
            let mut rooms = self.rooms.lock().await;
            match rooms.get_mut(name) {
                Some(entry) if entry.refcount > 0 => {
                    entry.refcount -= 1;
                    entry.refcount == 0
                }
                _ => false,
            }
        };
        if should_schedule {
            self.schedule_unload(name.to_string());
        }
    }

    fn schedule_unload(self: &Arc<Self>, name: String) {
        let registry = Arc::clone(self);
        let grace = self.idle_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            registry.unload_if_idle(&name).await;
        });
    }

    async fn unload_if_idle(&self, name: &str) {
        let handle = {
            let mut rooms = self.rooms.lock().await;
            match rooms.get(name) {
                Some(entry) if entry.refcount == 0 => rooms.remove(name).map(|e| e.handle),
                _ => None,
            }
        };
        let Some(handle) = handle else { return };

        let (tx, rx) = tokio::sync::oneshot::channel();
        handle.send(actor::Command::Flush { reply: tx }).await;
        if let Ok(snapshot) = rx.await {
            if let Err(e) = persistence::write_snapshot(&self.data_root, name, &snapshot) {
                warn!(room = name, error = %e, "failed to flush snapshot on unload");
            }
        }
        handle.send(actor::Command::Shutdown).await;
        info!(room = name, "room unloaded after idle grace period");
    }

    /// Deletes a room outright: shuts down its actor (if loaded) and removes
    /// its on-disk snapshot and upload directory. Used by the admin "delete
    /// room" path.
    pub async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let handle = self.rooms.lock().await.remove(name).map(|e| e.handle);
        if let Some(handle) = handle {
            handle.send(actor::Command::Shutdown).await;
        }
        persistence::delete_snapshot(&self.data_root, name).map_err(|source| {
            RegistryError::Persistence(PersistenceError::Io {
                room: name.to_string(),
                source,
            })
        })?;
        match std::fs::remove_dir_all(self.uploads_root.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RegistryError::Persistence(PersistenceError::Io {
                room: name.to_string(),
                source,
            })),
        }
    }

    /// Polls every loaded room for a dirty snapshot, for the periodic writer.
    pub async fn snapshot_dirty_rooms(&self) -> Vec<(String, RoomSnapshot)> {
        let handles: Vec<(String, RoomHandle)> = {
            let rooms = self.rooms.lock().await;
            rooms
                .iter()
                .map(|(name, entry)| (name.clone(), entry.handle.clone()))
                .collect()
        };
        let mut dirty = Vec::new();
        for (name, handle) in handles {
            let (tx, rx) = tokio::sync::oneshot::channel();
            handle.send(actor::Command::FlushIfDirty { reply: tx }).await;
            if let Ok(Some(snapshot)) = rx.await {
                dirty.push((name, snapshot));
            }
        }
        dirty
    }

    pub async fn loaded_room_names(&self) -> Vec<String> {
        self.rooms.lock().await.keys().cloned().collect()
    }

    pub fn data_root(&self) -> &std::path::Path {
        &self.data_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_name_validation() {
        assert!(validate_room_name("abc").is_ok());
        assert!(validate_room_name("my-room-42").is_ok());
        assert!(validate_room_name("ab").is_err());
        assert!(validate_room_name("has spaces").is_err());
        assert!(validate_room_name(&"x".repeat(51)).is_err());
    }

    #[tokio::test]
    async fn get_or_create_reuses_loaded_room() {
        let dir = std::env::temp_dir().join(format!("canvas-registry-test-{}", uuid_like()));
        let registry = Arc::new(RoomRegistry::new(
            dir.clone(),
            dir.join("uploads"),
            Duration::from_millis(50),
        ));
        let a = registry.get_or_create("test-room").await.unwrap();
        let b = registry.get_or_create("test-room").await.unwrap();
        assert_eq!(a.name, b.name);
        assert_eq!(registry.loaded_room_names().await.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_snapshot_and_upload_dir() {
        let data_root = std::env::temp_dir().join(format!("canvas-registry-test-{}", uuid_like()));
        let uploads_root = data_root.join("uploads");
        let registry = Arc::new(RoomRegistry::new(
            data_root.clone(),
            uploads_root.clone(),
            Duration::from_millis(50),
        ));
        registry.get_or_create("test-room").await.unwrap();
        persistence::write_snapshot(&data_root, "test-room", &RoomState::new("test-room").to_snapshot()).unwrap();
        let room_upload_dir = uploads_root.join("test-room");
        std::fs::create_dir_all(&room_upload_dir).unwrap();
        std::fs::write(room_upload_dir.join("image.png"), b"fake").unwrap();

        registry.delete("test-room").await.unwrap();

        assert!(!room_upload_dir.exists());
        assert!(!data_root.join("test-room.json").exists());
    }

    fn uuid_like() -> String {
        format!("{:x}", std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos())
    }
}
