//! Snapshot persistence (C4): atomic JSON file storage for room state.
//!
//! Writes go to a temp file in the same directory, then an atomic rename, so
//! a crash mid-write never leaves a half-written snapshot in the room's
//! place. A snapshot that still fails to parse on load (disk corruption,
//! manual tampering) is quarantined by renaming it with a `.corrupt` suffix
//! rather than silently discarded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::PersistenceError;
use crate::models::RoomSnapshot;
use crate::room::registry::RoomRegistry;

fn snapshot_path(data_root: &Path, room: &str) -> PathBuf {
    data_root.join(format!("{room}.json"))
}

pub fn load_snapshot(data_root: &Path, room: &str) -> Result<Option<RoomSnapshot>, PersistenceError> {
    let path = snapshot_path(data_root, room);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path).map_err(|source| PersistenceError::Io {
        room: room.to_string(),
        source,
    })?;
    match serde_json::from_slice::<RoomSnapshot>(&bytes) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(_) => {
            quarantine(&path, room);
            Err(PersistenceError::Corrupt(room.to_string()))
        }
    }
}

fn quarantine(path: &Path, room: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    warn!(room, path = %path.display(), "quarantining unreadable snapshot");
    if let Err(e) = std::fs::rename(path, &corrupt_path) {
        error!(room, error = %e, "failed to quarantine corrupt snapshot");
    }
}

/// Write a snapshot atomically: write to `<room>.json.tmp`, fsync is skipped
/// (we accept page-cache-only durability, matching the rest of the repo's
/// SQLite WAL posture) but the rename itself is atomic on the same filesystem.
pub fn write_snapshot(data_root: &Path, room: &str, snapshot: &RoomSnapshot) -> Result<(), PersistenceError> {
    std::fs::create_dir_all(data_root).map_err(|source| PersistenceError::Io {
        room: room.to_string(),
        source,
    })?;
    let final_path = snapshot_path(data_root, room);
    let tmp_path = data_root.join(format!("{room}.json.tmp"));
    let body = serde_json::to_vec_pretty(snapshot).expect("RoomSnapshot always serializes");
    std::fs::write(&tmp_path, body).map_err(|source| PersistenceError::Io {
        room: room.to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, &final_path).map_err(|source| PersistenceError::Io {
        room: room.to_string(),
        source,
    })?;
    Ok(())
}

pub fn delete_snapshot(data_root: &Path, room: &str) -> std::io::Result<()> {
    let path = snapshot_path(data_root, room);
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Lists every room name with a snapshot on disk, used by the retention sweeper.
pub fn list_snapshot_rooms(data_root: &Path) -> std::io::Result<Vec<String>> {
    if !data_root.exists() {
        return Ok(Vec::new());
    }
    let mut rooms = Vec::new();
    for entry in std::fs::read_dir(data_root)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            rooms.push(stem.to_string());
        }
    }
    Ok(rooms)
}

/// Background task (C4): every `cadence`, flushes every dirty room's
/// snapshot to disk. Mirrors the shape of the repo's other periodic sweepers
/// (retention, webhook redelivery) — a `tokio::spawn`'d infinite loop with a
/// fixed sleep between passes.
pub fn spawn_writer(registry: std::sync::Arc<RoomRegistry>, data_root: PathBuf, cadence: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(cadence).await;
            let rooms = registry.snapshot_dirty_rooms().await;
            for (name, snapshot) in rooms {
                match write_snapshot(&data_root, &name, &snapshot) {
                    Ok(()) => info!(room = %name, "snapshot written"),
                    Err(e) => error!(room = %name, error = %e, "snapshot write failed"),
                }
            }
        }
    });
}
