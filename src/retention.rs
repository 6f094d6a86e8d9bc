//! Retention sweeper (C7): periodically deletes snapshots for rooms that
//! have been untouched for longer than the configured retention window.
//! A room is never deleted while it's loaded in the registry, so an active
//! session can never lose its room mid-use.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::persistence;
use crate::room::RoomRegistry;

const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Result of a single retention sweep.
#[derive(Debug, Clone, Default)]
pub struct RetentionResult {
    pub rooms_checked: usize,
    pub rooms_pruned: usize,
    pub pruned_rooms: Vec<String>,
}

/// Spawns the background retention task. Mirrors the rest of the repo's
/// periodic-sweep tasks: an initial startup delay, then a fixed-interval loop.
pub fn spawn_retention_task(data_root: PathBuf, registry: Arc<RoomRegistry>, retention_days: i64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        loop {
            let result = run_retention(&data_root, &registry, retention_days).await;
            if result.rooms_pruned > 0 {
                info!(
                    pruned = result.rooms_pruned,
                    checked = result.rooms_checked,
                    "retention sweep pruned rooms"
                );
            }
            tokio::time::sleep(Duration::from_secs(SWEEP_INTERVAL_SECS)).await;
        }
    });
}

/// Executes one retention sweep. Exposed standalone so the manual
/// `/api/retention/run` endpoint can trigger it on demand.
pub async fn run_retention(data_root: &Path, registry: &Arc<RoomRegistry>, retention_days: i64) -> RetentionResult {
    let mut result = RetentionResult::default();

    let rooms = match persistence::list_snapshot_rooms(data_root) {
        Ok(rooms) => rooms,
        Err(e) => {
            warn!(error = %e, "retention sweep failed to list snapshots");
            return result;
        }
    };
    result.rooms_checked = rooms.len();

    let loaded: std::collections::HashSet<String> = registry.loaded_room_names().await.into_iter().collect();
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);

    for room in rooms {
        if loaded.contains(&room) {
            continue;
        }
        let snapshot = match persistence::load_snapshot(data_root, &room) {
            Ok(Some(s)) => s,
            _ => continue,
        };
        if snapshot.last_modified_at >= cutoff {
            continue;
        }
        if let Err(e) = registry.delete(&room).await {
            warn!(room = %room, error = %e, "retention sweep failed to delete room");
            continue;
        }
        result.rooms_pruned += 1;
        result.pruned_rooms.push(room);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_over_empty_data_root_is_a_noop() {
        let dir = std::env::temp_dir().join(format!(
            "canvas-retention-test-{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let registry = Arc::new(RoomRegistry::new(
            dir.clone(),
            dir.join("uploads"),
            Duration::from_secs(60),
        ));
        let result = run_retention(&dir, &registry, 30).await;
        assert_eq!(result.rooms_checked, 0);
        assert_eq!(result.rooms_pruned, 0);
    }
}
