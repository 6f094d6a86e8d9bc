use std::env;
use std::path::PathBuf;

/// Process-wide configuration, read from environment variables with sensible
/// defaults. Mirrors the shape of the rest of the repo's `*_env` constructors.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API listen address, e.g. "0.0.0.0:3001".
    pub http_addr: String,
    /// WebSocket collaboration listen address, e.g. "0.0.0.0:3002".
    pub ws_addr: String,
    /// Directory holding `<room>.json` snapshots.
    pub data_root: PathBuf,
    /// Directory holding `<room>/<file>` uploaded images.
    pub uploads_root: PathBuf,
    /// Interval between dirty-room snapshot sweeps.
    pub snapshot_cadence_secs: u64,
    /// Age (days) beyond which an untouched room's snapshot is deleted.
    pub retention_days: i64,
    /// Grace period (seconds) a room stays loaded after its last session leaves.
    pub room_idle_grace_secs: u64,
    /// Maximum accepted image upload size, in bytes.
    pub max_image_bytes: usize,
    /// Max cursor-move frames accepted per connection per window.
    pub cursor_rate_max: usize,
    pub cursor_rate_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:3001".to_string(),
            ws_addr: "0.0.0.0:3002".to_string(),
            data_root: PathBuf::from("./data"),
            uploads_root: PathBuf::from("./uploads"),
            snapshot_cadence_secs: 5,
            retention_days: 30,
            room_idle_grace_secs: 60,
            max_image_bytes: 3 * 1024 * 1024,
            cursor_rate_max: 20,
            cursor_rate_window_secs: 1,
        }
    }
}

impl Config {
    /// Build a `Config` from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    ///
    /// - `HTTP_ADDR`, `WS_ADDR`
    /// - `DATA_ROOT`, `UPLOADS_ROOT`
    /// - `SNAPSHOT_CADENCE_SECS`
    /// - `RETENTION_DAYS`
    /// - `ROOM_IDLE_GRACE_SECS`
    /// - `MAX_IMAGE_BYTES`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("HTTP_ADDR") {
            config.http_addr = val;
        }
        if let Ok(val) = env::var("WS_ADDR") {
            config.ws_addr = val;
        }
        if let Ok(val) = env::var("DATA_ROOT") {
            config.data_root = PathBuf::from(val);
        }
        if let Ok(val) = env::var("UPLOADS_ROOT") {
            config.uploads_root = PathBuf::from(val);
        }
        if let Ok(val) = env::var("SNAPSHOT_CADENCE_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.snapshot_cadence_secs = n;
        }
        if let Ok(val) = env::var("RETENTION_DAYS")
            && let Ok(n) = val.parse::<i64>()
        {
            config.retention_days = n;
        }
        if let Ok(val) = env::var("ROOM_IDLE_GRACE_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.room_idle_grace_secs = n;
        }
        if let Ok(val) = env::var("MAX_IMAGE_BYTES")
            && let Ok(n) = val.parse::<usize>()
        {
            config.max_image_bytes = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_CURSOR")
            && let Ok(n) = val.parse::<usize>()
        {
            config.cursor_rate_max = n;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.http_addr, "0.0.0.0:3001");
        assert_eq!(config.ws_addr, "0.0.0.0:3002");
        assert_eq!(config.snapshot_cadence_secs, 5);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.room_idle_grace_secs, 60);
        assert_eq!(config.max_image_bytes, 3 * 1024 * 1024);
    }
}
