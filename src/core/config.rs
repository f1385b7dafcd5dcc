use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use tracing::warn;

const CONFIG_FILE: &str = "config.json";

/// Daemon tunables, loaded from `config.json` in the data directory.
/// Every field has a default, so a missing or partial file still yields a
/// working configuration; an unreadable file is reported and replaced by
/// the defaults rather than aborting startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Days of cursor-position history to keep.
    pub retention_days: u32,
    /// Hours between retention sweeps.
    pub sweep_interval_hours: u64,
    /// Largest inactivity gap, in minutes, still counted as one session.
    pub session_gap_minutes: i64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            retention_days: 7,
            sweep_interval_hours: 24,
            session_gap_minutes: 15,
        }
    }
}

impl Config {
    pub fn load(data_dir: &Path) -> Config {
        let path = data_dir.join(CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Config::default(),
            Err(e) => {
                warn!("failed to read {}: {e}; using defaults", path.display());
                return Config::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("failed to parse {}: {e}; using defaults", path.display());
                Config::default()
            }
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_hours * 3600)
    }

    pub fn session_gap(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_gap_minutes)
    }
}

/// The directory holding the database, config and logs: `$INPUTSTATS_DIR`
/// if set, otherwise `~/.inputstats`, falling back to the working directory
/// when no home directory can be determined.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("INPUTSTATS_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    for var in ["HOME", "USERPROFILE"] {
        if let Ok(home) = std::env::var(var) {
            if !home.is_empty() {
                return PathBuf::from(home).join(".inputstats");
            }
        }
    }
    PathBuf::from(".")
}
