use anyhow::{Context, Result};
use chrono::{Duration, Local};
use std::thread::JoinHandle;
use tracing::{info, warn};

use crate::core::store::Store;

/// Retention sweeper: deletes cursor-position samples older than the
/// retention window, once at startup and then on a fixed interval. A
/// failed sweep is logged and retried on the next cycle; expired rows
/// linger until then, which is acceptable for history data.
pub fn spawn(
    store: Store,
    retention: Duration,
    interval: std::time::Duration,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("retention-sweeper".to_string())
        .spawn(move || loop {
            match sweep_once(&store, retention) {
                Ok(deleted) if deleted > 0 => {
                    info!(deleted, "swept expired cursor positions");
                }
                Ok(_) => {}
                Err(e) => warn!("retention sweep failed: {e:#}"),
            }
            std::thread::sleep(interval);
        })
        .context("spawn retention sweeper thread")
}

pub fn sweep_once(store: &Store, retention: Duration) -> Result<usize> {
    store.sweep_positions_older_than(Local::now() - retention)
}
