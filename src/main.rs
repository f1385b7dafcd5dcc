use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use inputstats::core::{config, sweeper};
use inputstats::{Aggregator, Config, InputListener, InstanceGuard, Store};

fn main() {
    let data_dir = config::resolve_data_dir();

    // Logging comes up first so everything the instance guard reports
    // (stale-file takeover included) is captured.
    let _log_guard = match init_logging(&data_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("inputstatsd: {e:#}");
            std::process::exit(1);
        }
    };

    let guard = match InstanceGuard::acquire(&data_dir) {
        Ok(guard) => guard,
        Err(e) => {
            error!("refusing to start: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&data_dir, &guard) {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

/// Installs the global subscriber: a daily-rolling file in the data
/// directory plus a plain stderr layer, filtered by `RUST_LOG` with an
/// `info` default.
fn init_logging(data_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log dir {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "inputstatsd.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))?;
    Ok(guard)
}

fn run(data_dir: &Path, guard: &InstanceGuard) -> Result<()> {
    let config = Config::load(data_dir);
    info!(
        pid = guard.pid(),
        data_dir = %data_dir.display(),
        retention_days = config.retention_days,
        sweep_interval_hours = config.sweep_interval_hours,
        "starting input statistics daemon"
    );

    let store = Store::open(&data_dir.join("input.db"))?;
    let aggregator = Arc::new(Aggregator::new(store.clone()));

    sweeper::spawn(store, config.retention(), config.sweep_interval())?;
    InputListener::new(aggregator).spawn()?;

    info!("capture running");
    loop {
        std::thread::park();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn logging_comes_up_before_the_instance_guard() {
        let dir = TempDir::new().unwrap();
        let _log_guard = init_logging(dir.path()).unwrap();
        assert!(dir.path().join("logs").is_dir());
        // Guard messages now land on an installed subscriber.
        let _guard = InstanceGuard::acquire(dir.path()).unwrap();
    }
}
