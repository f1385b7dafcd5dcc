use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use rusqlite::{params, Connection, OpenFlags, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::sessions;
use crate::models::{CompletedInput, EventKind, InputIdentity, PositionSample, RawEvent, Session};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Pixel-to-meter conversion applied to cursor travel distance.
pub const METERS_PER_PIXEL: f64 = 0.0002646;

/// Grouping granularity for time-series counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Minute,
    Hour,
    Day,
    Month,
}

impl TimeBucket {
    fn strftime_format(self) -> &'static str {
        match self {
            TimeBucket::Minute => "%Y-%m-%d %H:%M",
            TimeBucket::Hour => "%Y-%m-%d %H:00",
            TimeBucket::Day => "%Y-%m-%d",
            TimeBucket::Month => "%Y-%m",
        }
    }
}

enum StoreOp {
    CompletedKey(CompletedInput),
    CompletedClick(CompletedInput),
    Scroll {
        identity: InputIdentity,
    },
    CursorSample {
        timestamp: DateTime<Local>,
        x: i64,
        y: i64,
        distance_m: f64,
    },
    SweepPositions {
        cutoff: DateTime<Local>,
        reply: Sender<Result<usize>>,
    },
    Checkpoint {
        reply: Sender<()>,
    },
}

/// Durable aggregate store.
///
/// All writes funnel through a single worker thread that owns the sole
/// writable connection and applies each operation in its own transaction,
/// so the three effects of a completed input (event row, counter bump,
/// lifetime-maximum update) commit atomically and writes for any identity
/// are linearized by construction. Reads open their own read-only
/// connection per call and may observe a slightly stale but consistent
/// snapshot.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    tx: Sender<StoreOp>,
}

impl Store {
    /// Opens (creating if needed) the database, seeds the identity rows,
    /// and starts the write worker. Seeding happens synchronously so every
    /// identity has its counter and duration rows before capture begins.
    pub fn open(path: &Path) -> Result<Store> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store dir {}", parent.display()))?;
        }

        let mut conn = open_write_conn(path)?;
        migrate(&conn)?;
        seed_identities(&mut conn)?;

        let (tx, rx) = mpsc::channel::<StoreOp>();
        std::thread::Builder::new()
            .name("store-writer".to_string())
            .spawn(move || {
                for op in rx {
                    match op {
                        StoreOp::CompletedKey(input) => {
                            if let Err(e) = apply_completed_key(&mut conn, &input) {
                                warn!(identity = %input.identity, "completed-key write failed: {e:#}");
                            }
                        }
                        StoreOp::CompletedClick(input) => {
                            if let Err(e) = apply_completed_click(&mut conn, &input) {
                                warn!(identity = %input.identity, "completed-click write failed: {e:#}");
                            }
                        }
                        StoreOp::Scroll { identity } => {
                            if let Err(e) = increment_count(&conn, &identity) {
                                warn!(identity = %identity, "scroll write failed: {e:#}");
                            }
                        }
                        StoreOp::CursorSample {
                            timestamp,
                            x,
                            y,
                            distance_m,
                        } => {
                            if let Err(e) =
                                apply_cursor_sample(&mut conn, timestamp, x, y, distance_m)
                            {
                                warn!("cursor-sample write failed: {e:#}");
                            }
                        }
                        StoreOp::SweepPositions { cutoff, reply } => {
                            let _ = reply.send(apply_sweep(&conn, cutoff));
                        }
                        StoreOp::Checkpoint { reply } => {
                            let _ = reply.send(());
                        }
                    }
                }
                debug!("store writer exiting");
            })
            .context("spawn store writer thread")?;

        Ok(Store {
            path: path.to_path_buf(),
            tx,
        })
    }

    // ----- write path (enqueued, applied in order by the worker) -----

    pub fn record_completed_key(&self, input: CompletedInput) {
        self.enqueue(StoreOp::CompletedKey(input));
    }

    pub fn record_completed_click(&self, input: CompletedInput) {
        self.enqueue(StoreOp::CompletedClick(input));
    }

    pub fn record_scroll(&self, identity: InputIdentity) {
        self.enqueue(StoreOp::Scroll { identity });
    }

    pub fn record_cursor_sample(
        &self,
        timestamp: DateTime<Local>,
        x: i64,
        y: i64,
        distance_m: f64,
    ) {
        self.enqueue(StoreOp::CursorSample {
            timestamp,
            x,
            y,
            distance_m,
        });
    }

    /// Deletes position samples older than `cutoff`, returning the number
    /// of rows removed. Blocks until the worker has applied the delete.
    pub fn sweep_positions_older_than(&self, cutoff: DateTime<Local>) -> Result<usize> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(StoreOp::SweepPositions {
                cutoff,
                reply: reply_tx,
            })
            .context("store worker unavailable")?;
        reply_rx.recv().context("store worker dropped sweep reply")?
    }

    /// Blocks until every previously enqueued write has been applied.
    pub fn checkpoint(&self) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(StoreOp::Checkpoint { reply: reply_tx })
            .context("store worker unavailable")?;
        reply_rx.recv().context("store worker dropped checkpoint")?;
        Ok(())
    }

    fn enqueue(&self, op: StoreOp) {
        if self.tx.send(op).is_err() {
            warn!("store worker unavailable; dropping write");
        }
    }

    // ----- read path (read-only connection per call) -----

    pub fn total_count(&self, identity: &InputIdentity) -> Result<u64> {
        let conn = open_read_conn(&self.path)?;
        let count: i64 = conn
            .query_row(
                "SELECT totalCount FROM totalCounts WHERE inputName = ?1",
                params![identity.as_str()],
                |row| row.get(0),
            )
            .with_context(|| format!("query totalCounts for {identity}"))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Accumulated cursor travel distance in meters.
    pub fn mouse_distance_meters(&self) -> Result<f64> {
        let conn = open_read_conn(&self.path)?;
        conn.query_row(
            "SELECT totalCount FROM totalCounts WHERE inputName = 'mousedistance'",
            [],
            |row| row.get(0),
        )
        .context("query mousedistance")
    }

    pub fn all_total_counts(&self) -> Result<Vec<(String, f64)>> {
        let conn = open_read_conn(&self.path)?;
        let mut stmt = conn
            .prepare("SELECT inputName, totalCount FROM totalCounts ORDER BY inputName")
            .context("prepare totalCounts scan")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))
            .context("query totalCounts")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read totalCounts rows")
    }

    pub fn longest_duration(&self, identity: &InputIdentity) -> Result<f64> {
        let conn = open_read_conn(&self.path)?;
        conn.query_row(
            "SELECT duration FROM lifetimeLongestDurations WHERE inputName = ?1",
            params![identity.as_str()],
            |row| row.get(0),
        )
        .with_context(|| format!("query lifetimeLongestDurations for {identity}"))
    }

    pub fn all_longest_durations(&self) -> Result<Vec<(String, f64)>> {
        self.longest_durations_where("")
    }

    /// Only identities that have recorded at least one hold.
    pub fn nonzero_longest_durations(&self) -> Result<Vec<(String, f64)>> {
        self.longest_durations_where("WHERE duration > 0")
    }

    fn longest_durations_where(&self, filter: &str) -> Result<Vec<(String, f64)>> {
        let conn = open_read_conn(&self.path)?;
        let sql = format!(
            "SELECT inputName, duration FROM lifetimeLongestDurations {filter} ORDER BY inputName"
        );
        let mut stmt = conn.prepare(&sql).context("prepare durations scan")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))
            .context("query lifetimeLongestDurations")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read lifetimeLongestDurations rows")
    }

    pub fn events_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
        kinds: &[EventKind],
    ) -> Result<Vec<RawEvent>> {
        let conn = open_read_conn(&self.path)?;
        let sql = format!(
            "SELECT id, eventTypeID, timestamp, key, button, positionX, positionY, duration \
             FROM events WHERE timestamp BETWEEN ?1 AND ?2{} ORDER BY timestamp, id",
            kind_filter_sql(kinds)
        );
        let mut stmt = conn.prepare(&sql).context("prepare events query")?;
        let rows = stmt
            .query_map(params![format_ts(start), format_ts(end)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Option<f64>>(7)?,
                ))
            })
            .context("query events")?;

        let mut out = Vec::new();
        for row in rows {
            let (id, type_id, ts, key, button, x, y, duration) =
                row.context("read events row")?;
            let (Some(kind), Some(timestamp)) = (EventKind::from_id(type_id), parse_ts(&ts))
            else {
                continue;
            };
            out.push(RawEvent {
                id,
                kind,
                timestamp,
                key,
                button,
                position_x: x,
                position_y: y,
                duration,
            });
        }
        Ok(out)
    }

    /// Event counts grouped into time buckets, for time-series display.
    pub fn event_counts_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
        kinds: &[EventKind],
        bucket: TimeBucket,
    ) -> Result<Vec<(String, u64)>> {
        let conn = open_read_conn(&self.path)?;
        let sql = format!(
            "SELECT strftime('{fmt}', timestamp) AS bucket, COUNT(*) \
             FROM events WHERE timestamp BETWEEN ?1 AND ?2{filter} \
             GROUP BY bucket ORDER BY bucket",
            fmt = bucket.strftime_format(),
            filter = kind_filter_sql(kinds),
        );
        let mut stmt = conn.prepare(&sql).context("prepare bucketed counts query")?;
        let rows = stmt
            .query_map(params![format_ts(start), format_ts(end)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .context("query bucketed counts")?;

        let mut out = Vec::new();
        for row in rows {
            let (bucket_key, count) = row.context("read bucketed count row")?;
            out.push((bucket_key, u64::try_from(count).unwrap_or(0)));
        }
        Ok(out)
    }

    pub fn positions_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<PositionSample>> {
        let conn = open_read_conn(&self.path)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, positionX, positionY FROM mousePositions \
                 WHERE timestamp BETWEEN ?1 AND ?2 ORDER BY timestamp",
            )
            .context("prepare mousePositions query")?;
        let rows = stmt
            .query_map(params![format_ts(start), format_ts(end)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .context("query mousePositions")?;

        let mut out = Vec::new();
        for row in rows {
            let (id, ts, x, y) = row.context("read mousePositions row")?;
            let Some(timestamp) = parse_ts(&ts) else {
                continue;
            };
            out.push(PositionSample {
                id,
                timestamp,
                x,
                y,
            });
        }
        Ok(out)
    }

    /// Ascending timestamps of key-press and mouse-click events, the input
    /// to session derivation.
    pub fn event_timestamps_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<DateTime<Local>>> {
        let conn = open_read_conn(&self.path)?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp FROM events \
                 WHERE timestamp BETWEEN ?1 AND ?2 AND eventTypeID IN (1, 3) \
                 ORDER BY timestamp",
            )
            .context("prepare session timestamps query")?;
        let rows = stmt
            .query_map(params![format_ts(start), format_ts(end)], |row| {
                row.get::<_, String>(0)
            })
            .context("query session timestamps")?;

        let mut out = Vec::new();
        for row in rows {
            let ts = row.context("read session timestamp row")?;
            if let Some(timestamp) = parse_ts(&ts) {
                out.push(timestamp);
            }
        }
        Ok(out)
    }

    pub fn latest_event_timestamp(&self) -> Result<Option<DateTime<Local>>> {
        let conn = open_read_conn(&self.path)?;
        let ts: Option<String> = conn
            .query_row(
                "SELECT timestamp FROM events WHERE eventTypeID IN (1, 3) \
                 ORDER BY timestamp DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("query latest event timestamp")?;
        Ok(ts.and_then(|s| parse_ts(&s)))
    }

    /// Active sessions over an arbitrary window, derived fresh.
    pub fn sessions_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
        gap: chrono::Duration,
    ) -> Result<Vec<Session>> {
        let timestamps = self.event_timestamps_between(start, end)?;
        Ok(sessions::segment_sessions(&timestamps, gap))
    }
}

fn open_write_conn(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("open sqlite db {}", path.display()))?;
    let _ = conn.busy_timeout(Duration::from_secs(2));
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("set journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("set synchronous=NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")
        .context("set temp_store=MEMORY")?;
    Ok(conn)
}

fn open_read_conn(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("open sqlite db (read-only) {}", path.display()))
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS eventTypes (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
  id INTEGER PRIMARY KEY,
  eventTypeID INTEGER,
  timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
  key TEXT,
  button TEXT,
  positionX INTEGER,
  positionY INTEGER,
  duration REAL,
  FOREIGN KEY (eventTypeID) REFERENCES eventTypes(id)
);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);

CREATE TABLE IF NOT EXISTS mousePositions (
  id INTEGER PRIMARY KEY,
  timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
  positionX INTEGER,
  positionY INTEGER
);
CREATE INDEX IF NOT EXISTS idx_mousePositions_timestamp ON mousePositions(timestamp);

CREATE TABLE IF NOT EXISTS totalCounts (
  id INTEGER PRIMARY KEY,
  inputName TEXT UNIQUE NOT NULL,
  totalCount INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS lifetimeLongestDurations (
  id INTEGER PRIMARY KEY,
  inputName TEXT UNIQUE NOT NULL,
  duration REAL DEFAULT 0
);
"#,
    )
    .context("migrate sqlite schema")?;
    Ok(())
}

/// Idempotently seeds the event-type names and one counter/duration row per
/// identity. Synthetic counters have no hold duration, so they only get a
/// `totalCounts` row.
fn seed_identities(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction().context("start seed transaction")?;
    for kind in EventKind::ALL {
        tx.execute(
            "INSERT OR IGNORE INTO eventTypes (id, name) VALUES (?1, ?2)",
            params![kind.id(), kind.name()],
        )
        .context("seed eventTypes")?;
    }
    {
        let mut count_stmt = tx
            .prepare("INSERT OR IGNORE INTO totalCounts (inputName) VALUES (?1)")
            .context("prepare totalCounts seed")?;
        let mut duration_stmt = tx
            .prepare("INSERT OR IGNORE INTO lifetimeLongestDurations (inputName) VALUES (?1)")
            .context("prepare lifetimeLongestDurations seed")?;
        for identity in InputIdentity::all() {
            count_stmt
                .execute(params![identity.as_str()])
                .context("seed totalCounts")?;
            if !identity.is_synthetic() {
                duration_stmt
                    .execute(params![identity.as_str()])
                    .context("seed lifetimeLongestDurations")?;
            }
        }
    }
    tx.commit().context("commit seed transaction")
}

fn apply_completed_key(conn: &mut Connection, input: &CompletedInput) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("start completed-key transaction")?;
    tx.execute(
        "INSERT INTO events (eventTypeID, timestamp, key, duration) VALUES (1, ?1, ?2, ?3)",
        params![
            format_ts(input.released_at),
            input.identity.as_str(),
            input.duration
        ],
    )
    .context("insert keyPress event")?;
    apply_count_and_duration(&tx, input)?;
    tx.commit().context("commit completed-key transaction")
}

fn apply_completed_click(conn: &mut Connection, input: &CompletedInput) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("start completed-click transaction")?;
    let (origin_x, origin_y) = split(input.origin);
    tx.execute(
        "INSERT INTO events (eventTypeID, timestamp, button, positionX, positionY, duration) \
         VALUES (3, ?1, ?2, ?3, ?4, ?5)",
        params![
            format_ts(input.released_at),
            input.identity.as_str(),
            origin_x,
            origin_y,
            input.duration
        ],
    )
    .context("insert mouseClick event")?;

    let (release_x, release_y) = split(input.release_position);
    tx.execute(
        "INSERT INTO events (eventTypeID, timestamp, button, positionX, positionY) \
         VALUES (4, ?1, ?2, ?3, ?4)",
        params![
            format_ts(input.released_at),
            input.identity.as_str(),
            release_x,
            release_y
        ],
    )
    .context("insert mouseRelease event")?;
    apply_count_and_duration(&tx, input)?;
    tx.commit().context("commit completed-click transaction")
}

fn apply_count_and_duration(tx: &Connection, input: &CompletedInput) -> Result<()> {
    tx.execute(
        "UPDATE totalCounts SET totalCount = totalCount + 1 WHERE inputName = ?1",
        params![input.identity.as_str()],
    )
    .context("increment totalCounts")?;
    // Strictly-greater update keeps the lifetime maximum monotone.
    tx.execute(
        "UPDATE lifetimeLongestDurations SET duration = ?2 \
         WHERE inputName = ?1 AND ?2 > duration",
        params![input.identity.as_str(), input.duration],
    )
    .context("update lifetimeLongestDurations")?;
    Ok(())
}

fn increment_count(conn: &Connection, identity: &InputIdentity) -> Result<()> {
    conn.execute(
        "UPDATE totalCounts SET totalCount = totalCount + 1 WHERE inputName = ?1",
        params![identity.as_str()],
    )
    .with_context(|| format!("increment totalCounts for {identity}"))?;
    Ok(())
}

fn apply_cursor_sample(
    conn: &mut Connection,
    timestamp: DateTime<Local>,
    x: i64,
    y: i64,
    distance_m: f64,
) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("start cursor-sample transaction")?;
    tx.execute(
        "INSERT INTO mousePositions (timestamp, positionX, positionY) VALUES (?1, ?2, ?3)",
        params![format_ts(timestamp), x, y],
    )
    .context("insert mousePositions row")?;
    tx.execute(
        "UPDATE totalCounts SET totalCount = totalCount + 1 WHERE inputName = 'mouseposition'",
        [],
    )
    .context("increment mouseposition count")?;
    tx.execute(
        "UPDATE totalCounts SET totalCount = totalCount + ?1 WHERE inputName = 'mousedistance'",
        params![distance_m],
    )
    .context("accumulate mousedistance")?;
    tx.commit().context("commit cursor-sample transaction")
}

fn apply_sweep(conn: &Connection, cutoff: DateTime<Local>) -> Result<usize> {
    conn.execute(
        "DELETE FROM mousePositions WHERE timestamp < ?1",
        params![format_ts(cutoff)],
    )
    .context("delete expired mousePositions")
}

fn kind_filter_sql(kinds: &[EventKind]) -> String {
    if kinds.is_empty() {
        return String::new();
    }
    let ids: Vec<String> = kinds.iter().map(|k| k.id().to_string()).collect();
    format!(" AND eventTypeID IN ({})", ids.join(","))
}

fn split(position: Option<(i64, i64)>) -> (Option<i64>, Option<i64>) {
    match position {
        Some((x, y)) => (Some(x), Some(y)),
        None => (None, None),
    }
}

fn format_ts(timestamp: DateTime<Local>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_ts(raw: &str) -> Option<DateTime<Local>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()?
        .and_local_timezone(Local)
        .earliest()
}
