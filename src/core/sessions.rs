use chrono::{DateTime, Duration, Local};

use crate::models::Session;

/// Splits an ascending event timeline into activity sessions. Two
/// consecutive events belong to the same session when they are at most
/// `gap` apart; a strictly larger gap starts a new session. A session with
/// a single event has zero duration.
pub fn segment_sessions(timestamps: &[DateTime<Local>], gap: Duration) -> Vec<Session> {
    let mut sessions = Vec::new();
    let mut iter = timestamps.iter();
    let Some(&first) = iter.next() else {
        return sessions;
    };

    let mut start = first;
    let mut end = first;
    for &ts in iter {
        if ts - end > gap {
            sessions.push(Session { start, end });
            start = ts;
        }
        end = ts;
    }
    sessions.push(Session { start, end });
    sessions
}

/// The session containing `now`, if the most recent event is within `gap`
/// of it.
pub fn current_session(
    timestamps: &[DateTime<Local>],
    gap: Duration,
    now: DateTime<Local>,
) -> Option<Session> {
    let sessions = segment_sessions(timestamps, gap);
    let last = sessions.last()?;
    if now - last.end <= gap {
        Some(*last)
    } else {
        None
    }
}

/// The most recent finished session. The trailing segment always counts
/// as the current one, however long ago it ended, so this is the segment
/// before it; a timeline with a single segment has no previous session.
pub fn previous_session(timestamps: &[DateTime<Local>], gap: Duration) -> Option<Session> {
    let sessions = segment_sessions(timestamps, gap);
    sessions.len().checked_sub(2).map(|i| sessions[i])
}
