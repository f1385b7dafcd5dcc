use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::models::InputIdentity;

/// Event taxonomy persisted in the `eventTypes` table. The collector only
/// writes `KeyPress`, `MouseClick` and `MouseRelease` rows; the remaining
/// variants are seeded for schema completeness and read-side filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    KeyPress,
    KeyRelease,
    MouseClick,
    MouseRelease,
    MouseScroll,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::KeyPress,
        EventKind::KeyRelease,
        EventKind::MouseClick,
        EventKind::MouseRelease,
        EventKind::MouseScroll,
    ];

    pub fn id(self) -> i64 {
        match self {
            EventKind::KeyPress => 1,
            EventKind::KeyRelease => 2,
            EventKind::MouseClick => 3,
            EventKind::MouseRelease => 4,
            EventKind::MouseScroll => 5,
        }
    }

    pub fn from_id(id: i64) -> Option<EventKind> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::KeyPress => "keyPress",
            EventKind::KeyRelease => "keyRelease",
            EventKind::MouseClick => "mouseClick",
            EventKind::MouseRelease => "mouseRelease",
            EventKind::MouseScroll => "mouseScroll",
        }
    }
}

/// One append-only row of the `events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: i64,
    pub kind: EventKind,
    pub timestamp: DateTime<Local>,
    pub key: Option<String>,
    pub button: Option<String>,
    pub position_x: Option<i64>,
    pub position_y: Option<i64>,
    /// Hold duration in seconds, set only on the completing event of a
    /// press/release pair.
    pub duration: Option<f64>,
}

/// One row of the `mousePositions` table, sampled on every cursor change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSample {
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub x: i64,
    pub y: i64,
}

/// A finished press/release pair handed from the pairing state to the
/// aggregation engine. Mouse clicks carry the press-origin and release
/// positions; keyboard pairs carry neither.
#[derive(Debug, Clone)]
pub struct CompletedInput {
    pub identity: InputIdentity,
    /// Seconds the input was held, measured on the monotonic clock.
    pub duration: f64,
    /// Wall-clock time of the completing release.
    pub released_at: DateTime<Local>,
    pub origin: Option<(i64, i64)>,
    pub release_position: Option<(i64, i64)>,
}

/// A derived active-session interval. Never persisted; recomputed from the
/// event timeline on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl Session {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}
