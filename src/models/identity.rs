use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Single-character keys tracked by the collector. Shifted punctuation is
/// included because the capture layer resolves identities from the typed
/// text when the OS reports it.
const CHARACTER_KEYS: &str = "abcdefghijklmnopqrstuvwxyz0123456789-=[]\\;',./!@#$%^&*()_+{}|:\"<>?";

const NAMED_KEYS: &[&str] = &[
    "space",
    "tab",
    "capslock",
    "shift",
    "ctrl",
    "alt",
    "win",
    "enter",
    "backspace",
    "esc",
    "up",
    "down",
    "left",
    "right",
];

const MOUSE_BUTTONS: &[&str] = &["mouseleft", "mouseright", "mousemiddle"];

const SCROLL_DIRECTIONS: &[&str] = &["scrollup", "scrolldown"];

/// Counters with no press/release pairing: one row per cursor-position
/// sample, and accumulated travel distance in meters.
const SYNTHETIC: &[&str] = &["mouseposition", "mousedistance"];

static ALL: Lazy<Vec<InputIdentity>> = Lazy::new(|| {
    let mut out: Vec<InputIdentity> = Vec::new();
    let mut buf = [0u8; 4];
    for c in CHARACTER_KEYS.chars() {
        out.push(InputIdentity(Arc::from(c.encode_utf8(&mut buf) as &str)));
    }
    for &name in NAMED_KEYS
        .iter()
        .chain(MOUSE_BUTTONS)
        .chain(SCROLL_DIRECTIONS)
        .chain(SYNTHETIC)
    {
        out.push(InputIdentity(Arc::from(name)));
    }
    out
});

static REGISTRY: Lazy<HashMap<Arc<str>, InputIdentity>> = Lazy::new(|| {
    let mut out = HashMap::with_capacity(ALL.len());
    for identity in ALL.iter() {
        out.insert(Arc::clone(&identity.0), identity.clone());
    }
    out
});

/// Canonical name for a trackable keyboard/mouse input.
///
/// The alphabet is closed: an `InputIdentity` can only be obtained for a
/// name in the fixed registry, and every identity is pre-seeded into the
/// counter and duration tables before capture starts. Handles are interned
/// `Arc<str>`s so clones on the capture hot path are pointer copies.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InputIdentity(Arc<str>);

impl InputIdentity {
    /// Looks up a canonical name in the fixed registry.
    pub fn tracked(name: &str) -> Option<InputIdentity> {
        REGISTRY.get(name).cloned()
    }

    /// Every identity in the registry, in seeding order.
    pub fn all() -> &'static [InputIdentity] {
        &ALL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Synthetic counters have no press/release pairing and no duration row.
    pub fn is_synthetic(&self) -> bool {
        SYNTHETIC.contains(&self.as_str())
    }

    pub fn mouse_position() -> InputIdentity {
        Self::known("mouseposition")
    }

    pub fn mouse_distance() -> InputIdentity {
        Self::known("mousedistance")
    }

    pub fn scroll_up() -> InputIdentity {
        Self::known("scrollup")
    }

    pub fn scroll_down() -> InputIdentity {
        Self::known("scrolldown")
    }

    fn known(name: &'static str) -> InputIdentity {
        REGISTRY
            .get(name)
            .cloned()
            .unwrap_or_else(|| InputIdentity(Arc::from(name)))
    }
}

impl fmt::Display for InputIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for InputIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputIdentity({})", self.as_str())
    }
}
