use chrono::Local;
use std::collections::HashMap;
use std::time::Instant;

use crate::models::{CompletedInput, InputIdentity};

#[derive(Debug, Clone, Copy)]
struct PendingPress {
    pressed_at: Instant,
    origin: Option<(i64, i64)>,
}

/// Press/release pairing state: a two-state machine (Idle/Held) per
/// identity, independent across identities. Owned by the capture layer and
/// guarded by a short-lived mutex; never locked across a store write.
///
/// Durations are measured on the monotonic clock from press to release.
/// There is no expiry for Held entries: a missed release leaves the
/// identity Held until its next press/release cycle completes it.
#[derive(Debug, Default)]
pub struct PairingState {
    held: HashMap<InputIdentity, PendingPress>,
}

impl PairingState {
    pub fn new() -> PairingState {
        PairingState::default()
    }

    /// Idle → Held. A press while already Held is a no-op, matching
    /// keyboard auto-repeat. Returns whether a new Held entry was created.
    pub fn press(&mut self, identity: InputIdentity, origin: Option<(i64, i64)>) -> bool {
        if self.held.contains_key(&identity) {
            return false;
        }
        self.held.insert(
            identity,
            PendingPress {
                pressed_at: Instant::now(),
                origin,
            },
        );
        true
    }

    /// Held → Idle. Returns the completed pair, or `None` for a release
    /// with no matching press (never a negative or phantom duration).
    pub fn release(
        &mut self,
        identity: &InputIdentity,
        release_position: Option<(i64, i64)>,
    ) -> Option<CompletedInput> {
        let pending = self.held.remove(identity)?;
        Some(CompletedInput {
            identity: identity.clone(),
            duration: pending.pressed_at.elapsed().as_secs_f64(),
            released_at: Local::now(),
            origin: pending.origin,
            release_position,
        })
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn is_held(&self, identity: &InputIdentity) -> bool {
        self.held.contains_key(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(name: &str) -> InputIdentity {
        InputIdentity::tracked(name).unwrap()
    }

    #[test]
    fn press_then_release_completes_with_measured_duration() {
        let mut state = PairingState::new();
        assert!(state.press(id("a"), None));
        std::thread::sleep(Duration::from_millis(25));

        let completed = state.release(&id("a"), None).unwrap();
        assert_eq!(completed.identity.as_str(), "a");
        assert!(completed.duration >= 0.025);
        assert!(completed.origin.is_none());
        assert_eq!(state.held_count(), 0);
    }

    #[test]
    fn release_without_press_is_ignored() {
        let mut state = PairingState::new();
        assert!(state.release(&id("x"), None).is_none());
        assert_eq!(state.held_count(), 0);
    }

    #[test]
    fn repeat_press_while_held_is_a_no_op() {
        let mut state = PairingState::new();
        assert!(state.press(id("shift"), None));
        assert!(!state.press(id("shift"), None));
        assert!(!state.press(id("shift"), None));
        assert_eq!(state.held_count(), 1);

        assert!(state.release(&id("shift"), None).is_some());
        // The single Held entry yields a single completion.
        assert!(state.release(&id("shift"), None).is_none());
    }

    #[test]
    fn identities_are_held_independently() {
        let mut state = PairingState::new();
        state.press(id("ctrl"), None);
        state.press(id("c"), None);
        assert_eq!(state.held_count(), 2);

        let c = state.release(&id("c"), None).unwrap();
        assert_eq!(c.identity.as_str(), "c");
        assert!(state.is_held(&id("ctrl")));
        assert!(!state.is_held(&id("c")));
    }

    #[test]
    fn mouse_press_carries_origin_to_completion() {
        let mut state = PairingState::new();
        state.press(id("mouseleft"), Some((10, 20)));
        let completed = state.release(&id("mouseleft"), Some((30, 40))).unwrap();
        assert_eq!(completed.origin, Some((10, 20)));
        assert_eq!(completed.release_position, Some((30, 40)));
    }
}
