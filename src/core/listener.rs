use anyhow::{Context, Result};
use parking_lot::Mutex;
use rdev::EventType;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, trace};

use crate::core::aggregator::Aggregator;
use crate::core::keymap;
use crate::core::pairing::PairingState;
use crate::models::InputIdentity;

struct ListenerState {
    pairing: PairingState,
    /// Identity each physical key resolved to at press time. Release events
    /// carry no typed text, so a Shift+1 press tracked as `!` must release
    /// as `!` too, not as `1`.
    down: HashMap<rdev::Key, InputIdentity>,
}

/// Global input capture. Runs the OS hook on a dedicated thread and feeds
/// resolved events into the aggregator; the hook callback itself stays
/// cheap (identity lookup, pairing update, channel enqueue).
pub struct InputListener {
    aggregator: Arc<Aggregator>,
    state: Mutex<ListenerState>,
}

impl InputListener {
    pub fn new(aggregator: Arc<Aggregator>) -> Arc<InputListener> {
        Arc::new(InputListener {
            aggregator,
            state: Mutex::new(ListenerState {
                pairing: PairingState::new(),
                down: HashMap::new(),
            }),
        })
    }

    /// Installs the global hook. The thread lives for the rest of the
    /// process; a hook failure (missing permissions, no display) is
    /// reported once and leaves the rest of the daemon running.
    pub fn spawn(self: &Arc<InputListener>) -> Result<JoinHandle<()>> {
        let listener = Arc::clone(self);
        std::thread::Builder::new()
            .name("input-listener".to_string())
            .spawn(move || {
                info!("installing global input hook");
                if let Err(e) = rdev::listen(move |event| listener.dispatch(event)) {
                    error!("global input hook failed: {e:?}");
                }
            })
            .context("spawn input listener thread")
    }

    fn dispatch(&self, event: rdev::Event) {
        match event.event_type {
            EventType::KeyPress(key) => self.on_key_press(key, event.name.as_deref()),
            EventType::KeyRelease(key) => self.on_key_release(key),
            EventType::ButtonPress(button) => self.on_button_press(button),
            EventType::ButtonRelease(button) => self.on_button_release(button),
            EventType::Wheel { delta_y, .. } => self.aggregator.record_scroll(delta_y),
            EventType::MouseMove { x, y } => self.aggregator.record_cursor_move(x, y),
        }
    }

    fn on_key_press(&self, key: rdev::Key, typed: Option<&str>) {
        let Some(identity) = keymap::identity_for_key_press(key, typed) else {
            if let Some(text) = typed {
                trace!(key = ?key, text = %keymap::readable_text(text), "untracked key");
            }
            return;
        };
        let mut state = self.state.lock();
        state.down.insert(key, identity.clone());
        state.pairing.press(identity, None);
    }

    fn on_key_release(&self, key: rdev::Key) {
        let completed = {
            let mut state = self.state.lock();
            let identity = state
                .down
                .remove(&key)
                .or_else(|| keymap::identity_for_key(key));
            identity.and_then(|id| state.pairing.release(&id, None))
        };
        if let Some(completed) = completed {
            self.aggregator.record_completed_key(completed);
        }
    }

    fn on_button_press(&self, button: rdev::Button) {
        let Some(identity) = keymap::identity_for_button(button) else {
            return;
        };
        let origin = self.aggregator.last_position();
        self.state.lock().pairing.press(identity, origin);
    }

    fn on_button_release(&self, button: rdev::Button) {
        let Some(identity) = keymap::identity_for_button(button) else {
            return;
        };
        let release_position = self.aggregator.last_position();
        let completed = self.state.lock().pairing.release(&identity, release_position);
        if let Some(completed) = completed {
            self.aggregator.record_completed_click(completed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::Store;
    use chrono::{Duration as ChronoDuration, Local};
    use rdev::{Button, Key};
    use tempfile::TempDir;

    fn synthetic(event_type: EventType, name: Option<&str>) -> rdev::Event {
        rdev::Event {
            time: std::time::SystemTime::now(),
            name: name.map(str::to_string),
            event_type,
        }
    }

    fn open_listener() -> (TempDir, Arc<Aggregator>, Arc<InputListener>) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("input.db")).unwrap();
        let aggregator = Arc::new(Aggregator::new(store));
        let listener = InputListener::new(Arc::clone(&aggregator));
        (dir, aggregator, listener)
    }

    fn count(agg: &Aggregator, name: &str) -> u64 {
        agg.store().checkpoint().unwrap();
        agg.store()
            .total_count(&InputIdentity::tracked(name).unwrap())
            .unwrap()
    }

    #[test]
    fn key_press_release_cycle_records_one_event() {
        let (_dir, agg, listener) = open_listener();
        listener.dispatch(synthetic(EventType::KeyPress(Key::KeyA), Some("a")));
        listener.dispatch(synthetic(EventType::KeyRelease(Key::KeyA), None));

        assert_eq!(count(&agg, "a"), 1);
        assert!(agg.store().longest_duration(&InputIdentity::tracked("a").unwrap()).unwrap() >= 0.0);
    }

    #[test]
    fn shifted_press_releases_under_the_typed_identity() {
        let (_dir, agg, listener) = open_listener();
        // Shift+1 reports "!" at press time; the release is a bare Num1.
        listener.dispatch(synthetic(EventType::KeyPress(Key::Num1), Some("!")));
        listener.dispatch(synthetic(EventType::KeyRelease(Key::Num1), None));

        assert_eq!(count(&agg, "!"), 1);
        assert_eq!(count(&agg, "1"), 0);
    }

    #[test]
    fn auto_repeat_presses_yield_a_single_completion() {
        let (_dir, agg, listener) = open_listener();
        for _ in 0..5 {
            listener.dispatch(synthetic(EventType::KeyPress(Key::KeyZ), Some("z")));
        }
        listener.dispatch(synthetic(EventType::KeyRelease(Key::KeyZ), None));
        listener.dispatch(synthetic(EventType::KeyRelease(Key::KeyZ), None));

        assert_eq!(count(&agg, "z"), 1);
    }

    #[test]
    fn untracked_keys_are_ignored_end_to_end() {
        let (_dir, agg, listener) = open_listener();
        listener.dispatch(synthetic(EventType::KeyPress(Key::F5), None));
        listener.dispatch(synthetic(EventType::KeyRelease(Key::F5), None));

        agg.store().checkpoint().unwrap();
        let day = ChronoDuration::days(1);
        let events = agg
            .store()
            .events_between(Local::now() - day, Local::now() + day, &[])
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn click_captures_press_origin_and_release_position() {
        let (_dir, agg, listener) = open_listener();
        listener.dispatch(synthetic(EventType::MouseMove { x: 10.0, y: 20.0 }, None));
        listener.dispatch(synthetic(EventType::ButtonPress(Button::Left), None));
        listener.dispatch(synthetic(EventType::MouseMove { x: 30.0, y: 40.0 }, None));
        listener.dispatch(synthetic(EventType::ButtonRelease(Button::Left), None));

        assert_eq!(count(&agg, "mouseleft"), 1);
        let day = ChronoDuration::days(1);
        let events = agg
            .store()
            .events_between(Local::now() - day, Local::now() + day, &[])
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].position_x, events[0].position_y), (Some(10), Some(20)));
        assert_eq!((events[1].position_x, events[1].position_y), (Some(30), Some(40)));
    }

    #[test]
    fn wheel_events_feed_scroll_counters() {
        let (_dir, agg, listener) = open_listener();
        listener.dispatch(synthetic(EventType::Wheel { delta_x: 0, delta_y: 1 }, None));
        listener.dispatch(synthetic(EventType::Wheel { delta_x: 0, delta_y: -3 }, None));

        assert_eq!(count(&agg, "scrollup"), 1);
        assert_eq!(count(&agg, "scrolldown"), 1);
    }
}
