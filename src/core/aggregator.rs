use chrono::Local;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::store::{Store, METERS_PER_PIXEL};
use crate::models::{CompletedInput, InputIdentity};

/// Turns capture-layer facts into store writes.
///
/// Completed pairs and scroll ticks pass straight through; cursor moves are
/// deduplicated against the last recorded position, and travel distance is
/// the straight-line pixel distance between consecutive samples converted
/// to meters. The aggregator never blocks on the database: every write is
/// an enqueue onto the store worker.
pub struct Aggregator {
    store: Store,
    last_position: Mutex<Option<(i64, i64)>>,
}

impl Aggregator {
    pub fn new(store: Store) -> Aggregator {
        Aggregator {
            store,
            last_position: Mutex::new(None),
        }
    }

    pub fn record_completed_key(&self, input: CompletedInput) {
        debug!(identity = %input.identity, duration = input.duration, "key completed");
        self.store.record_completed_key(input);
    }

    pub fn record_completed_click(&self, input: CompletedInput) {
        debug!(identity = %input.identity, duration = input.duration, "click completed");
        self.store.record_completed_click(input);
    }

    /// Vertical scroll ticks bump the direction counter; a zero delta (some
    /// platforms emit one for horizontal-only wheel motion) is ignored.
    pub fn record_scroll(&self, delta_y: i64) {
        let identity = if delta_y > 0 {
            InputIdentity::scroll_up()
        } else if delta_y < 0 {
            InputIdentity::scroll_down()
        } else {
            return;
        };
        self.store.record_scroll(identity);
    }

    /// Records a cursor position sample. Coordinates are rounded to whole
    /// pixels; a move that rounds to the last recorded position is dropped,
    /// so hover jitter below one pixel adds neither samples nor distance.
    pub fn record_cursor_move(&self, x: f64, y: f64) {
        let position = (x.round() as i64, y.round() as i64);

        let previous = {
            let mut last = self.last_position.lock();
            if *last == Some(position) {
                return;
            }
            last.replace(position)
        };

        let distance_m = match previous {
            Some((px, py)) => {
                let dx = (position.0 - px) as f64;
                let dy = (position.1 - py) as f64;
                (dx * dx + dy * dy).sqrt() * METERS_PER_PIXEL
            }
            // First sample after startup has no travel to attribute.
            None => 0.0,
        };

        self.store
            .record_cursor_sample(Local::now(), position.0, position.1, distance_m);
    }

    pub fn last_position(&self) -> Option<(i64, i64)> {
        *self.last_position.lock()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_aggregator() -> (TempDir, Aggregator) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("input.db")).unwrap();
        (dir, Aggregator::new(store))
    }

    #[test]
    fn first_move_records_sample_with_zero_distance() {
        let (_dir, agg) = open_aggregator();
        agg.record_cursor_move(100.4, 200.6);
        agg.store.checkpoint().unwrap();

        assert_eq!(agg.last_position(), Some((100, 201)));
        assert_eq!(agg.store.mouse_distance_meters().unwrap(), 0.0);
        assert_eq!(
            agg.store.total_count(&InputIdentity::mouse_position()).unwrap(),
            1
        );
    }

    #[test]
    fn duplicate_position_is_dropped() {
        let (_dir, agg) = open_aggregator();
        agg.record_cursor_move(50.0, 50.0);
        agg.record_cursor_move(50.2, 49.9); // rounds to (50, 50)
        agg.record_cursor_move(50.0, 50.0);
        agg.store.checkpoint().unwrap();

        assert_eq!(
            agg.store.total_count(&InputIdentity::mouse_position()).unwrap(),
            1
        );
    }

    #[test]
    fn distance_is_euclidean_between_consecutive_samples() {
        let (_dir, agg) = open_aggregator();
        agg.record_cursor_move(0.0, 0.0);
        agg.record_cursor_move(3.0, 4.0);
        agg.record_cursor_move(3.0, 16.0);
        agg.store.checkpoint().unwrap();

        let expected = (5.0 + 12.0) * METERS_PER_PIXEL;
        let distance = agg.store.mouse_distance_meters().unwrap();
        assert!((distance - expected).abs() < 1e-12);
    }

    #[test]
    fn scroll_direction_maps_to_counters() {
        let (_dir, agg) = open_aggregator();
        agg.record_scroll(1);
        agg.record_scroll(2);
        agg.record_scroll(-1);
        agg.record_scroll(0);
        agg.store.checkpoint().unwrap();

        assert_eq!(agg.store.total_count(&InputIdentity::scroll_up()).unwrap(), 2);
        assert_eq!(agg.store.total_count(&InputIdentity::scroll_down()).unwrap(), 1);
    }
}
