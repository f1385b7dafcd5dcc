pub mod core;
pub mod models;

pub use crate::core::aggregator::Aggregator;
pub use crate::core::config::Config;
pub use crate::core::listener::InputListener;
pub use crate::core::single_instance::InstanceGuard;
pub use crate::core::store::{Store, TimeBucket};
pub use crate::models::{CompletedInput, EventKind, InputIdentity, PositionSample, RawEvent, Session};
