pub mod event;
pub mod identity;

pub use event::{CompletedInput, EventKind, PositionSample, RawEvent, Session};
pub use identity::InputIdentity;
