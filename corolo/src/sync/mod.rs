//! Synchronization primitives usable across threads.

mod event;
pub use self::event::{Event, Wait};
