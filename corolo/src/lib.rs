//! A minimal cooperative coroutine runtime.
//!
//! - [`Task`]: a lazily started computation with a single result, resumable
//!   by hand, awaitable from other tasks, or schedulable on a loop.
//! - [`Event`]: a lock-free broadcast flag that resumes every waiting body
//!   when set, from any thread.
//! - [`Loop`]: a single-threaded scheduler of ready and delayed handles.
//! - [`Generator`]: a lazy sequence produced by a suspended body.
//!
//! ```
//! use corolo::{Event, Task};
//! use std::sync::Arc;
//!
//! let event = Arc::new(Event::new());
//! let waiter = Task::new({
//!     let event = event.clone();
//!     async move {
//!         event.wait().await;
//!         "released"
//!     }
//! });
//!
//! assert!(waiter.resume());
//! event.set();
//! assert_eq!(waiter.result().unwrap(), "released");
//! ```

#[doc(inline)]
pub use corolo_macros::main;

#[doc(inline)]
pub use corolo_macros::test;

mod context;

pub mod generator;
pub use generator::Generator;

pub mod runtime;
pub use runtime::{Builder, Loop, block_on};

pub mod sync;
pub use sync::Event;

pub mod task;
pub use task::Task;

mod utils;

#[cfg(test)]
mod test_utils;
