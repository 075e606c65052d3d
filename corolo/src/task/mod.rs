//! Suspended computations and their continuations.
//!
//! A [`Task`] owns a heap-allocated frame running an `async` body. Tasks are
//! lazily started, can be resumed by hand, awaited from other task bodies, or
//! scheduled on a [`Loop`](crate::runtime::Loop).

mod core;

mod error;
pub use self::error::{Failure, TaskError};

pub(crate) mod frame;

pub mod id;
pub use self::id::{Id, id, try_id};

mod join;
pub use self::join::Join;

mod state;

#[allow(clippy::module_inception)]
mod task;
pub use self::task::Task;

pub(crate) mod trace;
pub use self::trace::{Backtrace, BacktraceFrame, backtrace, dump_backtrace};

mod waker;
