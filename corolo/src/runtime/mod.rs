//! Single-threaded scheduling of ready and delayed work.

use crate::task::{Backtrace, Id, Task};
use std::fmt;
use std::future::Future;

// Public API
pub mod builder;
pub use builder::{Builder, IdleStrategy};

pub mod local;
pub use local::Loop;

// Re-exports
pub(crate) use builder::LoopConfig;

/// A unit of work a [`Loop`] can run.
///
/// The loop borrows handles, it never owns them: a handle must outlive every
/// loop it is queued on.
pub trait Schedulable {
    /// Stable identity, unique across tasks and callbacks.
    fn id(&self) -> Id;

    /// Entry point invoked by the loop each time the handle is dequeued.
    fn run(&self);

    /// Logical call stack of the handle, if it has one.
    fn backtrace(&self) -> Option<Backtrace> {
        None
    }
}

/// Running a task resumes it.
impl<R: Send + 'static> Schedulable for Task<R> {
    fn id(&self) -> Id {
        Task::id(self)
    }

    fn run(&self) {
        self.resume();
    }

    fn backtrace(&self) -> Option<Backtrace> {
        Some(Task::backtrace(self))
    }
}

/// Wraps a plain function as a [`Schedulable`] handle.
///
/// ```
/// use corolo::runtime::{Builder, Callback};
/// use std::cell::Cell;
///
/// let hits = Cell::new(0);
/// let cb = Callback::new(|| hits.set(hits.get() + 1));
///
/// let lp = Builder::new().build();
/// lp.call(&cb);
/// lp.call(&cb);
/// lp.run_until_complete();
///
/// assert_eq!(hits.get(), 2);
/// ```
pub struct Callback<F> {
    id: Id,
    f: F,
}

impl<F: Fn()> Callback<F> {
    pub fn new(f: F) -> Self {
        Self { id: Id::next(), f }
    }
}

impl<F: Fn()> Schedulable for Callback<F> {
    fn id(&self) -> Id {
        self.id
    }

    fn run(&self) {
        (self.f)()
    }
}

impl<F> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("id", &self.id).finish()
    }
}

/// Runs `fut` to completion on a fresh [`Loop`] with the default
/// configuration and returns its output.
///
/// A panic inside `fut` is re-raised on the calling thread.
///
/// ```
/// let answer = corolo::block_on(async { 6 * 7 });
/// assert_eq!(answer, 42);
/// ```
#[track_caller]
pub fn block_on<F>(fut: F) -> F::Output
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Builder::new().block_on(fut)
}
