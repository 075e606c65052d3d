use crate::runtime::Loop;
use crate::task::Task;
use std::future::Future;

/// What a [`Loop`] does when nothing is ready and the next delayed handle
/// isn't due yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdleStrategy {
    /// Put the thread to sleep until the earliest deadline.
    #[default]
    Sleep,

    /// Yield the thread to the OS scheduler and check again. Lower latency
    /// for very short delays, at the cost of a busy core.
    Spin,
}

/// Builds a [`Loop`] with custom configuration values.
///
/// ```
/// use corolo::runtime::{Builder, IdleStrategy};
///
/// let out = Builder::new()
///     .idle(IdleStrategy::Spin)
///     .block_on(async { "done" });
///
/// assert_eq!(out, "done");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    /// Idle behavior of the built loop.
    ///
    /// Defaults to [`IdleStrategy::Sleep`].
    idle: IdleStrategy,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn idle(&mut self, val: IdleStrategy) -> &mut Self {
        self.idle = val;
        self
    }

    /// Creates the configured [`Loop`].
    pub fn build<'a>(&self) -> Loop<'a> {
        Loop::new(self.into())
    }

    /// Wraps `fut` in a [`Task`], drives it on a loop built from this
    /// configuration and returns its output.
    ///
    /// If the task is still suspended once the loop ran out of work (it
    /// awaits something completed elsewhere, e.g. an event set by another
    /// thread), the calling thread blocks until it completes.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from `fut`.
    #[track_caller]
    pub fn block_on<F>(&self, fut: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let task = Task::new(fut);

        {
            let lp = self.build();
            lp.call(&task);
            lp.run_until_complete();
        }

        task.wait()
    }
}

/// Loop settings resolved from a [`Builder`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopConfig {
    pub(crate) idle: IdleStrategy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        (&Builder::default()).into()
    }
}

impl From<&Builder> for LoopConfig {
    fn from(builder: &Builder) -> Self {
        Self {
            idle: builder.idle,
        }
    }
}
