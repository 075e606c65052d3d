use crate::task::Failure;
use std::fmt;
use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Resumable execution state of a computation body.
///
/// A frame is heap allocated once and pinned for its whole life, it can only
/// change owner by moving the box. Dropping it tears the body down
/// synchronously, running destructors of everything held across await points.
pub(crate) struct Frame<B: ?Sized> {
    body: Pin<Box<B>>,
}

/// Frame of a task body: may be resumed from any thread, one at a time.
pub(crate) type TaskFrame<R> = Frame<dyn Future<Output = R> + Send + 'static>;

/// Frame of a generator body: never leaves the thread that created it.
pub(crate) type LocalFrame = Frame<dyn Future<Output = ()> + 'static>;

impl<R> TaskFrame<R> {
    pub(crate) fn new_task<F>(body: F) -> Self
    where
        F: Future<Output = R> + Send + 'static,
    {
        Self { body: Box::pin(body) }
    }
}

impl LocalFrame {
    pub(crate) fn new_local<F>(body: F) -> Self
    where
        F: Future<Output = ()> + 'static,
    {
        Self { body: Box::pin(body) }
    }
}

impl<B: Future + ?Sized> Frame<B> {
    /// Advances the body to its next suspension point or to completion.
    ///
    /// A panic escaping the body is captured and returned as a [`Failure`]; it
    /// never unwinds into the resumer.
    pub(crate) fn resume(&mut self, cx: &mut Context<'_>) -> Poll<Result<B::Output, Failure>> {
        let body = self.body.as_mut();

        match panic::catch_unwind(panic::AssertUnwindSafe(move || body.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Err(payload) => Poll::Ready(Err(Failure::from_panic(payload))),
        }
    }
}

impl<B: ?Sized> fmt::Debug for Frame<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").finish_non_exhaustive()
    }
}
