use crate::context;
use crate::task::Task;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::Location;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by awaiting a [`Task`].
///
/// The first poll registers the awaiting body's waker as the task's
/// continuation and hands the task to this thread's trampoline. Inside a
/// running task the awaiting body suspends and the outermost resume runs the
/// awaited task next, so a chain of nested awaits is driven iteratively
/// instead of one native frame per level. Outside of any resume the task runs
/// right away, and a task that already completed never suspends the awaiting
/// body.
///
/// A failure stored in the awaited task is re-raised in the awaiting body, so
/// it propagates up a chain of awaits the same way a panic propagates up a
/// call stack.
///
/// Dropping a `Join` drops the task it owns.
///
/// ```
/// use corolo::Task;
///
/// let inner = Task::new(async { 20 });
/// let outer = Task::new(async move { inner.await + 1 });
///
/// outer.resume();
/// assert_eq!(outer.result().unwrap(), 21);
/// ```
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Join<R> {
    task: Task<R>,
    entered: bool,
    awaited_at: &'static Location<'static>,
}

impl<R: Send + 'static> IntoFuture for Task<R> {
    type Output = R;
    type IntoFuture = Join<R>;

    #[track_caller]
    fn into_future(self) -> Join<R> {
        Join {
            task: self,
            entered: false,
            awaited_at: Location::caller(),
        }
    }
}

impl<R: Send + 'static> Future for Join<R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        let this = self.get_mut();
        let core = this.task.core();

        if !this.entered {
            this.entered = true;

            if !core.is_complete() {
                let awaiter = context::current_frame();
                if let Some(awaiter) = &awaiter {
                    awaiter.set_suspended_at(Some(this.awaited_at));
                }

                core.info().set_awaiter(awaiter);
                context::schedule(core.clone());
            }
        }

        let output = match core.poll_output(cx.waker()) {
            Poll::Ready(output) => output,
            Poll::Pending => return Poll::Pending,
        };

        if let Some(awaiter) = context::current_frame() {
            awaiter.set_suspended_at(None);
        }

        match output {
            Ok(output) => Poll::Ready(output),
            Err(failure) => failure.resume(),
        }
    }
}

impl<R> fmt::Debug for Join<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Join")
            .field("task", &self.task)
            .field("entered", &self.entered)
            .field("awaited_at", &self.awaited_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::sync::Event;
    use crate::task::{Task, TaskError};
    use crate::test_utils::{Journal, mock_waker};
    use std::future::{Future, IntoFuture};
    use std::pin::pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    #[test]
    fn test_await_completed_task_does_not_suspend() -> anyhow::Result<()> {
        let inner = Task::new(async { "ready" });
        assert!(!inner.resume());

        let outer = Task::new(async move { inner.await.len() });
        assert!(!outer.resume());
        assert_eq!(outer.result()?, 5);
        Ok(())
    }

    #[test]
    fn test_failure_propagates_through_await() {
        let inner = Task::<u32>::new(async { panic!("inner boom") });
        let outer = Task::new(async move { inner.await * 2 });

        outer.resume();
        match outer.result() {
            Err(TaskError::Failed(failure)) => assert_eq!(failure.message(), Some("inner boom")),
            other => panic!("expected failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_continuation_resumed_on_completion() -> anyhow::Result<()> {
        let event = Arc::new(Event::new());

        let inner = Task::new({
            let event = event.clone();
            async move {
                event.wait().await;
                10
            }
        });
        let outer = Task::new(async move { inner.await + 1 });

        assert!(outer.resume());
        assert!(!outer.is_done());

        // Completing `inner` resumes `outer` through the recorded continuation.
        event.set();
        assert!(outer.is_done());
        assert_eq!(outer.result()?, 11);
        Ok(())
    }

    #[test]
    fn test_repoll_with_new_waker_replaces_continuation() {
        let event = Arc::new(Event::new());
        let task = Task::new({
            let event = event.clone();
            async move { event.wait().await }
        });

        let mut join = pin!(task.into_future());

        let (first, first_data) = mock_waker();
        let (second, second_data) = mock_waker();

        assert!(join.as_mut().poll(&mut Context::from_waker(&first)).is_pending());
        assert!(join.as_mut().poll(&mut Context::from_waker(&second)).is_pending());

        event.set();
        assert_eq!(first_data.get_count(), 0);
        assert_eq!(second_data.get_count(), 1);
        assert_eq!(join.poll(&mut Context::from_waker(&second)), Poll::Ready(()));
    }

    fn chain(depth: u64) -> Task<u64> {
        Task::new(async move {
            if depth == 0 {
                0
            } else {
                1 + chain(depth - 1).await
            }
        })
    }

    #[test]
    fn test_deep_await_chain_runs_on_a_flat_stack() -> anyhow::Result<()> {
        const DEPTH: u64 = 100_000;

        // Far too small for one native frame per await level.
        let worker = std::thread::Builder::new()
            .stack_size(2 << 20)
            .spawn(|| {
                let task = chain(DEPTH);
                assert!(!task.resume());
                task.result()
            })?;

        let reached = worker.join().expect("chain thread")?;
        assert_eq!(reached, DEPTH);
        Ok(())
    }

    #[test]
    fn test_await_inside_task_defers_to_trampoline() -> anyhow::Result<()> {
        let journal = Journal::new();

        let inner = Task::new({
            let journal = journal.clone();
            async move { journal.push("inner") }
        });
        let outer = Task::new({
            let journal = journal.clone();
            async move {
                journal.push("outer");
                inner.await;
                journal.push("outer resumed");
            }
        });

        assert!(!outer.resume());
        assert_eq!(journal.snapshot(), vec!["outer", "inner", "outer resumed"]);
        outer.result()?;
        Ok(())
    }
}
