use crate::task::core::Core;
use crate::task::trace::Backtrace;
use crate::task::{Id, TaskError};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::Location;
use std::sync::Arc;

/// A suspended computation with a single eventual result.
///
/// A task is created in a deferred-start state: [`Task::new`] only allocates
/// the frame, the body does not run until somebody drives it. A task can be
/// driven by:
///
/// - calling [`Task::resume`] directly,
/// - awaiting it from another task body (see [`Join`](crate::task::Join)),
/// - handing it to a [`Loop`](crate::runtime::Loop).
///
/// On completion, the task resumes whoever awaited it. Continuations are
/// handed off through a per-thread trampoline, so a long chain of nested
/// awaits completing at once does not grow the native stack.
///
/// A panic inside the body is captured and surfaced through
/// [`Task::result`], or re-raised in the awaiting body.
///
/// Dropping a task that has not completed drops its frame without resuming
/// it again.
///
/// # Examples
///
/// ```
/// use corolo::Task;
///
/// fn factorial(n: u64) -> Task<u64> {
///     Task::new(async move {
///         if n <= 1 { 1 } else { n * factorial(n - 1).await }
///     })
/// }
///
/// let task = factorial(5);
/// assert!(!task.resume());
/// assert_eq!(task.result().unwrap(), 120);
/// ```
pub struct Task<R> {
    core: Arc<Core<R>>,
}

impl<R: Send + 'static> Task<R> {
    /// Wraps `body` in a task without running it.
    #[track_caller]
    pub fn new<F>(body: F) -> Self
    where
        F: Future<Output = R> + Send + 'static,
    {
        Self {
            core: Core::new(body, Location::caller()),
        }
    }

    /// Advances the body until it suspends or completes.
    ///
    /// Returns `true` while the task has not completed. Resuming a completed
    /// task is a no-op that returns `false`.
    pub fn resume(&self) -> bool {
        self.core.run();
        !self.is_done()
    }

    /// Moves the result out of a completed task.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotReady`] if the task hasn't completed yet.
    /// - [`TaskError::Failed`] if the body panicked. The failure is handed out
    ///   once.
    /// - [`TaskError::Consumed`] if the result was already taken.
    pub fn result(&self) -> Result<R, TaskError> {
        self.core.take_output()
    }

    /// Blocks the calling thread until the task completes and returns its
    /// output, re-raising a body failure.
    ///
    /// The task is resumed on the calling thread first. Calling this from
    /// inside a task body whose progress depends on the current thread
    /// deadlocks.
    pub fn wait(self) -> R {
        futures::executor::block_on(self.into_future())
    }
}

impl<R> Task<R> {
    /// Returns true once the body completed, failed, or was abandoned.
    pub fn is_done(&self) -> bool {
        self.core.is_complete()
    }

    /// Id of this task, the one [`task::id()`](crate::task::id()) returns
    /// inside its body.
    pub fn id(&self) -> Id {
        self.core.id()
    }

    /// The chain of tasks currently awaiting this one, starting with this
    /// task.
    pub fn backtrace(&self) -> Backtrace {
        Backtrace::walk(Some(self.core.info().clone()))
    }

    pub(crate) fn core(&self) -> &Arc<Core<R>> {
        &self.core
    }
}

impl<R> Drop for Task<R> {
    fn drop(&mut self) {
        self.core.abandon();
    }
}

impl<R> fmt::Debug for Task<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Event;
    use std::future::pending;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn factorial(n: u64) -> Task<u64> {
        Task::new(async move {
            if n <= 1 {
                1
            } else {
                n * factorial(n - 1).await
            }
        })
    }

    #[test]
    fn test_factorial_chain_from_one_resume() -> anyhow::Result<()> {
        let task = factorial(5);
        assert!(!task.is_done());

        assert!(!task.resume());
        assert!(task.is_done());
        assert_eq!(task.result()?, 120);
        Ok(())
    }

    #[test]
    fn test_creation_is_lazy() {
        let ran = Arc::new(AtomicBool::new(false));
        let task = Task::new({
            let ran = ran.clone();
            async move { ran.store(true, Ordering::SeqCst) }
        });

        assert!(!ran.load(Ordering::SeqCst));
        assert!(matches!(task.result(), Err(TaskError::NotReady)));

        task.resume();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_result_consumed_once() -> anyhow::Result<()> {
        let task = Task::new(async { String::from("hello") });
        task.resume();

        assert_eq!(task.result()?, "hello");
        assert!(matches!(task.result(), Err(TaskError::Consumed)));
        Ok(())
    }

    #[test]
    fn test_failure_is_captured_and_surfaced_once() {
        let task = Task::<u32>::new(async { panic!("boom") });

        assert!(!task.resume());
        assert!(task.is_done());

        let failure = task
            .result()
            .expect_err("body panicked")
            .into_failure()
            .expect("stored failure");
        assert_eq!(failure.message(), Some("boom"));
        assert!(matches!(task.result(), Err(TaskError::Consumed)));
    }

    #[test]
    fn test_resume_after_completion_is_noop() {
        let polls = Arc::new(AtomicUsize::new(0));
        let task = Task::new({
            let polls = polls.clone();
            async move {
                polls.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(!task.resume());
        assert!(!task.resume());
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_suspended_task_drops_frame() {
        struct Flag(Arc<AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Flag(dropped.clone());
        let task = Task::new(async move {
            let _flag = flag;
            pending::<()>().await;
        });

        assert!(task.resume());
        assert!(!dropped.load(Ordering::SeqCst));

        drop(task);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_task_is_never_resumed() {
        let event = Arc::new(Event::new());
        let resumed = Arc::new(AtomicBool::new(false));

        let task = Task::new({
            let event = event.clone();
            let resumed = resumed.clone();
            async move {
                event.wait().await;
                resumed.store(true, Ordering::SeqCst);
            }
        });

        assert!(task.resume());
        drop(task);

        event.set();
        assert!(!resumed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_drives_to_completion() {
        let event = Arc::new(Event::new());
        let task = Task::new({
            let event = event.clone();
            async move {
                event.wait().await;
                "done"
            }
        });

        let setter = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            event.set();
        });

        assert_eq!(task.wait(), "done");
        setter.join().expect("setter thread");
    }

    #[test]
    fn test_wait_reraises_failure() {
        let task = Task::<()>::new(async { panic!("waited boom") });

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.wait()));
        let payload = caught.expect_err("failure re-raised");
        assert_eq!(
            crate::task::error::panic_payload_as_str(&payload),
            Some("waited boom")
        );
    }

    #[test]
    fn test_cross_thread_event_resumes_task() -> anyhow::Result<()> {
        let event = Arc::new(Event::new());
        let task = Task::new({
            let event = event.clone();
            async move {
                event.wait().await;
                std::thread::current().id()
            }
        });

        assert!(task.resume());

        let setter = std::thread::spawn(move || {
            event.set();
            std::thread::current().id()
        });
        let setter_id = setter.join().expect("setter thread");

        // Resumed on the thread that fired the event.
        assert!(task.is_done());
        assert_eq!(task.result()?, setter_id);
        Ok(())
    }
}
