use crate::context::{self, FrameGuard};
use crate::task::frame::TaskFrame;
use crate::task::state::{State, TransitionToAbandoned, TransitionToIdle, TransitionToRunning};
use crate::task::trace::FrameInfo;
use crate::task::{Failure, Id, TaskError};
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::future::Future;
use std::mem;
use std::panic::Location;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Where the task's result is in its life.
enum Stage<R> {
    Pending,
    Finished(Result<R, Failure>),
    Consumed,
}

/// Result slot and continuation, guarded together so registering a
/// continuation can't race with completion.
struct Completion<R> {
    stage: Stage<R>,
    continuation: Option<Waker>,
}

/// Shared heart of a task. The [`Task`](crate::task::Task) handle owns one
/// reference, every outstanding waker owns another.
pub(crate) struct Core<R> {
    state: State,

    // Only touched by the holder of the RUNNING bit.
    frame: UnsafeCell<Option<TaskFrame<R>>>,

    completion: Mutex<Completion<R>>,

    info: Arc<FrameInfo>,
}

// SAFETY: `frame` is accessed exclusively by whoever holds RUNNING, and the
// state machine grants RUNNING to one thread at a time with acquire/release
// ordering. The remaining fields are atomics or behind a lock.
unsafe impl<R: Send> Sync for Core<R> {}

impl<R> Core<R> {
    pub(crate) fn id(&self) -> Id {
        self.info.id()
    }

    pub(crate) fn info(&self) -> &Arc<FrameInfo> {
        &self.info
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state.load().is_complete()
    }

    /// Called when the owning handle goes away. Drops the frame right away if
    /// nobody is resuming it, otherwise leaves it to the resumer.
    pub(crate) fn abandon(&self) {
        match self.state.transition_to_abandoned() {
            TransitionToAbandoned::Acquired => {
                // SAFETY: the transition handed us RUNNING.
                unsafe { self.drop_frame() };
                self.finish_abandoned();
            }
            TransitionToAbandoned::Deferred | TransitionToAbandoned::Finished => {}
        }
    }

    /// Moves the result out, leaving `Consumed` behind.
    pub(crate) fn take_output(&self) -> Result<R, TaskError> {
        let mut completion = self.completion.lock();

        match mem::replace(&mut completion.stage, Stage::Consumed) {
            Stage::Finished(Ok(output)) => Ok(output),
            Stage::Finished(Err(failure)) => Err(TaskError::Failed(failure)),
            Stage::Consumed => Err(TaskError::Consumed),
            Stage::Pending => {
                completion.stage = Stage::Pending;
                Err(TaskError::NotReady)
            }
        }
    }

    /// Takes the result if there is one, otherwise records `waker` as the
    /// continuation to wake on completion.
    pub(crate) fn poll_output(&self, waker: &Waker) -> Poll<Result<R, Failure>> {
        let mut completion = self.completion.lock();

        match mem::replace(&mut completion.stage, Stage::Consumed) {
            Stage::Finished(output) => Poll::Ready(output),
            Stage::Consumed => panic!("task output polled after it was consumed"),
            Stage::Pending => {
                completion.stage = Stage::Pending;

                match &completion.continuation {
                    Some(registered) if registered.will_wake(waker) => {}
                    _ => completion.continuation = Some(waker.clone()),
                }

                Poll::Pending
            }
        }
    }

    /// # Safety
    ///
    /// The caller must hold RUNNING.
    unsafe fn drop_frame(&self) {
        // Take it out first: the body's destructors may run arbitrary code.
        let frame = unsafe { (*self.frame.get()).take() };
        drop(frame);
    }

    fn finish_abandoned(&self) {
        self.state.transition_to_complete();
        self.info.set_awaiter(None);
        tracing::trace!(task.id = self.id().as_u64(), "abandoned");
    }
}

impl<R: Send + 'static> Core<R> {
    pub(crate) fn new<F>(body: F, location: &'static Location<'static>) -> Arc<Self>
    where
        F: Future<Output = R> + Send + 'static,
    {
        Arc::new(Self {
            state: State::new(),
            frame: UnsafeCell::new(Some(TaskFrame::new_task(body))),
            completion: Mutex::new(Completion {
                stage: Stage::Pending,
                continuation: None,
            }),
            info: Arc::new(FrameInfo::new(Id::next(), location)),
        })
    }

    /// Resumes the frame as a trampoline driver: continuations handed off
    /// while it runs are resumed before this returns.
    pub(crate) fn run(self: &Arc<Self>) {
        context::drive(|| self.poll_frame());
    }

    /// Polls the frame until it suspends or completes. A no-op when somebody
    /// else is resuming it (they are told to poll again) or when it finished.
    pub(crate) fn poll_frame(self: &Arc<Self>) {
        match self.state.transition_to_running() {
            TransitionToRunning::Success => {}
            TransitionToRunning::Busy | TransitionToRunning::Finished => return,
        }

        let _guard = FrameGuard::enter(self.info.clone());
        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        loop {
            tracing::trace!(task.id = self.id().as_u64(), "resume");

            // SAFETY: we hold RUNNING.
            let poll = match unsafe { (*self.frame.get()).as_mut() } {
                Some(frame) => frame.resume(&mut cx),
                None => unreachable!("task frame missing while RUNNING"),
            };

            match poll {
                Poll::Ready(output) => {
                    // SAFETY: we hold RUNNING.
                    unsafe { self.drop_frame() };
                    self.complete(output);
                    return;
                }
                Poll::Pending => match self.state.transition_to_idle() {
                    TransitionToIdle::Ok => return,
                    TransitionToIdle::OkNotified => continue,
                    TransitionToIdle::Abandoned => {
                        // SAFETY: RUNNING is kept on abandonment.
                        unsafe { self.drop_frame() };
                        self.finish_abandoned();
                        return;
                    }
                },
            }
        }
    }

    fn complete(&self, output: Result<R, Failure>) {
        let failed = output.is_err();

        let continuation = {
            let mut completion = self.completion.lock();
            completion.stage = Stage::Finished(output);
            completion.continuation.take()
        };

        self.state.transition_to_complete();
        self.info.set_awaiter(None);
        tracing::trace!(task.id = self.id().as_u64(), failed, "complete");

        if let Some(continuation) = continuation {
            continuation.wake();
        }
    }
}
