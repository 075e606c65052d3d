use bitflags::bitflags;
use std::sync::atomic::{AtomicUsize, Ordering};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct Snapshot: usize {
        /// A resumer holds exclusive access to the frame.
        const RUNNING = 1;

        /// Woken while RUNNING; the resumer must poll the frame again before
        /// going idle.
        const NOTIFIED = 1 << 1;

        /// The frame finished (value, failure or abandonment). Terminal.
        const COMPLETE = 1 << 2;

        /// The owning `Task` was dropped before completion.
        const ABANDONED = 1 << 3;

        /// The frame has been resumed at least once.
        const STARTED = 1 << 4;
    }
}

impl Snapshot {
    pub(crate) fn is_running(self) -> bool {
        self.contains(Snapshot::RUNNING)
    }

    pub(crate) fn is_notified(self) -> bool {
        self.contains(Snapshot::NOTIFIED)
    }

    pub(crate) fn is_complete(self) -> bool {
        self.contains(Snapshot::COMPLETE)
    }

    pub(crate) fn is_abandoned(self) -> bool {
        self.contains(Snapshot::ABANDONED)
    }

    pub(crate) fn is_started(self) -> bool {
        self.contains(Snapshot::STARTED)
    }
}

/// Lifecycle of a task frame packed in a single atomic word.
///
/// Only the holder of the RUNNING bit may touch the frame. Every transition is
/// a single read-modify-write on this word, so a wake racing with a resumer on
/// another thread either acquires RUNNING itself or leaves NOTIFIED behind for
/// the resumer to observe before it goes idle.
#[derive(Debug)]
pub(crate) struct State {
    val: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionToRunning {
    /// The caller now owns the frame.
    Success,

    /// Someone else is resuming the frame; a NOTIFIED note was left for them.
    Busy,

    /// The frame is complete or abandoned, nothing to resume.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionToIdle {
    /// RUNNING was released.
    Ok,

    /// A wake arrived during the poll. RUNNING is kept and the caller must
    /// poll again.
    OkNotified,

    /// The owner dropped the task during the poll. RUNNING is kept and the
    /// caller must drop the frame and complete.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionToAbandoned {
    /// The caller holds RUNNING and must drop the frame, then complete.
    Acquired,

    /// A resumer is active and will drop the frame when it goes idle.
    Deferred,

    /// Already complete, the frame is gone.
    Finished,
}

impl State {
    pub(crate) fn new() -> Self {
        Self {
            val: AtomicUsize::new(0),
        }
    }

    pub(crate) fn load(&self) -> Snapshot {
        Snapshot::from_bits_retain(self.val.load(Ordering::Acquire))
    }

    pub(crate) fn transition_to_running(&self) -> TransitionToRunning {
        let res = self.fetch_update(|curr| {
            if curr.is_complete() || curr.is_abandoned() {
                return None;
            }

            if curr.is_running() {
                Some(curr | Snapshot::NOTIFIED)
            } else {
                Some((curr | Snapshot::RUNNING | Snapshot::STARTED) - Snapshot::NOTIFIED)
            }
        });

        match res {
            Ok(prev) if prev.is_running() => TransitionToRunning::Busy,
            Ok(_) => TransitionToRunning::Success,
            Err(_) => TransitionToRunning::Finished,
        }
    }

    pub(crate) fn transition_to_idle(&self) -> TransitionToIdle {
        let res = self.fetch_update(|curr| {
            debug_assert!(curr.is_running(), "transition_to_idle without RUNNING");

            if curr.is_abandoned() {
                None
            } else if curr.is_notified() {
                Some(curr - Snapshot::NOTIFIED)
            } else {
                Some(curr - Snapshot::RUNNING)
            }
        });

        match res {
            Ok(prev) if prev.is_notified() => TransitionToIdle::OkNotified,
            Ok(_) => TransitionToIdle::Ok,
            Err(_) => TransitionToIdle::Abandoned,
        }
    }

    /// Releases RUNNING and marks the frame terminal. Returns the previous
    /// snapshot.
    pub(crate) fn transition_to_complete(&self) -> Snapshot {
        let prev = self.fetch_update(|curr| {
            debug_assert!(curr.is_running(), "transition_to_complete without RUNNING");
            Some((curr - Snapshot::RUNNING - Snapshot::NOTIFIED) | Snapshot::COMPLETE)
        });

        match prev {
            Ok(prev) | Err(prev) => prev,
        }
    }

    pub(crate) fn transition_to_abandoned(&self) -> TransitionToAbandoned {
        let res = self.fetch_update(|curr| {
            if curr.is_complete() {
                return None;
            }

            if curr.is_running() {
                Some(curr | Snapshot::ABANDONED)
            } else {
                Some(curr | Snapshot::ABANDONED | Snapshot::RUNNING)
            }
        });

        match res {
            Ok(prev) if prev.is_running() => TransitionToAbandoned::Deferred,
            Ok(_) => TransitionToAbandoned::Acquired,
            Err(_) => TransitionToAbandoned::Finished,
        }
    }

    fn fetch_update<F>(&self, mut f: F) -> Result<Snapshot, Snapshot>
    where
        F: FnMut(Snapshot) -> Option<Snapshot>,
    {
        self.val
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |curr| {
                f(Snapshot::from_bits_retain(curr)).map(|next| next.bits())
            })
            .map(Snapshot::from_bits_retain)
            .map_err(Snapshot::from_bits_retain)
    }
}
