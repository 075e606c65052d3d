use crate::context;
use crate::task::Id;
use parking_lot::Mutex;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Provenance of a task frame, shared between the task and whoever is
/// resuming it.
#[derive(Debug)]
pub(crate) struct FrameInfo {
    id: Id,
    location: &'static Location<'static>,

    // Set while another frame is suspended awaiting this one.
    awaiter: Mutex<Option<Arc<FrameInfo>>>,

    // The `.await` this frame is suspended on, if it awaits a task.
    suspended_at: Mutex<Option<&'static Location<'static>>>,
}

impl FrameInfo {
    pub(crate) fn new(id: Id, location: &'static Location<'static>) -> Self {
        Self {
            id,
            location,
            awaiter: Mutex::new(None),
            suspended_at: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    pub(crate) fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub(crate) fn set_awaiter(&self, awaiter: Option<Arc<FrameInfo>>) {
        *self.awaiter.lock() = awaiter;
    }

    fn awaiter(&self) -> Option<Arc<FrameInfo>> {
        self.awaiter.lock().clone()
    }

    pub(crate) fn set_suspended_at(&self, at: Option<&'static Location<'static>>) {
        *self.suspended_at.lock() = at;
    }

    fn suspended_at(&self) -> Option<&'static Location<'static>> {
        *self.suspended_at.lock()
    }
}

/// One entry of a [`Backtrace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktraceFrame {
    id: Id,
    location: &'static Location<'static>,
    suspended_at: Option<&'static Location<'static>>,
}

impl BacktraceFrame {
    /// Id of the task owning this frame.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Where the task was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// The `.await` of another task this frame is suspended on. `None` for
    /// the innermost frame, which is the one running.
    pub fn suspended_at(&self) -> Option<&'static Location<'static>> {
        self.suspended_at
    }
}

/// A logical call stack of tasks, innermost first.
///
/// The chain follows awaiters: when task `a` awaits task `b` which awaits task
/// `c`, a backtrace captured from inside `c` reads `c, b, a`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backtrace {
    frames: Vec<BacktraceFrame>,
}

impl Backtrace {
    pub(crate) fn walk(innermost: Option<Arc<FrameInfo>>) -> Self {
        let mut frames = Vec::new();
        let mut next = innermost;

        while let Some(info) = next {
            frames.push(BacktraceFrame {
                id: info.id(),
                location: info.location(),
                suspended_at: info.suspended_at(),
            });
            next = info.awaiter();
        }

        Self { frames }
    }

    pub fn frames(&self) -> &[BacktraceFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

impl fmt::Display for Backtrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, frame) in self.frames.iter().enumerate() {
            write!(f, "[{}] task {} at {}", depth, frame.id, frame.location)?;
            if let Some(at) = frame.suspended_at {
                write!(f, ", suspended at {}", at)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Captures the chain of tasks leading to the one currently running on this
/// thread. Empty when called outside a task body.
pub fn backtrace() -> Backtrace {
    Backtrace::walk(context::current_frame())
}

/// Emits [`backtrace()`] through `tracing` at debug level, one event per
/// frame.
pub fn dump_backtrace() {
    for (depth, frame) in backtrace().frames().iter().enumerate() {
        tracing::debug!(
            depth,
            task.id = frame.id.as_u64(),
            location = %frame.location,
            suspended_at = frame.suspended_at.map(tracing::field::display),
            "backtrace"
        );
    }
}
