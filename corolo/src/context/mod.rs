//! Per-thread runtime state.
//!
//! Two things live here: the frame that is currently being resumed on this
//! thread (for task ids and backtraces), and the trampoline that hands control
//! from a completing task to its continuation without growing the stack.
use crate::task::Id;
use crate::task::trace::FrameInfo;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::thread_local;

/// A unit of work the trampoline can resume.
pub(crate) trait Resume: Send + Sync + 'static {
    fn resume(self: Arc<Self>);
}

struct Context {
    /// Innermost frame being resumed on this thread.
    current: RefCell<Option<Arc<FrameInfo>>>,

    /// Continuations handed off while a resume is in progress.
    ready: RefCell<VecDeque<Arc<dyn Resume>>>,

    /// Some caller up the stack is responsible for draining `ready`.
    draining: Cell<bool>,
}

thread_local! {
    static CONTEXT: Context = const {
        Context {
            current: RefCell::new(None),
            ready: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
        }
    };
}

pub(crate) fn current_task_id() -> Option<Id> {
    current_frame().map(|info| info.id())
}

pub(crate) fn current_frame() -> Option<Arc<FrameInfo>> {
    CONTEXT
        .try_with(|ctx| ctx.current.borrow().clone())
        .ok()
        .flatten()
}

/// Marks `info` as the innermost running frame until dropped, then restores
/// whatever frame was running before (the awaiting parent, or nothing).
pub(crate) struct FrameGuard {
    parent: Option<Arc<FrameInfo>>,
}

impl FrameGuard {
    pub(crate) fn enter(info: Arc<FrameInfo>) -> Self {
        FrameGuard {
            parent: CONTEXT.with(|ctx| ctx.current.replace(Some(info))),
        }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let parent = self.parent.take();
        let _ = CONTEXT.try_with(|ctx| ctx.current.replace(parent));
    }
}

/// Hands `next` to the trampoline.
///
/// When a resume is already in progress on this thread, `next` is queued and
/// the outermost resumer runs it once the current frame returns. Otherwise
/// this call becomes the outermost resumer and drains the queue itself before
/// returning.
pub(crate) fn schedule(next: Arc<dyn Resume>) {
    let drain_here = CONTEXT.with(|ctx| {
        ctx.ready.borrow_mut().push_back(next);
        !ctx.draining.replace(true)
    });

    if drain_here {
        let _draining = Draining;
        drain_ready();
    }
}

/// Runs `f` as a driver of the trampoline: continuations handed off while `f`
/// runs are resumed, in order, before `drive` returns.
pub(crate) fn drive<T>(f: impl FnOnce() -> T) -> T {
    let outermost = CONTEXT.with(|ctx| !ctx.draining.replace(true));
    if !outermost {
        return f();
    }

    let _draining = Draining;
    let out = f();
    drain_ready();
    out
}

/// Like [`drive`], but with a trampoline of its own: work handed off while `f`
/// runs is drained before this returns, even when a resume is already in
/// progress further up the stack. The enclosing queue is put back afterwards.
pub(crate) fn drive_nested<T>(f: impl FnOnce() -> T) -> T {
    let _outer = CONTEXT.with(|ctx| Outer {
        ready: ctx.ready.take(),
        draining: ctx.draining.replace(false),
    });

    drive(f)
}

/// Queue and draining flag of the enclosing trampoline, restored on drop.
struct Outer {
    ready: VecDeque<Arc<dyn Resume>>,
    draining: bool,
}

impl Drop for Outer {
    fn drop(&mut self) {
        let ready = mem::take(&mut self.ready);
        let _ = CONTEXT.try_with(|ctx| {
            // Anything left over (after a panic) runs after the enclosing work.
            let leftover = ctx.ready.replace(ready);
            ctx.ready.borrow_mut().extend(leftover);
            ctx.draining.set(self.draining);
        });
    }
}

fn drain_ready() {
    while let Some(next) = CONTEXT.with(|ctx| ctx.ready.borrow_mut().pop_front()) {
        next.resume();
    }
}

/// Clears the draining flag, also when a waker panics mid-drain.
struct Draining;

impl Drop for Draining {
    fn drop(&mut self) {
        let _ = CONTEXT.try_with(|ctx| ctx.draining.set(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Journal;

    struct Step {
        name: &'static str,
        journal: Journal<&'static str>,
        then: Option<Arc<Step>>,
    }

    impl Resume for Step {
        fn resume(self: Arc<Self>) {
            self.journal.push(self.name);
            if let Some(next) = self.then.clone() {
                // Queued behind whatever is already pending.
                schedule(next);
            }
            self.journal.push("return");
        }
    }

    #[test]
    fn test_schedule_outside_driver_runs_inline() {
        let journal = Journal::new();
        let step = Arc::new(Step {
            name: "a",
            journal: journal.clone(),
            then: None,
        });

        schedule(step);
        assert_eq!(journal.snapshot(), vec!["a", "return"]);
    }

    #[test]
    fn test_chained_handoff_does_not_nest() {
        let journal = Journal::new();
        let last = Arc::new(Step {
            name: "b",
            journal: journal.clone(),
            then: None,
        });
        let first = Arc::new(Step {
            name: "a",
            journal: journal.clone(),
            then: Some(last),
        });

        schedule(first);

        // "b" only runs after "a" returned.
        assert_eq!(journal.snapshot(), vec!["a", "return", "b", "return"]);
    }

    #[test]
    fn test_drive_drains_before_returning() {
        let journal = Journal::new();
        let step = Arc::new(Step {
            name: "queued",
            journal: journal.clone(),
            then: None,
        });

        let out = drive(|| {
            schedule(step);
            journal.push("driver");
            42
        });

        assert_eq!(out, 42);
        assert_eq!(journal.snapshot(), vec!["driver", "queued", "return"]);
    }

    #[test]
    fn test_nested_drive_drains_its_own_work_only() {
        let journal = Journal::new();
        let step = |name| {
            Arc::new(Step {
                name,
                journal: journal.clone(),
                then: None,
            })
        };
        let (outer, inner) = (step("outer"), step("inner"));

        drive(|| {
            schedule(outer);
            drive_nested(|| {
                schedule(inner);
                journal.push("nested");
            });
            journal.push("driver");
        });

        assert_eq!(
            journal.snapshot(),
            vec!["nested", "inner", "return", "driver", "outer", "return"]
        );
    }
}
