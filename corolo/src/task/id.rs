use crate::context;
use std::sync::atomic::{AtomicU64, Ordering};

use std::{fmt, num::NonZeroU64};

/// An opaque ID that uniquely identifies a schedulable unit (a task or a
/// [`Callback`]) relative to all other units created by this process.
///
/// # Notes
///
/// - IDs are handed out from a single monotonically increasing counter, so
///   a unit created later always has a greater ID.
/// - The ID of the currently running task can be obtained from inside the
///   task via the [`task::try_id()`](crate::task::try_id()) and
///   [`task::id()`](crate::task::id()) functions and from outside the task via
///   [`Task::id()`](crate::task::Task::id()).
///
/// [`Callback`]: crate::runtime::Callback
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(pub(crate) NonZeroU64);

/// Returns the [`Id`] of the currently running task.
///
/// # Panics
///
/// This function panics if called from outside a task body. For a version of
/// this function that doesn't panic, see [`task::try_id()`](crate::task::try_id()).
#[track_caller]
pub fn id() -> Id {
    context::current_task_id().expect("Can't get a task id when not inside a task")
}

/// Returns the [`Id`] of the currently running task, or `None` if called
/// outside of a task body.
pub fn try_id() -> Option<Id> {
    context::current_task_id()
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Id {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Even at a billion units per second this takes centuries to wrap.
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }

    /// Get a unique tracing Id to be used with the tracing library.
    pub fn as_tracing_id(&self) -> tracing::Id {
        tracing::Id::from_non_zero_u64(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use std::collections::HashSet;

    #[test]
    fn test_new_task_id_unique() {
        let n = 13;
        let mut all_ids = HashSet::with_capacity(n);

        for _ in 1..=n {
            let task = Task::new(async { 42 });
            all_ids.insert(task.id());
        }

        assert_eq!(all_ids.len(), n);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let first = Id::next();
        let second = Id::next();
        assert!(second > first);
        assert_eq!(second.as_tracing_id().into_u64(), second.as_u64());
    }

    #[test]
    fn test_try_id_outside_task_is_none() {
        assert!(try_id().is_none());
    }

    #[test]
    fn test_id_inside_task_matches_handle() {
        let task = Task::new(async { id() });
        task.resume();
        assert_eq!(task.result().ok(), Some(task.id()));
    }
}
