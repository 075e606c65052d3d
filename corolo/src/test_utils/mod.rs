use parking_lot::Mutex;
use std::sync::Arc;

// Exports
pub(crate) mod mocks;
pub(crate) use mocks::mock_waker;

/// Ordered record of what happened, shared between a test and the bodies it
/// drives.
#[derive(Debug)]
pub(crate) struct Journal<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Journal<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Clone> Journal<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn push(&self, entry: T) {
        self.entries.lock().push(entry);
    }

    pub(crate) fn snapshot(&self) -> Vec<T> {
        self.entries.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
