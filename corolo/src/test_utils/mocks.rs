use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{RawWaker, RawWakerVTable, Waker};

#[derive(Debug, Default)]
pub(crate) struct WakerData {
    pub wake_count: AtomicUsize,
}

impl WakerData {
    pub(crate) fn get_count(&self) -> usize {
        self.wake_count.load(Ordering::SeqCst)
    }
}

unsafe fn mock_wake(data: *const ()) {
    // Need to consume 1 Arc reference
    let data = unsafe { Arc::<WakerData>::from_raw(data.cast()) };
    data.wake_count.fetch_add(1, Ordering::SeqCst);
}

unsafe fn mock_wake_by_ref(data: *const ()) {
    // Not consuming any Arc ref
    let data = ManuallyDrop::new(unsafe { Arc::<WakerData>::from_raw(data.cast()) });
    data.wake_count.fetch_add(1, Ordering::SeqCst);
}

// Drop the Waker Arc reference.
unsafe fn mock_drop(data: *const ()) {
    if !data.is_null() {
        drop(unsafe { Arc::<WakerData>::from_raw(data.cast()) });
    }
}

unsafe fn mock_clone(data: *const ()) -> RawWaker {
    unsafe { Arc::<WakerData>::increment_strong_count(data.cast()) };
    RawWaker::new(data, &MOCK_VTABLE)
}

static MOCK_VTABLE: RawWakerVTable =
    RawWakerVTable::new(mock_clone, mock_wake, mock_wake_by_ref, mock_drop);

// Mocking where the Waker will increment the atomic everytime it is woken up.
// Calling Arc::into_raw *does not decrement the reference count*, so we need to
// ensure we call `Arc::from_raw` on all these leaked ptrs.
pub(crate) fn mock_waker() -> (Waker, Arc<WakerData>) {
    let data = Arc::new(WakerData::default());
    let raw_data = Arc::into_raw(Arc::clone(&data));

    let raw_waker = RawWaker::new(raw_data as *const (), &MOCK_VTABLE);

    unsafe { (Waker::from_raw(raw_waker), data) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_raw_waker() {
        let (waker1, waker_data) = mock_waker();
        waker1.wake_by_ref();
        assert_eq!(waker_data.get_count(), 1);

        let waker2 = waker1.clone();
        waker2.wake();
        assert_eq!(waker_data.get_count(), 2);

        drop(waker1);
        assert_eq!(waker_data.get_count(), 2);
        assert_eq!(Arc::strong_count(&waker_data), 1);
    }
}
