use std::any::Any;

/// Makes a `Send` value `Sync` by never handing out shared references to it.
///
/// The only exception is [`SyncWrapper::downcast_ref_sync`], which can only
/// produce references to types that are `Sync` themselves.
pub(crate) struct SyncWrapper<T> {
    value: T,
}

// SAFETY: `&SyncWrapper<T>` gives no access to `T` except through
// `downcast_ref_sync`, bounded on `Sync`.
unsafe impl<T: Send> Sync for SyncWrapper<T> {}

impl<T> SyncWrapper<T> {
    pub(crate) fn new(value: T) -> Self {
        Self { value }
    }

    pub(crate) fn into_inner(self) -> T {
        self.value
    }
}

impl SyncWrapper<Box<dyn Any + Send>> {
    pub(crate) fn downcast_ref_sync<T: Any + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}
