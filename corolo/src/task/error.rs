use crate::utils::SyncWrapper;
use std::any::Any;
use std::fmt;
use std::panic;

/// A failure raised inside a computation body.
///
/// Failures are captured where they happen and stored until somebody observes
/// the result. The original panic payload is preserved, so a failure can be
/// re-raised with [`Failure::resume`] and still be recognised by whoever
/// eventually catches it.
pub struct Failure {
    payload: SyncWrapper<Box<dyn Any + Send + 'static>>,
}

impl Failure {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self {
            payload: SyncWrapper::new(payload),
        }
    }

    pub(crate) fn msg(msg: impl Into<String>) -> Self {
        Self::from_panic(Box::new(msg.into()))
    }

    /// The panic message, if the payload was a string.
    pub fn message(&self) -> Option<&str> {
        if let Some(s) = self.payload.downcast_ref_sync::<String>() {
            return Some(s);
        }

        self.payload.downcast_ref_sync::<&'static str>().copied()
    }

    /// Consumes the failure, returning the original panic payload.
    pub fn into_panic(self) -> Box<dyn Any + Send + 'static> {
        self.payload.into_inner()
    }

    /// Re-raises the failure on the current thread.
    pub fn resume(self) -> ! {
        panic::resume_unwind(self.into_panic())
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => f.debug_tuple("Failure").field(&msg).finish(),
            None => f.debug_tuple("Failure").field(&"<non-string payload>").finish(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message().unwrap_or("body panicked"))
    }
}

impl std::error::Error for Failure {}

/// Reasons why [`Task::result`](crate::task::Task::result) can't hand out a
/// value.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    /// The result was observed before the task completed. This is a
    /// scheduling bug in the caller.
    #[error("task result observed before the task completed")]
    NotReady,

    /// The value was already moved out by an earlier observation.
    #[error("task result was already consumed")]
    Consumed,

    /// The body failed; the failure is handed out exactly once.
    #[error("task body failed: {0}")]
    Failed(#[from] Failure),
}

impl TaskError {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskError::Failed(_))
    }

    /// Consumes the error, returning the failure if there is one.
    pub fn into_failure(self) -> Option<Failure> {
        match self {
            TaskError::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn panic_payload_as_str(payload: &Box<dyn Any + Send>) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<String>() {
        return Some(s);
    }

    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return Some(s);
    }

    None
}
