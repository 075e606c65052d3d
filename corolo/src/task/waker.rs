use crate::context::{self, Resume};
use crate::task::core::Core;
use std::sync::Arc;
use std::task::Wake;

// Waking a task hands it to this thread's trampoline. If the task is already
// being resumed somewhere, `poll_frame` leaves a NOTIFIED note instead.
impl<R: Send + 'static> Wake for Core<R> {
    fn wake(self: Arc<Self>) {
        context::schedule(self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        context::schedule(self.clone());
    }
}

impl<R: Send + 'static> Resume for Core<R> {
    fn resume(self: Arc<Self>) {
        self.poll_frame();
    }
}

#[cfg(test)]
mod tests {
    use crate::task::Task;
    use std::future::poll_fn;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Poll;

    #[test]
    fn test_self_wake_is_requeued_not_nested() {
        let polls = Arc::new(AtomicUsize::new(0));

        let task = Task::new({
            let polls = polls.clone();
            async move {
                poll_fn(|cx| {
                    if polls.fetch_add(1, Ordering::SeqCst) < 3 {
                        cx.waker().wake_by_ref();
                        Poll::Pending
                    } else {
                        Poll::Ready(())
                    }
                })
                .await
            }
        });

        // The trampoline keeps resuming until the body stops waking itself.
        assert!(!task.resume());
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_wake_from_other_thread() -> anyhow::Result<()> {
        let parked = Arc::new(parking_lot::Mutex::new(None));

        let task = Task::new({
            let parked = parked.clone();
            async move {
                let mut first = true;
                poll_fn(|cx| {
                    if std::mem::take(&mut first) {
                        *parked.lock() = Some(cx.waker().clone());
                        Poll::Pending
                    } else {
                        Poll::Ready("woken")
                    }
                })
                .await
            }
        });

        assert!(task.resume());

        let waker = parked.lock().take().expect("waker parked");
        std::thread::spawn(move || waker.wake()).join().expect("waker thread");

        assert!(task.is_done());
        assert_eq!(task.result()?, "woken");
        Ok(())
    }
}
