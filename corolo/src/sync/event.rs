use futures::task::AtomicWaker;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::task::{Context, Poll};

/// Head value of a set event. Never a valid allocation.
///
/// Also stored in a node's `next` once `set` has consumed the node.
const SET: *mut Waiter = ptr::without_provenance_mut(1);

/// Dropped waits tolerated on the stack before a registration prunes them.
const PRUNE_AFTER: usize = 64;

/// A broadcast, multi-waiter flag.
///
/// Awaiting an unset event suspends the awaiting body. [`Event::set`] resumes
/// every body suspended on the event so far, on the thread calling `set`, and
/// lets any later awaiter through without suspending until
/// [`Event::reset`] is called.
///
/// The event is lock-free. Its state is a single atomic word that holds one
/// of:
///
/// - null: unset, nobody waiting,
/// - a sentinel: set,
/// - anything else: unset, pointer to the most recently registered waiter of
///   an intrusive stack.
///
/// Waiters are resumed most recently registered first.
///
/// Dropping a pending [`Wait`] leaves its node behind on the stack. Once
/// enough of them pile up, the next registration unlinks them, so an event
/// that is rarely set does not grow without bound.
///
/// # Examples
///
/// ```
/// use corolo::{Event, Task};
/// use std::sync::Arc;
///
/// let event = Arc::new(Event::new());
/// let task = Task::new({
///     let event = event.clone();
///     async move { event.wait().await }
/// });
///
/// assert!(task.resume());
/// event.set();
/// assert!(task.is_done());
/// ```
pub struct Event {
    head: AtomicPtr<Waiter>,

    // Approximate count of dropped waits still linked.
    disarmed: AtomicUsize,

    // At most one pruning pass at a time. Never waited on.
    pruning: AtomicBool,
}

struct Waiter {
    waker: AtomicWaker,
    notified: AtomicBool,

    // Written while the node is unpublished or owned by a pruning pass, read
    // once the list is taken. `set` swaps in `SET` when it consumes the node.
    next: AtomicPtr<Waiter>,
}

impl Waiter {
    fn new() -> Self {
        Self {
            waker: AtomicWaker::new(),
            notified: AtomicBool::new(false),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn notify(&self) {
        self.notified.store(true, Ordering::Release);
        self.waker.wake();
    }

    fn is_notified(&self) -> bool {
        self.notified.load(Ordering::Acquire)
    }
}

/// Takes over a list of nodes and notifies each of them. Returns how many
/// were notified.
///
/// # Safety
///
/// The caller must own the list: every node in it carries a reference from
/// `Arc::into_raw` that nobody else will reclaim.
unsafe fn notify_all(mut next: *mut Waiter) -> usize {
    let mut woken = 0;

    while !next.is_null() && next != SET {
        // SAFETY: per the caller's contract.
        let waiter = unsafe { Arc::from_raw(next) };
        next = waiter.next.swap(SET, Ordering::AcqRel);

        waiter.notify();
        woken += 1;
    }

    woken
}

impl Event {
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            disarmed: AtomicUsize::new(0),
            pruning: AtomicBool::new(false),
        }
    }

    pub fn is_set(&self) -> bool {
        self.head.load(Ordering::Acquire) == SET
    }

    /// Sets the event and resumes every waiter registered so far. Does
    /// nothing if the event is already set.
    pub fn set(&self) {
        let head = self.head.swap(SET, Ordering::AcqRel);
        if head == SET {
            return;
        }

        // SAFETY: every non-sentinel pointer in the list came from
        // `Arc::into_raw` in `push`, and the swap made this call the sole
        // owner of the list.
        let woken = unsafe { notify_all(head) };
        self.disarmed.store(0, Ordering::Relaxed);

        tracing::trace!(woken, "event set");
    }

    /// Moves a set event back to unset. Does nothing if the event isn't set,
    /// in particular it never drops registered waiters.
    pub fn reset(&self) {
        if self
            .head
            .compare_exchange(SET, ptr::null_mut(), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            tracing::trace!("event reset");
        }
    }

    /// Returns a future that completes once the event is set.
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            event: self,
            waiter: None,
        }
    }

    /// Pushes `waiter` on the stack. Returns `false`, leaving the stack
    /// untouched, if the event got set in the meantime.
    fn push(&self, waiter: &Arc<Waiter>) -> bool {
        if self.disarmed.load(Ordering::Relaxed) >= PRUNE_AFTER {
            self.prune();
        }

        let node = Arc::into_raw(waiter.clone()).cast_mut();
        let mut head = self.head.load(Ordering::Acquire);

        loop {
            if head == SET {
                // SAFETY: `node` was never published.
                drop(unsafe { Arc::from_raw(node) });
                return false;
            }

            waiter.next.store(head, Ordering::Relaxed);

            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => head = actual,
            }
        }
    }

    /// Unlinks the nodes of dropped waits.
    ///
    /// The whole list is detached by swapping a marker node in as the head,
    /// the live nodes are relinked in their original order, and the result is
    /// put back in place of the marker. If `set` consumed the marker in the
    /// meantime, the live nodes were registered before that `set` and are
    /// notified here instead.
    fn prune(&self) {
        if self.pruning.swap(true, Ordering::Acquire) {
            return;
        }
        let _unlock = Unlock(&self.pruning);

        let marker = Arc::new(Waiter::new());
        let marker_node = Arc::into_raw(marker.clone()).cast_mut();

        let mut head = self.head.load(Ordering::Acquire);
        let detached = loop {
            if head.is_null() || head == SET {
                // SAFETY: `marker_node` was never published.
                drop(unsafe { Arc::from_raw(marker_node) });
                return;
            }

            match self.head.compare_exchange_weak(
                head,
                marker_node,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break head,
                Err(actual) => head = actual,
            }
        };

        let mut live: *mut Waiter = ptr::null_mut();
        let mut tail: *mut Waiter = ptr::null_mut();
        let mut removed = 0_usize;

        let mut next = detached;
        while !next.is_null() {
            // SAFETY: the exchange above made this call the sole owner of the
            // detached list.
            let waiter = unsafe { Arc::from_raw(next) };
            next = waiter.next.load(Ordering::Relaxed);

            // Only the list holds it: its `Wait` is gone.
            if Arc::strong_count(&waiter) == 1 {
                removed += 1;
                continue;
            }

            waiter.next.store(ptr::null_mut(), Ordering::Relaxed);
            let node = Arc::into_raw(waiter).cast_mut();
            if tail.is_null() {
                live = node;
            } else {
                // SAFETY: `tail` is a live node of the list we own.
                unsafe { (*tail).next.store(node, Ordering::Relaxed) };
            }
            tail = node;
        }

        if self
            .head
            .compare_exchange(marker_node, live, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // SAFETY: the exchange unlinked the marker, its list reference is
            // ours again.
            drop(unsafe { Arc::from_raw(marker_node) });
        } else if marker
            .next
            .compare_exchange(ptr::null_mut(), live, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // SAFETY: `set` consumed the marker without seeing `live`, so the
            // list is still ours.
            unsafe { notify_all(live) };
        }

        // Waits dropped during the pass are caught by the next one.
        self.disarmed.store(0, Ordering::Relaxed);
        tracing::trace!(removed, "event pruned");
    }

    #[cfg(test)]
    fn stack_len(&self) -> usize {
        let mut len = 0;
        let mut next = self.head.load(Ordering::Acquire);

        while !next.is_null() && next != SET {
            len += 1;
            // SAFETY: test-only, nothing sets or prunes concurrently.
            next = unsafe { (*next).next.load(Ordering::Acquire) };
        }

        len
    }
}

/// Releases the pruning flag, also when a waker panics mid-pass.
struct Unlock<'a>(&'a AtomicBool);

impl Drop for Unlock<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        let mut next = *self.head.get_mut();
        if next == SET {
            return;
        }

        // Only disarmed nodes can remain: a live waiter borrows the event.
        while !next.is_null() {
            // SAFETY: see `set`; `&mut self` gives exclusive access.
            let waiter = unsafe { Arc::from_raw(next) };
            next = waiter.next.load(Ordering::Relaxed);
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("is_set", &self.is_set())
            .finish()
    }
}

impl<'a> IntoFuture for &'a Event {
    type Output = ();
    type IntoFuture = Wait<'a>;

    fn into_future(self) -> Wait<'a> {
        self.wait()
    }
}

/// Future returned by [`Event::wait`].
///
/// Dropping it before the event fires disarms its registration, `set` then
/// wakes nobody on its behalf.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Wait<'a> {
    event: &'a Event,
    waiter: Option<Arc<Waiter>>,
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        let Some(waiter) = &this.waiter else {
            if this.event.is_set() {
                return Poll::Ready(());
            }

            let waiter = Arc::new(Waiter::new());
            waiter.waker.register(cx.waker());

            if !this.event.push(&waiter) {
                return Poll::Ready(());
            }

            this.waiter = Some(waiter);
            return Poll::Pending;
        };

        if waiter.is_notified() {
            return Poll::Ready(());
        }

        waiter.waker.register(cx.waker());

        // `set` may have run between the check and the registration.
        if waiter.is_notified() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for Wait<'_> {
    fn drop(&mut self) {
        if let Some(waiter) = &self.waiter {
            drop(waiter.waker.take());

            if !waiter.is_notified() {
                self.event.disarmed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl fmt::Debug for Wait<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("event", self.event)
            .field("registered", &self.waiter.is_some())
            .finish()
    }
}
