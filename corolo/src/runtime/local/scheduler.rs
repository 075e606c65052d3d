use crate::runtime::{IdleStrategy, LoopConfig, Schedulable};
use crate::utils::scheduler::{Call, Method};
#[cfg(test)]
use crate::utils::scheduler::Tracker;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// A single-threaded scheduler of borrowed [`Schedulable`] handles.
///
/// The loop keeps a FIFO ready queue and a heap of delayed handles ordered by
/// wake time. One tick ([`Loop::run_once`]):
///
/// 1. moves every delayed handle that is due to the back of the ready queue,
///    earliest first,
/// 2. runs each handle that was in the ready queue when the tick started,
///    exactly once. Handles queued while the tick runs wait for the next one.
///
/// Handles are borrowed for `'a`, so the borrow checker makes sure nothing
/// queued is freed while the loop may still run it. Every method takes
/// `&self`, a running handle can queue more work (itself included) on the loop
/// it runs on.
///
/// ```
/// use corolo::runtime::{Builder, Callback};
/// use std::cell::RefCell;
/// use std::time::Duration;
///
/// let order = RefCell::new(Vec::new());
/// let later = Callback::new(|| order.borrow_mut().push("later"));
/// let now = Callback::new(|| order.borrow_mut().push("now"));
///
/// let lp = Builder::new().build();
/// lp.call_after(Duration::from_millis(5), &later);
/// lp.call(&now);
/// lp.run_until_complete();
///
/// assert_eq!(*order.borrow(), ["now", "later"]);
/// ```
pub struct Loop<'a> {
    cfg: LoopConfig,

    /// Loop clock origin. Deadlines are offsets from it.
    started: Instant,

    ready: RefCell<VecDeque<&'a dyn Schedulable>>,

    delayed: RefCell<BinaryHeap<Delayed<'a>>>,

    /// Insertion counter, breaks deadline ties in FIFO order.
    seq: Cell<u64>,

    ticks: Cell<u64>,

    #[cfg(test)]
    pub(crate) tracker: Tracker,
}

struct Delayed<'a> {
    when: Duration,
    seq: u64,
    handle: &'a dyn Schedulable,
}

impl PartialEq for Delayed<'_> {
    fn eq(&self, other: &Self) -> bool {
        (self.when, self.seq) == (other.when, other.seq)
    }
}

impl Eq for Delayed<'_> {}

impl PartialOrd for Delayed<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed: `BinaryHeap` is a max-heap and the earliest deadline must surface
// first.
impl Ord for Delayed<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<'a> Loop<'a> {
    pub(crate) fn new(cfg: LoopConfig) -> Self {
        Self {
            cfg,
            started: Instant::now(),
            ready: RefCell::new(VecDeque::new()),
            delayed: RefCell::new(BinaryHeap::new()),
            seq: Cell::new(0),
            ticks: Cell::new(0),

            #[cfg(test)]
            tracker: Tracker::new(),
        }
    }

    /// Time elapsed since the loop was created.
    pub fn now(&self) -> Duration {
        self.started.elapsed()
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }

    /// Returns true when nothing is queued, ready or delayed.
    pub fn is_idle(&self) -> bool {
        self.ready.borrow().is_empty() && self.delayed.borrow().is_empty()
    }

    /// Queues `handle` at the back of the ready queue.
    pub fn call(&self, handle: &'a dyn Schedulable) {
        self.track(Method::Call, Call::Call { id: handle.id() });
        self.ready.borrow_mut().push_back(handle);
    }

    /// Queues `handle` to become ready once `delay` has elapsed. Handles with
    /// the same wake time become ready in the order they were queued. A delay
    /// too large to represent never elapses.
    pub fn call_after(&self, delay: Duration, handle: &'a dyn Schedulable) {
        self.track(
            Method::CallAfter,
            Call::CallAfter {
                id: handle.id(),
                delay,
            },
        );

        let seq = self.seq.get();
        self.seq.set(seq + 1);

        self.delayed.borrow_mut().push(Delayed {
            when: self.now().saturating_add(delay),
            seq,
            handle,
        });
    }

    /// Runs one tick. Returns the number of handles run.
    pub fn run_once(&self) -> usize {
        self.promote_due(self.now());

        let tick = self.ticks.get();
        self.ticks.set(tick + 1);

        let n = self.ready.borrow().len();
        for _ in 0..n {
            // The borrow is released before `run`, which may queue more work.
            let Some(handle) = self.ready.borrow_mut().pop_front() else {
                break;
            };

            self.track(
                Method::Run,
                Call::Run {
                    id: handle.id(),
                    tick,
                },
            );
            tracing::trace!(handle.id = handle.id().as_u64(), tick, "run");

            handle.run();
        }

        n
    }

    /// Ticks until no handle is ready or delayed.
    ///
    /// A handle that keeps queueing itself keeps the loop running.
    pub fn run_until_complete(&self) {
        tracing::debug!(idle = ?self.cfg.idle, "loop started");

        while !self.is_idle() {
            if self.run_once() == 0 {
                self.idle();
            }
        }

        tracing::debug!(ticks = self.ticks.get(), "loop finished");
    }

    fn promote_due(&self, now: Duration) {
        let mut delayed = self.delayed.borrow_mut();
        let mut ready = self.ready.borrow_mut();

        while delayed.peek().is_some_and(|next| next.when <= now) {
            if let Some(due) = delayed.pop() {
                ready.push_back(due.handle);
            }
        }
    }

    /// Waits for the earliest deadline, nothing being ready.
    fn idle(&self) {
        let Some(when) = self.delayed.borrow().peek().map(|next| next.when) else {
            return;
        };

        let now = self.now();
        if when <= now {
            return;
        }

        match self.cfg.idle {
            IdleStrategy::Sleep => thread::sleep(when - now),
            IdleStrategy::Spin => thread::yield_now(),
        }
    }

    // Introspection on every scheduling decision during testing. No-op
    // otherwise.
    #[allow(unused)]
    #[inline(always)]
    fn track(&self, method: Method, call: Call) {
        #[cfg(test)]
        self.tracker.record(method, call);
    }
}

impl fmt::Debug for Loop<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("cfg", &self.cfg)
            .field("ready", &self.ready.borrow().len())
            .field("delayed", &self.delayed.borrow().len())
            .field("ticks", &self.ticks.get())
            .finish()
    }
}
