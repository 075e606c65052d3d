//! Pull-based lazy sequences.
//!
//! A [`Generator`] wraps a single-threaded `async` body that produces values
//! with [`Co::yield_value`]. The body only runs when the consumer pulls the
//! next value, and runs exactly until its next yield.

use crate::context;
use crate::task::Failure;
use crate::task::frame::LocalFrame;
use futures::task::noop_waker_ref;
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

type Slot<T> = Rc<Cell<Option<T>>>;

/// A lazy sequence of `T` produced by a suspended body.
///
/// The most recently produced value is borrowed through [`current`] until the
/// next pull, which requires `&mut self`, so a stale value can never be
/// observed. Once exhausted a generator stays exhausted.
///
/// [`current`]: Generator::current
///
/// # Examples
///
/// ```
/// use corolo::Generator;
///
/// let counter = Generator::new(|co| async move {
///     let mut n = 0;
///     loop {
///         co.yield_value(n).await;
///         n += 1;
///     }
/// });
///
/// let firsts: Vec<u32> = counter.take(3).collect();
/// assert_eq!(firsts, [0, 1, 2]);
/// ```
pub struct Generator<T> {
    frame: Option<LocalFrame>,
    slot: Slot<T>,
    current: Option<T>,
}

/// Handle given to a generator body to produce values.
pub struct Co<T> {
    slot: Slot<T>,
}

impl<T> Co<T> {
    /// Hands `value` to the consumer and suspends the body until the next
    /// pull.
    pub fn yield_value(&self, value: T) -> Yield<'_, T> {
        Yield {
            co: self,
            value: Some(value),
        }
    }
}

impl<T> fmt::Debug for Co<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Co").finish_non_exhaustive()
    }
}

/// Future returned by [`Co::yield_value`].
#[must_use = "a value is only yielded when the future is awaited"]
pub struct Yield<'a, T> {
    co: &'a Co<T>,
    value: Option<T>,
}

// `value` is never pinned.
impl<T> Unpin for Yield<'_, T> {}

impl<T> Future for Yield<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        match this.value.take() {
            Some(value) => {
                this.co.slot.set(Some(value));
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

impl<T: 'static> Generator<T> {
    /// Creates a generator without running any of `body`.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Co<T>) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let slot: Slot<T> = Rc::new(Cell::new(None));
        let co = Co { slot: slot.clone() };

        Self {
            frame: Some(LocalFrame::new_local(body(co))),
            slot,
            current: None,
        }
    }
}

impl<T> Generator<T> {
    /// Runs the body up to its first yield. Equivalent to [`advance`] on a
    /// fresh generator.
    ///
    /// [`advance`]: Generator::advance
    pub fn begin(&mut self) -> Result<bool, Failure> {
        self.advance()
    }

    /// Resumes the body until it yields the next value or finishes.
    ///
    /// Returns `Ok(true)` when a new value is available through
    /// [`current`](Generator::current), and `Ok(false)` once the sequence is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns the failure if the body panicked, or if it suspended on
    /// anything other than a yield. Either way the sequence ends there.
    pub fn advance(&mut self) -> Result<bool, Failure> {
        self.current = None;

        let Some(frame) = self.frame.as_mut() else {
            return Ok(false);
        };

        // Tasks awaited by the body run to completion inside this pull.
        let mut cx = Context::from_waker(noop_waker_ref());
        match context::drive_nested(|| frame.resume(&mut cx)) {
            Poll::Pending => {
                if let Some(value) = self.slot.take() {
                    self.current = Some(value);
                    return Ok(true);
                }

                self.frame = None;
                Err(Failure::msg(
                    "generator body suspended without yielding a value",
                ))
            }
            Poll::Ready(result) => {
                self.frame = None;
                result.map(|()| false)
            }
        }
    }

    /// The value produced by the last successful pull.
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Pulls the next value and moves it out.
    pub fn try_next(&mut self) -> Result<Option<T>, Failure> {
        if self.advance()? {
            Ok(self.current.take())
        } else {
            Ok(None)
        }
    }

    /// Returns true once the body finished or failed. No more values will be
    /// produced.
    pub fn is_done(&self) -> bool {
        self.frame.is_none()
    }
}

/// Yields owned values. A body failure is re-raised as a panic on the
/// consumer's thread; use [`Generator::try_next`] to observe it instead.
impl<T> Iterator for Generator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self.try_next() {
            Ok(next) => next,
            Err(failure) => failure.resume(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Generator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("current", &self.current)
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use static_assertions::assert_not_impl_any;

    assert_not_impl_any!(Generator<u8>: Send, Sync);

    #[test]
    fn test_single_yield() -> anyhow::Result<()> {
        let mut hello = Generator::new(|co| async move {
            co.yield_value("Hello").await;
        });

        assert!(hello.begin()?);
        assert_eq!(hello.current(), Some(&"Hello"));

        assert!(!hello.advance()?);
        assert_eq!(hello.current(), None);
        assert!(hello.is_done());
        Ok(())
    }

    #[test]
    fn test_infinite_sequence_stops_with_consumer() -> anyhow::Result<()> {
        let resumes = Rc::new(Cell::new(0));

        let mut counter = Generator::new({
            let resumes = resumes.clone();
            |co| async move {
                let mut n = 0_u32;
                loop {
                    resumes.set(resumes.get() + 1);
                    co.yield_value(n).await;
                    n += 1;
                }
            }
        });

        let mut seen = Vec::new();
        while let Some(n) = counter.try_next()? {
            if n > 5 {
                break;
            }
            seen.push(n);
        }

        assert_eq!(seen, (0..=5).collect::<Vec<_>>());
        // The body ran exactly far enough to produce 6.
        assert_eq!(resumes.get(), 7);
        Ok(())
    }

    #[test]
    fn test_empty_body() -> anyhow::Result<()> {
        let mut empty = Generator::<u8>::new(|_co| async {});

        assert!(!empty.begin()?);
        assert!(empty.current().is_none());
        Ok(())
    }

    #[test]
    fn test_failure_before_first_yield() {
        let mut broken = Generator::<u8>::new(|_co| async { panic!("no values for you") });

        let failure = broken.begin().expect_err("body panicked");
        assert_eq!(failure.message(), Some("no values for you"));
        assert!(matches!(broken.advance(), Ok(false)));
    }

    #[test]
    fn test_failure_after_yield() -> anyhow::Result<()> {
        let mut flaky = Generator::new(|co| async move {
            co.yield_value(1).await;
            panic!("second value failed");
        });

        assert_eq!(flaky.try_next()?, Some(1));

        let failure = flaky.try_next().expect_err("body panicked");
        assert_eq!(failure.message(), Some("second value failed"));
        Ok(())
    }

    #[test]
    fn test_not_restartable() -> anyhow::Result<()> {
        let mut once = Generator::new(|co| async move {
            co.yield_value('x').await;
        });

        assert_eq!(once.by_ref().collect::<String>(), "x");
        assert!(!once.begin()?);
        assert!(!once.advance()?);
        Ok(())
    }

    #[test]
    fn test_foreign_suspension_is_failure() {
        let mut stuck = Generator::<u8>::new(|_co| std::future::pending());

        let failure = stuck.begin().expect_err("suspended without yielding");
        assert!(failure.message().is_some_and(|m| m.contains("without yielding")));
        assert!(stuck.is_done());
    }

    #[test]
    fn test_iterator_reraises_failure() {
        let broken = Generator::<u8>::new(|_co| async { panic!("iter boom") });

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            broken.collect::<Vec<_>>()
        }));
        assert!(caught.is_err());
    }

    #[test]
    fn test_body_awaits_task_while_a_task_runs() {
        // Pulled from inside a running resume, where awaited tasks would
        // otherwise wait for the outer trampoline.
        let squares = context::drive(|| {
            Generator::new(|co| async move {
                for n in 1..=3_u64 {
                    let square = Task::new(async move { n * n }).await;
                    co.yield_value(square).await;
                }
            })
            .collect::<Vec<_>>()
        });

        assert_eq!(squares, [1, 4, 9]);
    }
}
