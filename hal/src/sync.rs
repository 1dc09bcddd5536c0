//! # Wait Primitives
//!
//! A caller blocked on a firmware reply sleeps on a [`Completion`]; the
//! interrupt path sets its own state flag and calls [`Completion::wake`].
//! The waiter re-checks the condition on every wake-up, so spurious and
//! duplicate wake-ups are harmless.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Sleep/wake primitive shared by a waiter and the interrupt path
pub trait Completion: Send + Sync {
    /// Wait until `done` returns true or `timeout` elapses
    ///
    /// Returns the final value of `done`. Never returns `false` before the
    /// full timeout has elapsed.
    fn wait_timeout(&self, timeout: Duration, done: &dyn Fn() -> bool) -> bool;

    /// Wake every waiter so it re-checks its condition
    fn wake(&self);
}

// =============================================================================
// SPIN COMPLETION
// =============================================================================

/// Busy-waiting completion for targets without a scheduler
#[derive(Debug)]
pub struct SpinCompletion<C: Clock> {
    clock: C,
    wakeups: AtomicU64,
}

impl<C: Clock> SpinCompletion<C> {
    /// Create a completion timed by `clock`
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            wakeups: AtomicU64::new(0),
        }
    }

    /// Number of wake calls seen
    pub fn wakeups(&self) -> u64 {
        self.wakeups.load(Ordering::Relaxed)
    }
}

impl<C: Clock> Completion for SpinCompletion<C> {
    fn wait_timeout(&self, timeout: Duration, done: &dyn Fn() -> bool) -> bool {
        let start = self.clock.now();
        loop {
            if done() {
                return true;
            }
            if self.clock.now().saturating_sub(start) >= timeout {
                return done();
            }
            core::hint::spin_loop();
        }
    }

    fn wake(&self) {
        self.wakeups.fetch_add(1, Ordering::Release);
    }
}

// =============================================================================
// CONDVAR COMPLETION
// =============================================================================

#[cfg(feature = "std")]
mod host {
    use super::{Clock, Completion};
    use core::time::Duration;
    use std::sync::{Condvar, Mutex, PoisonError};
    use std::time::Instant;

    /// [`Clock`] backed by `std::time::Instant`
    #[derive(Debug, Clone, Copy)]
    pub struct MonotonicClock {
        origin: Instant,
    }

    impl MonotonicClock {
        /// Clock whose origin is now
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
            }
        }
    }

    impl Default for MonotonicClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for MonotonicClock {
        fn now(&self) -> Duration {
            self.origin.elapsed()
        }
    }

    /// Sleeping completion built on a condition variable
    #[derive(Debug, Default)]
    pub struct CondvarCompletion {
        epoch: Mutex<u64>,
        cond: Condvar,
    }

    impl CondvarCompletion {
        /// Create a completion with no waiters
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Completion for CondvarCompletion {
        fn wait_timeout(&self, timeout: Duration, done: &dyn Fn() -> bool) -> bool {
            let deadline = Instant::now() + timeout;
            let mut guard = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if done() {
                    return true;
                }
                let now = Instant::now();
                if now >= deadline {
                    return done();
                }
                guard = self
                    .cond
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }

        fn wake(&self) {
            let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
            *epoch = epoch.wrapping_add(1);
            self.cond.notify_all();
        }
    }
}

#[cfg(feature = "std")]
pub use host::{CondvarCompletion, MonotonicClock};

// =============================================================================
// TESTS
// =============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_condvar_times_out_at_deadline() {
        let completion = CondvarCompletion::new();
        let start = Instant::now();
        let done = completion.wait_timeout(Duration::from_millis(40), &|| false);
        assert!(!done);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_condvar_wakes_waiter() {
        let completion = Arc::new(CondvarCompletion::new());
        let flag = Arc::new(AtomicBool::new(false));

        let waker = {
            let completion = completion.clone();
            let flag = flag.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                flag.store(true, Ordering::Release);
                completion.wake();
            })
        };

        let start = Instant::now();
        let done = completion.wait_timeout(Duration::from_secs(5), &|| flag.load(Ordering::Acquire));
        assert!(done);
        assert!(start.elapsed() < Duration::from_secs(5));
        waker.join().unwrap();
    }

    #[test]
    fn test_spurious_wake_keeps_waiting() {
        let completion = Arc::new(CondvarCompletion::new());
        let waker = {
            let completion = completion.clone();
            std::thread::spawn(move || {
                for _ in 0..5 {
                    completion.wake();
                    std::thread::sleep(Duration::from_millis(2));
                }
            })
        };
        let start = Instant::now();
        assert!(!completion.wait_timeout(Duration::from_millis(30), &|| false));
        assert!(start.elapsed() >= Duration::from_millis(30));
        waker.join().unwrap();
    }

    #[test]
    fn test_spin_completion() {
        let completion = SpinCompletion::new(MonotonicClock::new());
        let start = Instant::now();
        assert!(!completion.wait_timeout(Duration::from_millis(5), &|| false));
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert!(completion.wait_timeout(Duration::from_millis(5), &|| true));
        completion.wake();
        assert_eq!(completion.wakeups(), 1);
    }
}
