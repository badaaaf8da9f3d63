//! Concurrent-search context (component H): a cooperative timer that
//! releases and re-acquires the host's global lock, re-opening monitored
//! keys on resume.

use std::sync::atomic::{AtomicBool, Ordering};

/// ~5ms: how long a worker may hold the host lock before it must
/// cooperatively release it.
pub const CONCURRENT_TIMEOUT_NS: u64 = 5_000_000;

/// Abstracts the host's global lock so this crate is testable without one.
pub trait HostLock: Send {
    fn unlock(&mut self);
    fn relock(&mut self);
}

/// A `HostLock` that does nothing, for tests and for hosts with no lock to
/// coordinate.
#[derive(Default)]
pub struct NoopLock;

impl HostLock for NoopLock {
    fn unlock(&mut self) {}
    fn relock(&mut self) {}
}

/// `ConcurrentSearchCtx` wraps one query's hold on the host lock. At most
/// one lock is acquired per context; calling `check_timer` past the
/// cooperative window releases and reacquires it, running every registered
/// reopen callback in registration order.
pub struct ConcurrentSearchCtx<L: HostLock> {
    lock: L,
    last_time_ns: u64,
    is_locked: bool,
    open_keys: Vec<Box<dyn FnMut() + Send>>,
    timeout_ns: u64,
    cancelled: AtomicBool,
}

impl<L: HostLock> ConcurrentSearchCtx<L> {
    pub fn new(lock: L, now_ns: u64) -> Self {
        ConcurrentSearchCtx {
            lock,
            last_time_ns: now_ns,
            is_locked: true,
            open_keys: Vec::new(),
            timeout_ns: CONCURRENT_TIMEOUT_NS,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(lock: L, now_ns: u64, timeout_ns: u64) -> Self {
        let mut ctx = Self::new(lock, now_ns);
        ctx.timeout_ns = timeout_ns;
        ctx
    }

    /// Registers a callback to run immediately after the lock is
    /// reacquired, for a key this query has open.
    pub fn open_key(&mut self, reopen: impl FnMut() + Send + 'static) {
        self.open_keys.push(Box::new(reopen));
    }

    /// Returns `true` if the lock was actually released and reacquired.
    pub fn check_timer(&mut self, now_ns: u64) -> bool {
        if now_ns.saturating_sub(self.last_time_ns) <= self.timeout_ns {
            return false;
        }
        debug_assert!(self.is_locked, "check_timer fired without holding the lock");
        self.lock.unlock();
        self.is_locked = false;
        self.lock.relock();
        self.is_locked = true;
        for cb in self.open_keys.iter_mut() {
            cb();
        }
        self.last_time_ns = now_ns;
        true
    }

    /// Sets the cooperative cancellation flag; observed (not forced) at the
    /// next cooperative point.
    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct CountingLock(Arc<Mutex<(u32, u32)>>); // (unlocks, relocks)

    impl HostLock for CountingLock {
        fn unlock(&mut self) {
            self.0.lock().unwrap().0 += 1;
        }
        fn relock(&mut self) {
            self.0.lock().unwrap().1 += 1;
        }
    }

    #[test]
    fn check_timer_noop_within_window() {
        let counts = Arc::new(Mutex::new((0, 0)));
        let mut ctx = ConcurrentSearchCtx::new(CountingLock(counts.clone()), 0);
        assert!(!ctx.check_timer(1_000_000));
        assert_eq!(*counts.lock().unwrap(), (0, 0));
    }

    #[test]
    fn check_timer_releases_past_window_and_runs_reopen_callbacks() {
        let counts = Arc::new(Mutex::new((0, 0)));
        let ran = Arc::new(Mutex::new(false));
        let ran2 = ran.clone();
        let mut ctx = ConcurrentSearchCtx::new(CountingLock(counts.clone()), 0);
        ctx.open_key(move || *ran2.lock().unwrap() = true);

        assert!(ctx.check_timer(CONCURRENT_TIMEOUT_NS + 1));
        assert_eq!(*counts.lock().unwrap(), (1, 1));
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn cancellation_is_observed_not_forced() {
        let ctx = ConcurrentSearchCtx::new(NoopLock, 0);
        assert!(!ctx.is_cancelled());
        ctx.request_cancel();
        assert!(ctx.is_cancelled());
    }
}
