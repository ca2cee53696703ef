//! Counting limiter shared by every external process the build launches.

use crate::config::Concurrency;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Bounds how many permits are held at once.
///
/// Compile jobs, the link job and include resolution all draw from the same
/// limiter, so the bound holds system-wide. Unbounded limiters never block
/// but still count, which keeps [`Limiter::peak`] meaningful.
#[derive(Debug)]
pub struct Limiter {
    limit: Option<usize>,
    running: Mutex<usize>,
    freed: Condvar,
    peak: AtomicUsize,
    acquired: AtomicUsize,
}

impl Limiter {
    pub fn new(concurrency: Concurrency) -> Self {
        Self {
            limit: concurrency.limit(),
            running: Mutex::new(0),
            freed: Condvar::new(),
            peak: AtomicUsize::new(0),
            acquired: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // The guarded value is a plain counter; a panic elsewhere cannot corrupt it
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a permit is free. The permit is returned on drop.
    pub fn acquire(&self) -> Permit<'_> {
        let mut running = self.lock();
        if let Some(limit) = self.limit {
            while *running >= limit {
                running = self
                    .freed
                    .wait(running)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        *running += 1;
        self.peak.fetch_max(*running, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Permit { limiter: self }
    }

    fn release(&self) {
        let mut running = self.lock();
        *running = running.saturating_sub(1);
        drop(running);
        self.freed.notify_one();
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Permits currently held.
    pub fn running(&self) -> usize {
        *self.lock()
    }

    /// Highest number of permits ever held at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total permits handed out so far.
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[must_use = "dropping the permit releases the slot immediately"]
#[derive(Debug)]
pub struct Permit<'a> {
    limiter: &'a Limiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use std::thread;
    use std::time::Duration;

    fn bounded(n: usize) -> Concurrency {
        Concurrency::Bounded(NonZeroUsize::new(n).unwrap())
    }

    fn stress(limiter: &Limiter, workers: usize) {
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let _permit = limiter.acquire();
                    thread::sleep(Duration::from_millis(5));
                });
            }
        });
    }

    #[test]
    fn test_bound_of_one_serializes() {
        let limiter = Limiter::new(bounded(1));
        stress(&limiter, 16);
        assert_eq!(limiter.peak(), 1);
        assert_eq!(limiter.acquired(), 16);
        assert_eq!(limiter.running(), 0);
    }

    #[test]
    fn test_bound_of_four_is_respected() {
        let limiter = Limiter::new(bounded(4));
        stress(&limiter, 40);
        assert!(limiter.peak() <= 4);
        assert!(limiter.peak() >= 1);
        assert_eq!(limiter.acquired(), 40);
        assert_eq!(limiter.running(), 0);
    }

    #[test]
    fn test_unbounded_never_blocks() {
        let limiter = Limiter::new(Concurrency::Unbounded);
        let a = limiter.acquire();
        let b = limiter.acquire();
        let c = limiter.acquire();
        assert_eq!(limiter.running(), 3);
        drop((a, b, c));
        assert_eq!(limiter.running(), 0);
        assert_eq!(limiter.peak(), 3);
        assert_eq!(limiter.limit(), None);
    }

    #[test]
    fn test_permit_released_on_panic() {
        let limiter = Limiter::new(bounded(1));
        let result = thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _permit = limiter.acquire();
                    panic!("job blew up");
                })
                .join()
        });
        assert!(result.is_err());
        // Would deadlock if the permit had leaked
        let _permit = limiter.acquire();
        assert_eq!(limiter.running(), 1);
    }
}
