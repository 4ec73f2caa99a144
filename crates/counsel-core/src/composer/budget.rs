//! Document-wide cap on "needs verification" annotations

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Shared counter of annotations accepted into one document.
///
/// Sections are composed concurrently; every check-and-increment is a single
/// compare-and-swap, so the cap holds whatever order sections finish in.
#[derive(Debug)]
pub struct PlaceholderBudget {
    cap: usize,
    used: AtomicUsize,
}

impl PlaceholderBudget {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            used: AtomicUsize::new(0),
        }
    }

    /// Reserve exactly `n` annotations, or nothing
    pub fn try_reserve(&self, n: usize) -> bool {
        if n == 0 {
            return true;
        }
        let reserved = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used + n <= self.cap).then_some(used + n)
            })
            .is_ok();
        if !reserved {
            debug!("Annotation budget denied {} (used {} of {})", n, self.used(), self.cap);
        }
        reserved
    }

    /// Reserve as many of `n` as still fit and return how many were granted
    pub fn reserve_up_to(&self, n: usize) -> usize {
        let mut granted = 0;
        // The closure may run more than once under contention; the last run wins
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                granted = n.min(self.cap.saturating_sub(used));
                Some(used + granted)
            });
        granted
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.used())
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_try_reserve_is_all_or_nothing() {
        let budget = PlaceholderBudget::new(3);
        assert!(budget.try_reserve(2));
        assert!(!budget.try_reserve(2));
        assert_eq!(budget.used(), 2);
        assert!(budget.try_reserve(1));
        assert_eq!(budget.remaining(), 0);
        assert!(budget.try_reserve(0));
    }

    #[test]
    fn test_reserve_up_to_grants_remainder() {
        let budget = PlaceholderBudget::new(3);
        assert_eq!(budget.reserve_up_to(2), 2);
        assert_eq!(budget.reserve_up_to(4), 1);
        assert_eq!(budget.reserve_up_to(1), 0);
        assert_eq!(budget.used(), 3);
    }

    #[test]
    fn test_cap_holds_across_threads() {
        let budget = Arc::new(PlaceholderBudget::new(3));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = Arc::clone(&budget);
                std::thread::spawn(move || budget.try_reserve(1))
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 3);
        assert_eq!(budget.used(), 3);
    }
}
