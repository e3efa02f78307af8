//! Stale-response guard.
//!
//! One monotonic counter per feed. Every attempt takes a fresh number when it
//! starts; a response may only be applied while its number is still the most
//! recently issued one.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StaleGuard {
    last_issued: AtomicU64,
}

impl StaleGuard {
    /// Counter starts at 0; the first issued sequence is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next sequence number.
    pub fn next(&self) -> u64 {
        self.last_issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `seq` is the latest issued number.
    pub fn is_current(&self, seq: u64) -> bool {
        seq != 0 && self.last_issued.load(Ordering::SeqCst) == seq
    }

    /// Latest issued number (0 before the first attempt).
    pub fn latest(&self) -> u64 {
        self.last_issued.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_are_monotonic() {
        let guard = StaleGuard::new();
        assert_eq!(guard.latest(), 0);
        assert_eq!(guard.next(), 1);
        assert_eq!(guard.next(), 2);
        assert_eq!(guard.next(), 3);
        assert_eq!(guard.latest(), 3);
    }

    #[test]
    fn test_only_latest_is_current() {
        let guard = StaleGuard::new();
        assert!(!guard.is_current(0));

        let issued: Vec<u64> = (0..5).map(|_| guard.next()).collect();
        // resolution order does not matter, only the latest issued wins
        for seq in issued.iter().rev() {
            assert_eq!(guard.is_current(*seq), *seq == 5);
        }

        let newer = guard.next();
        assert!(!guard.is_current(5));
        assert!(guard.is_current(newer));
    }
}
