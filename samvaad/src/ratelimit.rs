//! Occurrence counter that admits one log line per N events.
//!
//! Transient transport faults (short writes, recv errors, undecodable
//! datagrams) can arrive at wire rate. Call [`LogEvery::admit`] on every
//! occurrence and only log when it returns true.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct LogEvery {
    every: u64,
    count: AtomicU64,
}

impl LogEvery {
    pub const fn new(every: u64) -> Self {
        Self {
            every,
            count: AtomicU64::new(0),
        }
    }

    /// Record one occurrence. True on the first call and then once per
    /// `every` calls.
    pub fn admit(&self) -> bool {
        self.count.fetch_add(1, Ordering::Relaxed) % self.every == 0
    }

    /// Total occurrences recorded so far.
    pub fn occurrences(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_first_and_every_nth() {
        let gate = LogEvery::new(3);
        let admitted: Vec<bool> = (0..7).map(|_| gate.admit()).collect();
        assert_eq!(admitted, vec![true, false, false, true, false, false, true]);
        assert_eq!(gate.occurrences(), 7);
    }
}
