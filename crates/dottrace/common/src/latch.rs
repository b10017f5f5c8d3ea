// Dottrace
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Write-once boolean latch.
///
/// The latch resolves exactly once: the first `signal` decides the outcome
/// and wakes every current and future waiter; later signals are no-ops.
/// `wait` blocks the calling thread until the latch is resolved and then
/// returns the decided value, the same one to every caller.
#[derive(Debug, Default)]
pub struct InitLatch {
    outcome: Mutex<Option<bool>>,
    resolved: Condvar,
}

impl InitLatch {
    /// Creates an unresolved latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the latch. Returns true when this call decided the outcome,
    /// false when the latch was already resolved.
    pub fn signal(&self, success: bool) -> bool {
        let mut outcome = self.outcome.lock();
        if outcome.is_some() {
            return false;
        }
        *outcome = Some(success);
        debug!(success, "latch resolved");
        self.resolved.notify_all();
        true
    }

    /// Blocks until the latch resolves, then returns the decided outcome.
    pub fn wait(&self) -> bool {
        let mut outcome = self.outcome.lock();
        while outcome.is_none() {
            self.resolved.wait(&mut outcome);
        }
        outcome.unwrap()
    }

    /// Blocks for at most `timeout`. Returns the outcome when the latch
    /// resolved within the window, `None` otherwise.
    ///
    /// Completion waits use this to interleave the park with cooperative
    /// cancellation polls.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.outcome.lock();
        while outcome.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let _ = self.resolved.wait_for(&mut outcome, deadline - now);
        }
        *outcome
    }

    /// Non-blocking view of the outcome; `None` while unresolved.
    pub fn peek(&self) -> Option<bool> {
        *self.outcome.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_signal_wins() {
        let latch = InitLatch::new();
        assert!(latch.signal(true));
        assert!(!latch.signal(false));
        assert!(latch.wait());
        assert_eq!(latch.peek(), Some(true));
    }

    #[test]
    fn test_wait_after_resolution_does_not_block() {
        let latch = InitLatch::new();
        latch.signal(false);
        assert!(!latch.wait());
        assert!(!latch.wait());
    }

    #[test]
    fn test_wait_timeout_expires_unresolved() {
        let latch = InitLatch::new();
        assert_eq!(latch.wait_timeout(std::time::Duration::from_millis(10)), None);
        latch.signal(true);
        assert_eq!(latch.wait_timeout(std::time::Duration::from_millis(10)), Some(true));
    }

    #[test]
    fn test_concurrent_waiters_observe_same_outcome() {
        let latch = Arc::new(InitLatch::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let latch = Arc::clone(&latch);
            handles.push(thread::spawn(move || latch.wait()));
        }

        thread::sleep(std::time::Duration::from_millis(20));
        latch.signal(true);

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
