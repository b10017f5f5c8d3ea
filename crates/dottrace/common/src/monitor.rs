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

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Cooperative cancellation signal polled at blocking points.
///
/// Builders and the query provider check a monitor between units of work and
/// while parked on a store; a cancelled monitor turns the surrounding wait
/// into a `Cancelled` outcome, never a `Failed` one.
pub trait Monitor: Send + Sync {
    /// Non-blocking check of the cancellation flag.
    fn is_cancelled(&self) -> bool;
}

/// Atomic cancellation flag with an optional reason.
///
/// # Thread Safety
/// - `AtomicBool` carries the cancellation status
/// - `Mutex<Option<String>>` protects the reason
#[derive(Debug, Clone, Default)]
pub struct CancellationMonitor {
    cancelled: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancellationMonitor {
    /// Creates a monitor in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent; the first provided reason is kept.
    pub fn cancel(&self, reason: Option<&str>) {
        if let Some(reason) = reason {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.to_string());
            }
        }
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            debug!(reason = ?self.reason.lock().as_deref(), "cancellation requested");
        }
    }

    /// The reason passed to the first effective `cancel` call, if any.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

impl Monitor for CancellationMonitor {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
