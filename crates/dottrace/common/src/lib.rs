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

//! Shared Building Blocks for Trace Analysis
//!
//! This crate holds the small pieces every Dottrace component agrees on:
//! trace-relative timestamps and time ranges, the lifecycle states a
//! background build moves through, the cooperative cancellation monitor
//! polled at every blocking point, and the write-once initialization latch
//! that turns "the store is open for queries" into a one-shot signal.
//!
//! # Core Components
//!
//! ## Time
//! - Trace-relative nanosecond timestamps
//! - Closed time ranges with containment and intersection helpers
//!
//! ## Build Lifecycle
//! - `BuildState` transitions (NotStarted → Initializing → terminal)
//! - `InitLatch`, the single-assignment readiness barrier
//!
//! ## Cancellation
//! - `Monitor` trait polled by blocking waits
//! - `CancellationMonitor`, an atomic flag with an optional reason

pub mod error;
pub mod latch;
pub mod monitor;
pub mod state;
pub mod time;

pub use error::{ScheduleError, ScheduleResult};
pub use latch::InitLatch;
pub use monitor::{CancellationMonitor, Monitor};
pub use state::BuildState;
pub use time::{TimeRange, Timestamp};
