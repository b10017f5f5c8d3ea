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

//! Statistics Query Provider
//!
//! Answers tree-shaped statistics queries against a running or finished
//! analysis.
//!
//! # Core Components
//!
//! ## Row Identity
//! - Process-wide monotonic id allocator
//! - Bijective key↔id map per provider instance
//!
//! ## Response Model
//! - Status-tagged responses (Completed / Running / Cancelled / Failed)
//! - Transient tree rows rebuilt per response
//!
//! ## Step Protocol
//! - step -1: one-shot full answer, waits for readiness
//! - step 0: non-blocking coarse total, `Running` status
//! - step 1: detailed breakdown against a caller-supplied total

pub mod registry;
pub mod response;
pub mod statistics;
pub mod tree;

pub use registry::EntryIdMap;
pub use response::{ResponseStatus, TreeResponse};
pub use statistics::{StatisticsProvider, StatisticsQuery};
pub use tree::{TreeModel, TreeRow};
