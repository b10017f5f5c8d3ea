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

//! Time-Indexed Attribute State System
//!
//! This module provides the first pipeline stage: an addressable store of
//! time-disjoint attribute intervals built incrementally from the event
//! stream, plus the background builder that owns it.
//!
//! # Core Components
//!
//! ## Interval Store
//! - Attribute paths interned to dense quarks
//! - Point queries against committed intervals and the ongoing table
//! - Shared-read while the build is still appending
//!
//! ## Background Builder
//! - `schedule` / `cancel` / `wait_for_initialization` lifecycle
//! - One writer per sub-store, readers never observe torn intervals
//! - `.ht` artifact reuse when a prior complete build is on disk
//!
//! A builder may host several named sub-stores filled from the same event
//! pass; queries address one sub-store by its id.

pub mod builder;
pub mod interval;
pub mod provider;
pub mod store;

pub use builder::StateSystemBuilder;
pub use interval::{AttributeId, AttributeInterval, StateSnapshot, StateValue};
pub use provider::{EventTypesProvider, StateProvider, TotalsProvider};
pub use store::{StateSystem, StateSystemWriter};
