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

//! Trace Analysis Core
//!
//! This crate implements the concurrent analysis pipeline of Dottrace: a
//! two-stage dependent background build (a time-indexed attribute state
//! system feeding a store of derived time-interval segments) coordinated by
//! an orchestrator with a one-shot readiness barrier, and a statistics query
//! provider that reads partial or complete results while the build is still
//! running.
//!
//! # Core Components
//!
//! ## Event Model
//! - Replayable trace event sources
//! - The black-box evaluation seams (`StateProvider`, `SegmentResolver`)
//!
//! ## State System
//! - Attribute interval store with point and range queries
//! - Background builder with initialization and completion barriers
//! - `.ht` artifact persistence and reuse
//!
//! ## Segment Store
//! - Concurrent append-by-builder / snapshot-read-by-consumer store
//! - Progress listeners notified per appended batch
//! - `.dat` artifact persistence and reuse
//!
//! ## Analysis Orchestration
//! - `TraceAnalysis`, the single readiness barrier over both stages
//! - Supplementary artifact staleness handling
//!
//! ## Query Provider
//! - `StatisticsProvider` with the two-phase step protocol
//! - Stable row identifiers from a process-wide allocator

pub mod analysis;
pub mod artifact;
pub mod event;
pub mod provider;
pub mod segment_store;
pub mod state_system;

pub use analysis::{AnalysisModule, SupplementaryFiles, TraceAnalysis};
pub use event::{EventSource, RecordedTrace, TraceEvent};
pub use provider::{ResponseStatus, StatisticsProvider, StatisticsQuery, TreeResponse};
pub use segment_store::{Segment, SegmentListener, SegmentStore, SegmentStoreBuilder, SegmentValue};
pub use state_system::{AttributeId, StateSystem, StateSystemBuilder, StateValue};
