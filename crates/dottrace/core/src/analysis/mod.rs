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

//! Analysis Orchestration
//!
//! This module presents the two pipeline stages as one analysis unit with a
//! single readiness barrier.
//!
//! # Core Components
//!
//! ## Orchestrator
//! - Sequences scheduling of both stage builders
//! - Enforces paired-artifact consistency before a rebuild
//! - Resolves the segment stage's input dependency after phase-A
//! - Propagates cancellation and disposal into both stages
//!
//! ## Supplementary Storage
//! - Per-trace artifact directory and `.ht`/`.dat` file naming

pub mod module;
pub mod orchestrator;
pub mod supplementary;

pub use module::AnalysisModule;
pub use orchestrator::TraceAnalysis;
pub use supplementary::SupplementaryFiles;
