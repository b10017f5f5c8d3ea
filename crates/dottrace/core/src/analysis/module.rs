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

use crate::segment_store::SegmentStoreBuilder;
use crate::state_system::StateSystemBuilder;
use dottrace_common::{Monitor, ScheduleResult};
use std::collections::BTreeMap;

/// Common lifecycle of a background analysis stage.
///
/// Both stage builders implement this; the orchestrator drives them
/// uniformly and merges their diagnostic properties.
pub trait AnalysisModule: Send + Sync {
    /// Module id, also the stem of its supplementary artifacts.
    fn id(&self) -> String;

    /// Module display name.
    fn name(&self) -> String;

    /// Sets the module id.
    fn set_id(&self, id: &str);

    /// Sets the module display name.
    fn set_name(&self, name: &str);

    /// Begins asynchronous construction; synchronous acceptance only.
    fn schedule(&self) -> ScheduleResult;

    /// Requests early termination; idempotent.
    fn cancel(&self);

    /// Blocks until the build resolves; true only for full completion.
    fn wait_for_completion(&self, monitor: Option<&dyn Monitor>) -> bool;

    /// Diagnostic key/value view of the module.
    fn properties(&self) -> BTreeMap<String, String>;

    /// Releases the module's resources; safe on partially built state.
    fn dispose(&self);
}

impl AnalysisModule for StateSystemBuilder {
    fn id(&self) -> String {
        StateSystemBuilder::id(self)
    }

    fn name(&self) -> String {
        StateSystemBuilder::name(self)
    }

    fn set_id(&self, id: &str) {
        StateSystemBuilder::set_id(self, id);
    }

    fn set_name(&self, name: &str) {
        StateSystemBuilder::set_name(self, name);
    }

    fn schedule(&self) -> ScheduleResult {
        StateSystemBuilder::schedule(self)
    }

    fn cancel(&self) {
        StateSystemBuilder::cancel(self);
    }

    fn wait_for_completion(&self, monitor: Option<&dyn Monitor>) -> bool {
        StateSystemBuilder::wait_for_completion(self, monitor)
    }

    fn properties(&self) -> BTreeMap<String, String> {
        StateSystemBuilder::properties(self)
    }

    fn dispose(&self) {
        StateSystemBuilder::dispose(self);
    }
}

impl AnalysisModule for SegmentStoreBuilder {
    fn id(&self) -> String {
        SegmentStoreBuilder::id(self)
    }

    fn name(&self) -> String {
        SegmentStoreBuilder::name(self)
    }

    fn set_id(&self, id: &str) {
        SegmentStoreBuilder::set_id(self, id);
    }

    fn set_name(&self, name: &str) {
        SegmentStoreBuilder::set_name(self, name);
    }

    fn schedule(&self) -> ScheduleResult {
        SegmentStoreBuilder::schedule(self)
    }

    fn cancel(&self) {
        SegmentStoreBuilder::cancel(self);
    }

    fn wait_for_completion(&self, monitor: Option<&dyn Monitor>) -> bool {
        SegmentStoreBuilder::wait_for_completion(self, monitor)
    }

    fn properties(&self) -> BTreeMap<String, String> {
        SegmentStoreBuilder::properties(self)
    }

    fn dispose(&self) {
        SegmentStoreBuilder::dispose(self);
    }
}
