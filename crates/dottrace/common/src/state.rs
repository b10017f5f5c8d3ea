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

/// Lifecycle of a background build.
///
/// Transitions are monotonic: NotStarted → Initializing → one of the
/// terminal states. `Cancelled` and `Failed` are terminal and never
/// overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// `schedule` has not been called yet
    NotStarted,
    /// The worker is running; the store may already answer partial queries
    Initializing,
    /// Construction reached the end of the event source
    Built,
    /// A cancellation request took effect before completion
    Cancelled,
    /// Construction aborted on an error
    Failed,
}

impl BuildState {
    /// Whether no further transition can happen from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Built | BuildState::Cancelled | BuildState::Failed)
    }
}
