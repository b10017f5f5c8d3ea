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

use thiserror::Error;

/// Why a module rejected a `schedule` call.
///
/// Scheduling acceptance is synchronous; everything that can go wrong after
/// acceptance is reported through the module's readiness and completion
/// signals instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("no trace is bound to module `{0}`")]
    NoTrace(String),

    #[error("module `{0}` has been disposed")]
    Disposed(String),

    #[error("module `{0}` already reached a terminal state")]
    Terminated(String),
}

/// Result alias for scheduling acceptance.
pub type ScheduleResult = Result<(), ScheduleError>;
