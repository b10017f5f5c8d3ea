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

use super::tree::TreeModel;
use serde::Serialize;

/// Outcome class of a query. The classes are mutually exclusive:
/// `Running` is reserved for the coarse step-0 early return, `Cancelled`
/// for a cancellation observed mid-wait, `Failed` for invalid parameters
/// or unavailable data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseStatus {
    /// The requested data is complete
    Completed,
    /// Partial answer; the analysis is still running
    Running,
    /// A cancellation signal aborted the wait
    Cancelled,
    /// The request could not be answered
    Failed,
}

/// Status message of completed responses.
pub const MSG_COMPLETED: &str = "Analysis completed";
/// Status message of running responses.
pub const MSG_RUNNING: &str = "Analysis is running";
/// Status message of cancelled responses.
pub const MSG_CANCELLED: &str = "The query was cancelled";

/// Status-tagged tree response. Expected conditions (missing data, not
/// ready yet, cancellation) always arrive here as a status, never as a
/// raised fault.
#[derive(Debug, Clone, Serialize)]
pub struct TreeResponse {
    /// Outcome class
    pub status: ResponseStatus,
    /// Human-readable status detail
    pub message: String,
    /// The tree, absent on `Cancelled` and `Failed`
    pub model: Option<TreeModel>,
}

impl TreeResponse {
    /// Complete answer.
    pub fn completed(model: TreeModel) -> Self {
        Self {
            status: ResponseStatus::Completed,
            message: MSG_COMPLETED.to_string(),
            model: Some(model),
        }
    }

    /// Coarse early answer while the analysis is still running.
    pub fn running(model: TreeModel) -> Self {
        Self {
            status: ResponseStatus::Running,
            message: MSG_RUNNING.to_string(),
            model: Some(model),
        }
    }

    /// Wait aborted by a cancellation signal.
    pub fn cancelled() -> Self {
        Self {
            status: ResponseStatus::Cancelled,
            message: MSG_CANCELLED.to_string(),
            model: None,
        }
    }

    /// Request that could not be answered.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failed,
            message: message.into(),
            model: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_exclusive_statuses() {
        let model = TreeModel::new(vec!["Level".into()], Vec::new());
        assert_eq!(TreeResponse::completed(model.clone()).status, ResponseStatus::Completed);
        assert_eq!(TreeResponse::running(model).status, ResponseStatus::Running);

        let cancelled = TreeResponse::cancelled();
        assert_eq!(cancelled.status, ResponseStatus::Cancelled);
        assert!(cancelled.model.is_none());

        let failed = TreeResponse::failed("missing total");
        assert_eq!(failed.status, ResponseStatus::Failed);
        assert_eq!(failed.message, "missing total");
        assert!(failed.model.is_none());
    }
}
