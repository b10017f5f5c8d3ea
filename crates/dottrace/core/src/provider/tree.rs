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

use serde::Serialize;

/// Sentinel parent id of root rows.
pub const NO_PARENT: i64 = -1;

/// One row of a tree response. Transient: rebuilt for every response,
/// while its `id` stays stable across responses through the provider's
/// id map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeRow {
    /// Stable row id
    pub id: i64,
    /// Id of the parent row, [`NO_PARENT`] for roots
    pub parent_id: i64,
    /// Display columns, aligned with the model's column labels
    pub values: Vec<String>,
}

/// Tree-shaped query result: column labels plus rows in parent-first
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeModel {
    /// Labels of the display columns
    pub column_labels: Vec<String>,
    /// Rows, each referring to its parent by id
    pub rows: Vec<TreeRow>,
}

impl TreeModel {
    /// Creates a model from labels and rows.
    pub fn new(column_labels: Vec<String>, rows: Vec<TreeRow>) -> Self {
        Self { column_labels, rows }
    }
}
