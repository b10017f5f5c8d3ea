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

use dottrace_common::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense quark identifying an interned attribute path within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeId(pub u32);

impl AttributeId {
    /// Index of this quark into the store's per-attribute tables.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value carried by an attribute over an interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateValue {
    /// Attribute has no value over the interval
    Null,
    /// Integer payload, e.g. a cumulative event count
    Int(i64),
    /// String payload
    Str(String),
}

impl StateValue {
    /// The integer payload, or `None` for other variants.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            StateValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// One committed fact: `attribute` held `value` over `[start, end]`.
///
/// Intervals of a given attribute are time-disjoint and stored in ascending
/// start order; once committed they are never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInterval {
    /// Owning attribute quark
    pub attribute: AttributeId,
    /// Inclusive interval start
    pub start: Timestamp,
    /// Inclusive interval end
    pub end: Timestamp,
    /// Value held over the interval
    pub value: StateValue,
}

impl AttributeInterval {
    /// Whether `t` falls inside the interval, bounds included.
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Serializable image of a fully built store, the `.ht` payload unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Sub-store id
    pub id: String,
    /// Interned attribute paths, indexed by quark
    pub attributes: Vec<String>,
    /// Committed intervals per attribute, ascending start order
    pub intervals: Vec<Vec<AttributeInterval>>,
    /// Store start time
    pub start: Timestamp,
    /// Store end time
    pub end: Timestamp,
}
