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

//! The interval store and its exclusive writer handle.

use super::interval::{AttributeId, AttributeInterval, StateSnapshot, StateValue};
use dottrace_common::{InitLatch, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Addressable, timestamp-indexed store of attribute intervals.
///
/// During construction the builder holds the only [`StateSystemWriter`];
/// readers may query concurrently and see every interval committed so far
/// plus the ongoing values. After the store is sealed it is immutable.
#[derive(Debug)]
pub struct StateSystem {
    id: String,
    inner: RwLock<Inner>,
    finished: InitLatch,
    cancelled: AtomicBool,
}

#[derive(Debug, Default)]
struct Inner {
    attr_ids: HashMap<String, AttributeId>,
    attr_paths: Vec<String>,
    committed: Vec<Vec<AttributeInterval>>,
    ongoing: Vec<Option<Ongoing>>,
    start: Timestamp,
    current_end: Timestamp,
}

#[derive(Debug)]
struct Ongoing {
    since: Timestamp,
    value: StateValue,
}

impl StateSystem {
    /// Opens an empty store and hands back its only writer.
    pub fn begin(id: impl Into<String>, start: Timestamp) -> (Arc<StateSystem>, StateSystemWriter) {
        let system = Arc::new(StateSystem {
            id: id.into(),
            inner: RwLock::new(Inner {
                start,
                current_end: start,
                ..Inner::default()
            }),
            finished: InitLatch::new(),
            cancelled: AtomicBool::new(false),
        });
        let writer = StateSystemWriter { system: Arc::clone(&system) };
        (system, writer)
    }

    /// Rehydrates a fully built store from a persisted snapshot.
    pub fn from_snapshot(snapshot: StateSnapshot) -> Arc<StateSystem> {
        let attr_ids = snapshot
            .attributes
            .iter()
            .enumerate()
            .map(|(index, path)| (path.clone(), AttributeId(index as u32)))
            .collect();
        let ongoing = snapshot.attributes.iter().map(|_| None).collect();

        let system = StateSystem {
            id: snapshot.id,
            inner: RwLock::new(Inner {
                attr_ids,
                attr_paths: snapshot.attributes,
                committed: snapshot.intervals,
                ongoing,
                start: snapshot.start,
                current_end: snapshot.end,
            }),
            finished: InitLatch::new(),
            cancelled: AtomicBool::new(false),
        };
        system.finished.signal(true);
        Arc::new(system)
    }

    /// Sub-store id this store answers for.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Store start time.
    pub fn start_time(&self) -> Timestamp {
        self.inner.read().start
    }

    /// Largest timestamp covered so far; advances during the build.
    pub fn current_end_time(&self) -> Timestamp {
        self.inner.read().current_end
    }

    /// Quark of `path`, if the attribute exists.
    pub fn attribute(&self, path: &str) -> Option<AttributeId> {
        self.inner.read().attr_ids.get(path).copied()
    }

    /// All interned attributes as `(quark, path)` pairs, quark order.
    pub fn attributes(&self) -> Vec<(AttributeId, String)> {
        let inner = self.inner.read();
        inner
            .attr_paths
            .iter()
            .enumerate()
            .map(|(index, path)| (AttributeId(index as u32), path.clone()))
            .collect()
    }

    /// Value of `attribute` at time `t`, committed or ongoing.
    pub fn query_at(&self, attribute: AttributeId, t: Timestamp) -> Option<StateValue> {
        let inner = self.inner.read();
        if t < inner.start || t > inner.current_end {
            return None;
        }
        let list = inner.committed.get(attribute.index())?;
        let idx = list.partition_point(|interval| interval.start <= t);
        if idx > 0 && list[idx - 1].end >= t {
            return Some(list[idx - 1].value.clone());
        }
        match inner.ongoing.get(attribute.index()) {
            Some(Some(ongoing)) if ongoing.since <= t => Some(ongoing.value.clone()),
            _ => None,
        }
    }

    /// Value of the attribute at `path` at time `t`.
    pub fn query_value_at(&self, path: &str, t: Timestamp) -> Option<StateValue> {
        let attribute = self.attribute(path)?;
        self.query_at(attribute, t)
    }

    /// Committed intervals of `attribute`, ascending start order.
    pub fn intervals(&self, attribute: AttributeId) -> Vec<AttributeInterval> {
        self.inner
            .read()
            .committed
            .get(attribute.index())
            .cloned()
            .unwrap_or_default()
    }

    /// Blocks until the store is sealed; true when fully built, false when
    /// the build was cancelled. Partial data stays queryable either way.
    pub fn wait_until_built(&self) -> bool {
        self.finished.wait()
    }

    /// Bounded variant of [`Self::wait_until_built`] for cooperative polls.
    pub fn wait_until_built_for(&self, timeout: Duration) -> Option<bool> {
        self.finished.wait_timeout(timeout)
    }

    /// Whether the build of this store ended in cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Serializable image of the committed data.
    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read();
        StateSnapshot {
            id: self.id.clone(),
            attributes: inner.attr_paths.clone(),
            intervals: inner.committed.clone(),
            start: inner.start,
            end: inner.current_end,
        }
    }
}

/// Exclusive write handle of one [`StateSystem`].
///
/// The builder thread owns the writer; committing it through `seal_built`
/// or `seal_cancelled` resolves the store's completion latch exactly once.
#[derive(Debug)]
pub struct StateSystemWriter {
    system: Arc<StateSystem>,
}

impl StateSystemWriter {
    /// The store this writer mutates.
    pub fn system(&self) -> &Arc<StateSystem> {
        &self.system
    }

    /// Records that the attribute at `path` takes `value` from time `t` on.
    ///
    /// The previous ongoing value, if any, is committed as an interval
    /// ending at `t - 1`. A second modification at the same timestamp
    /// replaces the ongoing value without committing an empty interval.
    pub fn modify_attribute(&mut self, path: &str, value: StateValue, t: Timestamp) {
        let mut inner = self.system.inner.write();
        let attribute = intern(&mut inner, path);
        if t > inner.current_end {
            inner.current_end = t;
        }
        let index = attribute.index();
        if let Some(previous) = inner.ongoing[index].take() {
            if previous.since < t {
                inner.committed[index].push(AttributeInterval {
                    attribute,
                    start: previous.since,
                    end: t - 1,
                    value: previous.value,
                });
            }
        }
        inner.ongoing[index] = Some(Ongoing { since: t, value });
    }

    /// Increments the integer counter at `path` at time `t` and returns the
    /// new count. A non-integer previous value restarts the counter at 1.
    pub fn increment(&mut self, path: &str, t: Timestamp) -> i64 {
        let count = self
            .ongoing_value(path)
            .and_then(|value| value.as_int())
            .unwrap_or(0)
            + 1;
        self.modify_attribute(path, StateValue::Int(count), t);
        count
    }

    /// Current ongoing value of the attribute at `path`.
    pub fn ongoing_value(&self, path: &str) -> Option<StateValue> {
        let inner = self.system.inner.read();
        let attribute = *inner.attr_ids.get(path)?;
        inner.ongoing[attribute.index()]
            .as_ref()
            .map(|ongoing| ongoing.value.clone())
    }

    /// Commits every ongoing value as an interval ending at `end`.
    pub fn close(&mut self, end: Timestamp) {
        let mut inner = self.system.inner.write();
        if end > inner.current_end {
            inner.current_end = end;
        }
        let close_at = inner.current_end;
        for index in 0..inner.ongoing.len() {
            if let Some(ongoing) = inner.ongoing[index].take() {
                inner.committed[index].push(AttributeInterval {
                    attribute: AttributeId(index as u32),
                    start: ongoing.since,
                    end: close_at.max(ongoing.since),
                    value: ongoing.value,
                });
            }
        }
    }

    /// Seals the store as fully built and releases every waiter.
    pub fn seal_built(self) {
        self.system.finished.signal(true);
    }

    /// Seals the store as cancelled; waiters are told the build did not
    /// complete, while committed data stays readable.
    pub fn seal_cancelled(self) {
        self.system.cancelled.store(true, Ordering::Release);
        self.system.finished.signal(false);
    }
}

fn intern(inner: &mut Inner, path: &str) -> AttributeId {
    if let Some(attribute) = inner.attr_ids.get(path) {
        return *attribute;
    }
    let attribute = AttributeId(inner.attr_paths.len() as u32);
    inner.attr_ids.insert(path.to_string(), attribute);
    inner.attr_paths.push(path.to_string());
    inner.committed.push(Vec::new());
    inner.ongoing.push(None);
    attribute
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modify_commits_previous_interval() {
        let (system, mut writer) = StateSystem::begin("test", 0);
        writer.modify_attribute("cpu", StateValue::Int(1), 10);
        writer.modify_attribute("cpu", StateValue::Int(2), 20);

        let attribute = system.attribute("cpu").unwrap();
        let intervals = system.intervals(attribute);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, 10);
        assert_eq!(intervals[0].end, 19);
        assert_eq!(intervals[0].value, StateValue::Int(1));

        // the new value is visible as the ongoing state
        assert_eq!(system.query_at(attribute, 20), Some(StateValue::Int(2)));
    }

    #[test]
    fn test_same_timestamp_modify_replaces_ongoing() {
        let (system, mut writer) = StateSystem::begin("test", 0);
        writer.modify_attribute("cpu", StateValue::Int(1), 10);
        writer.modify_attribute("cpu", StateValue::Int(9), 10);
        writer.close(30);

        let attribute = system.attribute("cpu").unwrap();
        let intervals = system.intervals(attribute);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].value, StateValue::Int(9));
        assert_eq!(intervals[0].start, 10);
        assert_eq!(intervals[0].end, 30);
    }

    #[test]
    fn test_query_outside_known_span_is_none() {
        let (system, mut writer) = StateSystem::begin("test", 5);
        writer.modify_attribute("cpu", StateValue::Int(1), 10);

        let attribute = system.attribute("cpu").unwrap();
        assert_eq!(system.query_at(attribute, 4), None);
        assert_eq!(system.query_at(attribute, 11), None); // beyond current end
        assert_eq!(system.query_at(attribute, 10), Some(StateValue::Int(1)));
    }

    #[test]
    fn test_increment_counts_cumulatively() {
        let (system, mut writer) = StateSystem::begin("test", 0);
        assert_eq!(writer.increment("total", 1), 1);
        assert_eq!(writer.increment("total", 2), 2);
        assert_eq!(writer.increment("total", 5), 3);
        writer.close(5);

        assert_eq!(system.query_value_at("total", 1), Some(StateValue::Int(1)));
        assert_eq!(system.query_value_at("total", 4), Some(StateValue::Int(2)));
        assert_eq!(system.query_value_at("total", 5), Some(StateValue::Int(3)));
    }

    #[test]
    fn test_seal_built_resolves_waiters() {
        let (system, mut writer) = StateSystem::begin("test", 0);
        writer.modify_attribute("a", StateValue::Int(1), 1);
        writer.close(2);
        writer.seal_built();

        assert!(system.wait_until_built());
        assert!(!system.is_cancelled());
    }

    #[test]
    fn test_seal_cancelled_reports_cancellation() {
        let (system, mut writer) = StateSystem::begin("test", 0);
        writer.modify_attribute("a", StateValue::Int(1), 1);
        writer.close(1);
        writer.seal_cancelled();

        assert!(!system.wait_until_built());
        assert!(system.is_cancelled());
        // partial data stays queryable
        assert_eq!(system.query_value_at("a", 1), Some(StateValue::Int(1)));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (system, mut writer) = StateSystem::begin("stats", 0);
        writer.increment("total", 3);
        writer.increment("total", 7);
        writer.close(9);
        writer.seal_built();

        let rehydrated = StateSystem::from_snapshot(system.snapshot());
        assert_eq!(rehydrated.id(), "stats");
        assert!(rehydrated.wait_until_built());
        assert_eq!(rehydrated.query_value_at("total", 8), Some(StateValue::Int(2)));
        assert_eq!(rehydrated.current_end_time(), 9);
    }
}
