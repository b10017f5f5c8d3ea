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

//! The statistics tree provider and its step protocol.

use super::registry::EntryIdMap;
use super::response::TreeResponse;
use super::tree::{NO_PARENT, TreeModel, TreeRow};
use crate::analysis::TraceAnalysis;
use crate::state_system::{EventTypesProvider, StateSystem, TotalsProvider};
use dottrace_common::{Monitor, TimeRange, Timestamp};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Column labels of every statistics tree.
pub const COLUMN_LABELS: [&str; 3] = ["Level", "Events total", "Percentage"];
/// Cadence of cancellation polls while parked on a sub-store.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A statistics tree request.
///
/// `step` drives the two-phase protocol: `-1` (the default) asks for the
/// full answer in one shot, `0` for a non-blocking coarse total, `1` for
/// the detailed breakdown, which additionally requires the `total`
/// obtained from the earlier step.
#[derive(Debug, Clone)]
pub struct StatisticsQuery {
    /// Queried time range
    pub range: TimeRange,
    /// Protocol step; negative values normalize to `-1`
    pub step: i64,
    /// Total from the coarse step, mandatory iff `step == 1`
    pub total: Option<i64>,
}

impl StatisticsQuery {
    /// One-shot query over `range`.
    pub fn new(range: TimeRange) -> Self {
        Self { range, step: -1, total: None }
    }

    /// Selects a protocol step; any negative value means "one shot".
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = if step < 0 { -1 } else { step };
        self
    }

    /// Supplies the previously computed total for a step-1 query.
    pub fn with_total(mut self, total: i64) -> Self {
        self.total = Some(total);
        self
    }
}

/// Tree-statistics façade over a [`TraceAnalysis`].
///
/// Each fetch runs under the write side of a single per-provider lock:
/// row-id allocation and tree assembly are indivisible with respect to
/// concurrent fetches, so two callers can neither race an id for the same
/// key nor observe a half-built tree.
pub struct StatisticsProvider {
    analysis: Arc<TraceAnalysis>,
    trace_name: String,
    ids: RwLock<EntryIdMap>,
}

impl StatisticsProvider {
    /// Wraps an analysis whose trace is already bound.
    pub fn new(analysis: Arc<TraceAnalysis>) -> Option<Self> {
        let trace_name = analysis.trace()?.name().to_string();
        Some(Self {
            analysis,
            trace_name,
            ids: RwLock::new(EntryIdMap::new()),
        })
    }

    /// Schedules the analysis and wraps it; `None` when it cannot be
    /// scheduled (no trace bound or already terminated).
    pub fn create(analysis: Arc<TraceAnalysis>) -> Option<Self> {
        analysis.schedule().ok()?;
        Self::new(analysis)
    }

    /// Answers a statistics tree request; see [`StatisticsQuery`] for the
    /// step protocol. Expected failure conditions come back as statuses.
    pub fn fetch_tree(&self, query: &StatisticsQuery, monitor: Option<&dyn Monitor>) -> TreeResponse {
        // Parameter validation happens before any locking or blocking.
        if query.range.start > query.range.end {
            return TreeResponse::failed("invalid time range");
        }
        let step = if query.step < 0 { -1 } else { query.step };
        if step == 1 && query.total.is_none() {
            return TreeResponse::failed("step 1 requires the total of the coarse step");
        }
        if step > 1 {
            panic!("unknown statistics query step {step}");
        }

        let mut ids = self.ids.write();
        debug!(range = ?query.range, step, "statistics fetch");

        if step == 0 {
            // Best-effort early return: read whatever the totals store
            // holds right now, without waiting for readiness.
            if monitor.is_some_and(|monitor| monitor.is_cancelled()) {
                return TreeResponse::cancelled();
            }
            let total = self
                .analysis
                .state_system(TotalsProvider::STORE_ID)
                .map(|totals| events_in_range(&totals, TotalsProvider::TOTAL_ATTRIBUTE, query.range))
                .unwrap_or(0);
            return TreeResponse::running(self.tree(&mut ids, total, None));
        }

        let total = if step < 0 {
            if !self.analysis.wait_for_initialization() {
                return TreeResponse::failed("the analysis failed to initialize");
            }
            let totals = self
                .analysis
                .state_system(TotalsProvider::STORE_ID)
                .unwrap_or_else(|| {
                    panic!("analysis reported ready but the totals store is absent")
                });
            if !wait_built(&totals, monitor) {
                return TreeResponse::cancelled();
            }
            events_in_range(&totals, TotalsProvider::TOTAL_ATTRIBUTE, query.range)
        } else {
            // validated above
            query.total.unwrap_or_default()
        };

        let detailed = if step < 0 {
            self.analysis
                .state_system(EventTypesProvider::STORE_ID)
                .unwrap_or_else(|| {
                    panic!("analysis reported ready but the event-type store is absent")
                })
        } else {
            match self.analysis.state_system(EventTypesProvider::STORE_ID) {
                Some(detailed) => detailed,
                None => return TreeResponse::failed("detailed statistics are not available"),
            }
        };
        if !wait_built(&detailed, monitor) {
            return TreeResponse::cancelled();
        }

        let breakdown = event_types_in_range(&detailed, query.range);
        TreeResponse::completed(self.tree(&mut ids, total, Some(breakdown)))
    }

    fn tree(
        &self,
        ids: &mut EntryIdMap,
        total: i64,
        breakdown: Option<Vec<(String, i64)>>,
    ) -> TreeModel {
        let root = ids.id_for(&self.trace_name);
        let mut rows = vec![TreeRow {
            id: root,
            parent_id: NO_PARENT,
            values: vec![
                self.trace_name.clone(),
                total.to_string(),
                format_percentage(percentage(total, total)),
            ],
        }];
        if let Some(breakdown) = breakdown {
            for (name, count) in breakdown {
                let id = ids.id_for(&name);
                rows.push(TreeRow {
                    id,
                    parent_id: root,
                    values: vec![
                        name,
                        count.to_string(),
                        format_percentage(percentage(count, total)),
                    ],
                });
            }
        }
        TreeModel::new(COLUMN_LABELS.iter().map(|label| label.to_string()).collect(), rows)
    }
}

/// Blocks until `store` is fully built; false when the store's own
/// cancelled flag or the supplied monitor aborts the wait.
fn wait_built(store: &StateSystem, monitor: Option<&dyn Monitor>) -> bool {
    loop {
        if store.is_cancelled() || monitor.is_some_and(|monitor| monitor.is_cancelled()) {
            return false;
        }
        if let Some(built) = store.wait_until_built_for(POLL_INTERVAL) {
            return built;
        }
    }
}

/// Cumulative count of `path` at `t`, clamped into the store's known span.
fn count_at(store: &StateSystem, path: &str, t: Timestamp) -> i64 {
    if t < store.start_time() {
        return 0;
    }
    let t = t.min(store.current_end_time());
    store
        .query_value_at(path, t)
        .and_then(|value| value.as_int())
        .unwrap_or(0)
}

/// Events counted on `path` within `range`, from the cumulative counter.
fn events_in_range(store: &StateSystem, path: &str, range: TimeRange) -> i64 {
    count_at(store, path, range.end) - count_at(store, path, range.start.saturating_sub(1))
}

/// Per-category counts within `range`, category name order.
fn event_types_in_range(store: &StateSystem, range: TimeRange) -> Vec<(String, i64)> {
    let mut breakdown: Vec<(String, i64)> = store
        .attributes()
        .into_iter()
        .map(|(_, path)| {
            let count = events_in_range(store, &path, range);
            (path, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();
    breakdown.sort();
    breakdown
}

/// Share of `count` in `total`, clamped to 0 when the total is zero.
fn percentage(count: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

fn format_percentage(value: f64) -> String {
    format!("{value:.1}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_system::StateSystem;

    fn counting_store() -> Arc<StateSystem> {
        let (system, mut writer) = StateSystem::begin("totals", 0);
        for t in [10, 20, 30, 40] {
            writer.increment("total", t);
        }
        writer.close(40);
        writer.seal_built();
        system
    }

    #[test]
    fn test_events_in_range_subtracts_cumulative_counts() {
        let store = counting_store();
        assert_eq!(events_in_range(&store, "total", TimeRange::new(0, 40)), 4);
        assert_eq!(events_in_range(&store, "total", TimeRange::new(20, 40)), 3);
        assert_eq!(events_in_range(&store, "total", TimeRange::new(21, 29)), 0);
        assert_eq!(events_in_range(&store, "total", TimeRange::new(15, 25)), 1);
    }

    #[test]
    fn test_count_at_clamps_beyond_known_span() {
        let store = counting_store();
        assert_eq!(count_at(&store, "total", -5), 0);
        assert_eq!(count_at(&store, "total", 1_000), 4);
    }

    #[test]
    fn test_percentage_clamps_on_zero_total() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(60, 100), 60.0);
        assert_eq!(format_percentage(percentage(100, 100)), "100.0");
        assert_eq!(format_percentage(percentage(1, 3)), "33.3");
    }

    #[test]
    fn test_event_types_in_range_sorts_and_filters() {
        let (system, mut writer) = StateSystem::begin("event-types", 0);
        writer.increment("beta", 10);
        writer.increment("alpha", 20);
        writer.increment("beta", 30);
        writer.increment("gamma", 40);
        writer.close(40);
        writer.seal_built();

        let breakdown = event_types_in_range(&system, TimeRange::new(0, 35));
        assert_eq!(
            breakdown,
            vec![("alpha".to_string(), 1), ("beta".to_string(), 2)]
        );
    }
}
