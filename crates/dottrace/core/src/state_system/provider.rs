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

//! The pattern-evaluation seam of the state-system stage.
//!
//! A `StateProvider` decides what each trace event writes into its
//! sub-store; the builder owns the event loop and the writers. The two
//! shipped providers implement the statistics sub-stores the query layer
//! reads: cumulative event totals and per-event-type counters.

use super::store::StateSystemWriter;
use crate::event::TraceEvent;

/// Per-event hook writing attribute state into one named sub-store.
pub trait StateProvider: Send {
    /// Id of the sub-store this provider fills.
    fn store_id(&self) -> &str;

    /// Processes one event against the sub-store's writer.
    fn on_event(&mut self, event: &TraceEvent, writer: &mut StateSystemWriter);
}

/// Sub-store carrying the cumulative event count of the whole trace.
#[derive(Debug, Default)]
pub struct TotalsProvider;

impl TotalsProvider {
    /// Sub-store id of the totals store.
    pub const STORE_ID: &'static str = "totals";
    /// Attribute holding the cumulative count.
    pub const TOTAL_ATTRIBUTE: &'static str = "total";
}

impl StateProvider for TotalsProvider {
    fn store_id(&self) -> &str {
        Self::STORE_ID
    }

    fn on_event(&mut self, event: &TraceEvent, writer: &mut StateSystemWriter) {
        writer.increment(Self::TOTAL_ATTRIBUTE, event.timestamp);
    }
}

/// Sub-store carrying one cumulative counter per event type.
#[derive(Debug, Default)]
pub struct EventTypesProvider;

impl EventTypesProvider {
    /// Sub-store id of the event-type breakdown store.
    pub const STORE_ID: &'static str = "event-types";
}

impl StateProvider for EventTypesProvider {
    fn store_id(&self) -> &str {
        Self::STORE_ID
    }

    fn on_event(&mut self, event: &TraceEvent, writer: &mut StateSystemWriter) {
        writer.increment(&event.name, event.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_system::store::StateSystem;
    use crate::state_system::StateValue;

    #[test]
    fn test_totals_provider_counts_all_events() {
        let (system, mut writer) = StateSystem::begin(TotalsProvider::STORE_ID, 0);
        let mut provider = TotalsProvider;

        for t in 1..=4 {
            provider.on_event(&TraceEvent::new(t, "any"), &mut writer);
        }
        writer.close(4);

        assert_eq!(
            system.query_value_at(TotalsProvider::TOTAL_ATTRIBUTE, 4),
            Some(StateValue::Int(4))
        );
    }

    #[test]
    fn test_event_types_provider_counts_per_name() {
        let (system, mut writer) = StateSystem::begin(EventTypesProvider::STORE_ID, 0);
        let mut provider = EventTypesProvider;

        provider.on_event(&TraceEvent::new(1, "alpha"), &mut writer);
        provider.on_event(&TraceEvent::new(2, "beta"), &mut writer);
        provider.on_event(&TraceEvent::new(3, "alpha"), &mut writer);
        writer.close(3);

        assert_eq!(system.query_value_at("alpha", 3), Some(StateValue::Int(2)));
        assert_eq!(system.query_value_at("beta", 3), Some(StateValue::Int(1)));
    }
}
