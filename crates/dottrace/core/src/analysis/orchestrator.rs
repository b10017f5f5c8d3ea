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

//! The two-stage analysis orchestrator.

use super::supplementary::SupplementaryFiles;
use crate::artifact;
use crate::event::EventSource;
use crate::segment_store::{
    CategorySegmentResolver, ListenerId, SegmentListener, SegmentResolver, SegmentStore,
    SegmentStoreBuilder,
};
use crate::state_system::{EventTypesProvider, StateProvider, StateSystem, StateSystemBuilder, TotalsProvider};
use dottrace_common::{BuildState, CancellationMonitor, InitLatch, Monitor, ScheduleError, ScheduleResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Display-name suffix of the state-system stage.
const STATE_SYSTEM_SUFFIX: &str = " state system";
/// Display-name suffix of the segment-store stage.
const SEGMENT_STORE_SUFFIX: &str = " segment store";
/// Cadence of cancellation polls while parked on the completion latch.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Two-stage trace analysis behind a single readiness barrier.
///
/// Owns one [`StateSystemBuilder`] and one [`SegmentStoreBuilder`],
/// sequences their scheduling and dependency, and resolves a one-shot
/// readiness latch: phase A ("queryable") the moment the state system is
/// open, full completion when both stages finished. Cancellation and
/// disposal fan out to both stages.
pub struct TraceAnalysis {
    id: Mutex<String>,
    name: Mutex<String>,
    trace: Mutex<Option<Arc<dyn EventSource>>>,
    supplementary: Mutex<Option<SupplementaryFiles>>,
    state_builder: StateSystemBuilder,
    segment_builder: SegmentStoreBuilder,
    segment_input: Mutex<String>,
    ready: InitLatch,
    completion: InitLatch,
    state: Mutex<BuildState>,
    monitor: CancellationMonitor,
    launched: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl TraceAnalysis {
    /// Creates the statistics analysis: totals and event-type sub-stores
    /// feeding the category segment resolver.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_components(
            id,
            vec![Box::new(TotalsProvider), Box::new(EventTypesProvider)],
            EventTypesProvider::STORE_ID,
            Box::new(CategorySegmentResolver),
        )
    }

    /// Creates an analysis around custom evaluation collaborators.
    ///
    /// `segment_input` names the sub-store handed to the segment stage
    /// once the state-system stage has initialized.
    pub fn with_components(
        id: impl Into<String>,
        providers: Vec<Box<dyn StateProvider>>,
        segment_input: &str,
        resolver: Box<dyn SegmentResolver>,
    ) -> Self {
        let id = id.into();
        let state_builder = StateSystemBuilder::new(id.clone());
        for provider in providers {
            state_builder.add_provider(provider);
        }
        state_builder.set_name(format!("{id}{STATE_SYSTEM_SUFFIX}").as_str());

        let segment_builder = SegmentStoreBuilder::new(id.clone());
        segment_builder.set_resolver(resolver);
        segment_builder.set_name(format!("{id}{SEGMENT_STORE_SUFFIX}").as_str());

        Self {
            name: Mutex::new(id.clone()),
            id: Mutex::new(id),
            trace: Mutex::new(None),
            supplementary: Mutex::new(None),
            state_builder,
            segment_builder,
            segment_input: Mutex::new(segment_input.to_string()),
            ready: InitLatch::new(),
            completion: InitLatch::new(),
            state: Mutex::new(BuildState::NotStarted),
            monitor: CancellationMonitor::new(),
            launched: AtomicBool::new(false),
            worker: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Analysis id, the stem of both artifact files.
    pub fn id(&self) -> String {
        self.id.lock().clone()
    }

    /// Sets the analysis id and propagates it to both stages.
    pub fn set_id(&self, id: &str) {
        *self.id.lock() = id.to_string();
        self.state_builder.set_id(id);
        self.segment_builder.set_id(id);
    }

    /// Analysis display name.
    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    /// Sets the display name; stage names are derived with fixed suffixes
    /// so diagnostics stay traceable to this analysis.
    pub fn set_name(&self, name: &str) {
        *self.name.lock() = name.to_string();
        self.state_builder.set_name(&format!("{name}{STATE_SYSTEM_SUFFIX}"));
        self.segment_builder.set_name(&format!("{name}{SEGMENT_STORE_SUFFIX}"));
    }

    /// Binds the trace to this analysis and both stages.
    pub fn set_trace(&self, trace: Arc<dyn EventSource>) {
        self.segment_builder.set_trace(Arc::clone(&trace));
        self.state_builder.set_trace(Arc::clone(&trace));
        *self.trace.lock() = Some(trace);
    }

    /// The bound trace, if any.
    pub fn trace(&self) -> Option<Arc<dyn EventSource>> {
        self.trace.lock().clone()
    }

    /// Configures where supplementary artifacts live.
    pub fn set_supplementary(&self, files: SupplementaryFiles) {
        *self.supplementary.lock() = Some(files);
    }

    /// Runs the analysis on a background thread; synchronous acceptance
    /// mirrors the stage builders' rules.
    pub fn schedule(self: &Arc<Self>) -> ScheduleResult {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ScheduleError::Disposed(self.id()));
        }
        {
            let mut state = self.state.lock();
            match *state {
                BuildState::NotStarted => {}
                BuildState::Initializing | BuildState::Built => return Ok(()),
                BuildState::Cancelled | BuildState::Failed => {
                    return Err(ScheduleError::Terminated(self.id()));
                }
            }
            if self.trace.lock().is_none() {
                return Err(ScheduleError::NoTrace(self.id()));
            }
            *state = BuildState::Initializing;
        }
        let this = Arc::clone(self);
        *self.worker.lock() = Some(thread::spawn(move || {
            this.execute(None);
        }));
        Ok(())
    }

    /// Executes the full orchestration sequence on the calling thread.
    ///
    /// Resolves the readiness latch (phase A) as soon as coarse queries can
    /// be answered, then blocks until both stages fully completed. Returns
    /// true only for full completion. Every expected failure is folded into
    /// a failed readiness outcome; the one exception is a missing store
    /// handle after a successful initialization, which is a programming
    /// invariant violation and panics.
    pub fn execute(&self, monitor: Option<&dyn Monitor>) -> bool {
        if self.launched.swap(true, Ordering::AcqRel) {
            // Re-entry joins the in-flight run instead of re-executing.
            return self.wait_for_completion(monitor);
        }
        {
            let mut state = self.state.lock();
            if *state == BuildState::NotStarted {
                *state = BuildState::Initializing;
            } else if state.is_terminal() {
                return *state == BuildState::Built;
            }
        }

        let Some(trace) = self.trace.lock().clone() else {
            return self.finish_failed("no trace bound to the analysis");
        };
        let Some(files) = self.supplementary.lock().clone() else {
            return self.finish_failed("no supplementary storage configured");
        };
        let dir = match files.trace_dir(trace.name()) {
            Ok(dir) => dir,
            Err(error) => {
                return self.finish_failed(&format!("supplementary directory unavailable: {error}"));
            }
        };
        let id = self.id();
        let state_system_file = SupplementaryFiles::state_system_file(&dir, &id);
        let segment_store_file = SupplementaryFiles::segment_store_file(&dir, &id);

        // A state-system artifact paired with a missing or stale segment
        // store must not be served; drop both so the stages rebuild
        // consistently.
        if !artifact::is_reusable(&segment_store_file, artifact::SEGMENT_STORE_MAGIC) {
            if segment_store_file.exists() || state_system_file.exists() {
                info!(analysis = %id, "segment store artifact is stale, invalidating paired state system");
            }
            if let Err(error) = artifact::invalidate(&state_system_file) {
                warn!(%error, "could not invalidate state system artifact");
            }
            if let Err(error) = artifact::invalidate(&segment_store_file) {
                warn!(%error, "could not invalidate segment store artifact");
            }
        }
        self.state_builder.set_artifact_path(state_system_file);
        self.segment_builder.set_artifact_path(segment_store_file);

        if self.observed_cancellation(monitor) {
            return self.finish_cancelled();
        }

        let segment_status = self.segment_builder.schedule();
        let state_status = self.state_builder.schedule();
        if segment_status.is_err() || state_status.is_err() {
            self.cancel_sub_analyses();
            return self.finish_failed("a sub-analysis rejected scheduling");
        }

        if !self.state_builder.wait_for_initialization() {
            self.cancel_sub_analyses();
            if self.observed_cancellation(monitor) {
                return self.finish_cancelled();
            }
            return self.finish_failed("state system initialization failed");
        }

        let input_id = self.segment_input.lock().clone();
        let Some(store) = self.state_builder.state_system(&input_id) else {
            self.ready.signal(false);
            panic!("initialization of the state system stage succeeded but sub-store `{input_id}` is absent");
        };
        self.segment_builder.set_input(Some(store));

        self.ready.signal(true);
        debug!(analysis = %id, "analysis is ready for queries");

        let state_done = self.state_builder.wait_for_completion(monitor);
        let segment_done = self.segment_builder.wait_for_completion(monitor);
        let done = state_done && segment_done;

        let outcome = if done {
            BuildState::Built
        } else if self.monitor.is_cancelled()
            || self.state_builder.is_cancelled()
            || self.segment_builder.is_cancelled()
        {
            BuildState::Cancelled
        } else {
            BuildState::Failed
        };
        *self.state.lock() = outcome;
        self.completion.signal(done);
        info!(analysis = %id, ?outcome, "analysis finished");
        done
    }

    /// Blocks until the readiness barrier resolves; true when coarse
    /// queries may proceed. All waiters observe the same outcome.
    pub fn wait_for_initialization(&self) -> bool {
        self.ready.wait()
    }

    /// Blocks until the analysis and both stages fully completed; a
    /// cancelled `monitor` is propagated into the stages.
    pub fn wait_for_completion(&self, monitor: Option<&dyn Monitor>) -> bool {
        let own = loop {
            if let Some(outcome) = self.completion.wait_timeout(POLL_INTERVAL) {
                break outcome;
            }
            if let Some(monitor) = monitor {
                if monitor.is_cancelled() {
                    self.cancel();
                }
            }
        };
        own && self.state_builder.wait_for_completion(monitor)
            && self.segment_builder.wait_for_completion(monitor)
    }

    /// Requests cancellation of the whole analysis; both stages are
    /// cancelled. Safe at any point of the sequence, including before
    /// scheduling.
    pub fn cancel(&self) {
        self.monitor.cancel(None);
        self.cancel_sub_analyses();
        let mut state = self.state.lock();
        if *state == BuildState::NotStarted {
            *state = BuildState::Cancelled;
            self.ready.signal(false);
            self.completion.signal(false);
        }
    }

    /// Whether the analysis terminated through cancellation.
    pub fn is_cancelled(&self) -> bool {
        *self.state.lock() == BuildState::Cancelled
    }

    /// Current lifecycle state.
    pub fn current_state(&self) -> BuildState {
        *self.state.lock()
    }

    /// The state-system sub-store registered under `id`.
    pub fn state_system(&self, id: &str) -> Option<Arc<StateSystem>> {
        self.state_builder.state_system(id)
    }

    /// All state-system sub-stores.
    pub fn state_systems(&self) -> Vec<Arc<StateSystem>> {
        self.state_builder.state_systems()
    }

    /// The derived segment store, `None` before any segment exists.
    pub fn segment_store(&self) -> Option<Arc<SegmentStore>> {
        self.segment_builder.segment_store()
    }

    /// Registers a segment progress listener.
    pub fn add_listener(&self, listener: Arc<dyn SegmentListener>) -> ListenerId {
        self.segment_builder.add_listener(listener)
    }

    /// Removes a segment progress listener.
    pub fn remove_listener(&self, id: ListenerId) {
        self.segment_builder.remove_listener(id)
    }

    /// Diagnostic properties of the analysis and both stages, the stage
    /// entries prefixed with the stage kind.
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        properties.insert("id".to_string(), self.id());
        properties.insert("name".to_string(), self.name());
        properties.insert("state".to_string(), format!("{:?}", self.current_state()));
        if let Some(trace) = self.trace.lock().as_ref() {
            properties.insert("trace".to_string(), trace.name().to_string());
        }
        for (key, value) in self.state_builder.properties() {
            properties.insert(format!("state system {key}"), value);
        }
        for (key, value) in self.segment_builder.properties() {
            properties.insert(format!("segment store {key}"), value);
        }
        properties
    }

    /// Cancels everything, joins the orchestration thread and disposes
    /// both stages. Safe even when construction never started or failed
    /// midway.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        self.state_builder.dispose();
        self.segment_builder.dispose();
        *self.trace.lock() = None;
    }

    fn cancel_sub_analyses(&self) {
        self.state_builder.cancel();
        self.segment_builder.cancel();
    }

    fn observed_cancellation(&self, monitor: Option<&dyn Monitor>) -> bool {
        self.monitor.is_cancelled() || monitor.is_some_and(|monitor| monitor.is_cancelled())
    }

    fn finish_failed(&self, reason: &str) -> bool {
        warn!(analysis = %self.id(), reason, "analysis readiness failed");
        self.ready.signal(false);
        *self.state.lock() = BuildState::Failed;
        self.completion.signal(false);
        false
    }

    fn finish_cancelled(&self) -> bool {
        info!(analysis = %self.id(), "analysis cancelled");
        self.ready.signal(false);
        *self.state.lock() = BuildState::Cancelled;
        self.completion.signal(false);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{RecordedTrace, TraceEvent};
    use crate::state_system::StateValue;
    use std::sync::atomic::AtomicUsize;

    fn small_trace() -> Arc<RecordedTrace> {
        Arc::new(RecordedTrace::new(
            "small",
            vec![
                TraceEvent::new(1, "alpha"),
                TraceEvent::new(2, "beta"),
                TraceEvent::new(3, "alpha"),
            ],
        ))
    }

    fn analysis_for(trace: Arc<dyn EventSource>, dir: &std::path::Path) -> Arc<TraceAnalysis> {
        let analysis = Arc::new(TraceAnalysis::new("statistics"));
        analysis.set_trace(trace);
        analysis.set_supplementary(SupplementaryFiles::new(dir));
        analysis
    }

    /// Event source counting how many passes were consumed.
    struct CountingTrace {
        inner: Arc<RecordedTrace>,
        passes: Arc<AtomicUsize>,
    }

    impl EventSource for CountingTrace {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn time_range(&self) -> Option<dottrace_common::TimeRange> {
            self.inner.time_range()
        }

        fn iter(&self) -> Box<dyn Iterator<Item = TraceEvent> + Send + '_> {
            self.passes.fetch_add(1, Ordering::SeqCst);
            self.inner.iter()
        }
    }

    #[test]
    fn test_execute_builds_both_stages() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = analysis_for(small_trace(), dir.path());

        assert!(analysis.execute(None));
        assert!(analysis.wait_for_initialization());
        assert_eq!(analysis.current_state(), BuildState::Built);

        let totals = analysis.state_system(TotalsProvider::STORE_ID).unwrap();
        assert_eq!(
            totals.query_value_at(TotalsProvider::TOTAL_ATTRIBUTE, 3),
            Some(StateValue::Int(3))
        );
        assert_eq!(analysis.segment_store().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_trace_fails_readiness_without_raising() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = Arc::new(TraceAnalysis::new("statistics"));
        analysis.set_supplementary(SupplementaryFiles::new(dir.path()));

        assert!(!analysis.execute(None));
        assert!(!analysis.wait_for_initialization());
        assert_eq!(analysis.current_state(), BuildState::Failed);
    }

    #[test]
    fn test_missing_supplementary_fails_readiness() {
        let analysis = Arc::new(TraceAnalysis::new("statistics"));
        analysis.set_trace(small_trace());

        assert!(!analysis.execute(None));
        assert!(!analysis.wait_for_initialization());
    }

    #[test]
    fn test_schedule_runs_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = analysis_for(small_trace(), dir.path());

        analysis.schedule().unwrap();
        assert!(analysis.wait_for_initialization());
        assert!(analysis.wait_for_completion(None));
        assert_eq!(analysis.current_state(), BuildState::Built);
    }

    #[test]
    fn test_artifacts_are_reused_on_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let passes = Arc::new(AtomicUsize::new(0));
        let counting = Arc::new(CountingTrace {
            inner: small_trace(),
            passes: Arc::clone(&passes),
        });

        let first = analysis_for(Arc::clone(&counting) as Arc<dyn EventSource>, dir.path());
        assert!(first.execute(None));
        assert_eq!(passes.load(Ordering::SeqCst), 1);

        let second = analysis_for(counting as Arc<dyn EventSource>, dir.path());
        assert!(second.execute(None));
        // both artifacts were valid: no second pass over the events
        assert_eq!(passes.load(Ordering::SeqCst), 1);
        assert_eq!(second.segment_store().unwrap().len(), 2);
    }

    #[test]
    fn test_stale_segment_store_forces_state_system_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let passes = Arc::new(AtomicUsize::new(0));
        let counting = Arc::new(CountingTrace {
            inner: small_trace(),
            passes: Arc::clone(&passes),
        });

        let first = analysis_for(Arc::clone(&counting) as Arc<dyn EventSource>, dir.path());
        assert!(first.execute(None));
        assert_eq!(passes.load(Ordering::SeqCst), 1);

        let trace_dir = dir.path().join("small");
        let segment_file = SupplementaryFiles::segment_store_file(&trace_dir, "statistics");
        let state_file = SupplementaryFiles::state_system_file(&trace_dir, "statistics");
        std::fs::remove_file(&segment_file).unwrap();
        assert!(state_file.exists());

        let second = analysis_for(counting as Arc<dyn EventSource>, dir.path());
        assert!(second.execute(None));
        // the kept state-system artifact must not be served: a fresh event
        // pass rebuilt both stages
        assert_eq!(passes.load(Ordering::SeqCst), 2);
        assert_eq!(second.segment_store().unwrap().len(), 2);
    }

    #[test]
    fn test_cancel_before_schedule_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = analysis_for(small_trace(), dir.path());

        analysis.cancel();
        analysis.cancel();

        assert!(!analysis.wait_for_initialization());
        assert!(analysis.is_cancelled());
        assert_eq!(analysis.schedule(), Err(ScheduleError::Terminated("statistics".to_string())));
    }

    #[test]
    fn test_name_propagates_with_suffixes() {
        let analysis = TraceAnalysis::new("statistics");
        analysis.set_name("Kernel Statistics");

        let properties = analysis.properties();
        assert_eq!(
            properties.get("state system name").map(String::as_str),
            Some("Kernel Statistics state system")
        );
        assert_eq!(
            properties.get("segment store name").map(String::as_str),
            Some("Kernel Statistics segment store")
        );
    }

    #[test]
    fn test_dispose_is_safe_on_partial_state() {
        let analysis = Arc::new(TraceAnalysis::new("statistics"));
        analysis.dispose();
        analysis.dispose();

        let dir = tempfile::tempdir().unwrap();
        let running = analysis_for(small_trace(), dir.path());
        running.schedule().unwrap();
        running.dispose();
    }
}
