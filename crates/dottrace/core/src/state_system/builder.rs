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

//! Background builder of the state-system stage.

use super::interval::StateSnapshot;
use super::provider::StateProvider;
use super::store::{StateSystem, StateSystemWriter};
use crate::artifact;
use crate::event::EventSource;
use dottrace_common::{BuildState, CancellationMonitor, InitLatch, Monitor, ScheduleError, ScheduleResult};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cadence of cancellation polls while parked on the completion latch.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builds one or more named interval stores from the event stream on a
/// worker thread.
///
/// Lifecycle: `schedule` spawns the worker; `wait_for_initialization`
/// resolves as soon as the stores are open for partial queries; the
/// completion latch resolves when the whole event source was processed,
/// the build was cancelled, or it failed. A valid complete `.ht` artifact
/// short-circuits the event pass while walking the same signals.
pub struct StateSystemBuilder {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    id: Mutex<String>,
    name: Mutex<String>,
    trace: Mutex<Option<Arc<dyn EventSource>>>,
    providers: Mutex<Vec<Box<dyn StateProvider>>>,
    artifact: Mutex<Option<PathBuf>>,
    stores: RwLock<BTreeMap<String, Arc<StateSystem>>>,
    state: Mutex<BuildState>,
    init: InitLatch,
    completion: InitLatch,
    cancel: CancellationMonitor,
    disposed: AtomicBool,
}

impl StateSystemBuilder {
    /// Creates an idle builder with no providers.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            shared: Arc::new(Shared {
                name: Mutex::new(id.clone()),
                id: Mutex::new(id),
                trace: Mutex::new(None),
                providers: Mutex::new(Vec::new()),
                artifact: Mutex::new(None),
                stores: RwLock::new(BTreeMap::new()),
                state: Mutex::new(BuildState::NotStarted),
                init: InitLatch::new(),
                completion: InitLatch::new(),
                cancel: CancellationMonitor::new(),
                disposed: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Registers a provider; must happen before `schedule`.
    pub fn add_provider(&self, provider: Box<dyn StateProvider>) {
        self.shared.providers.lock().push(provider);
    }

    /// Binds the event source consumed by the build.
    pub fn set_trace(&self, trace: Arc<dyn EventSource>) {
        *self.shared.trace.lock() = Some(trace);
    }

    /// Sets the `.ht` artifact used for reuse and persistence.
    pub fn set_artifact_path(&self, path: PathBuf) {
        *self.shared.artifact.lock() = Some(path);
    }

    /// Module id.
    pub fn id(&self) -> String {
        self.shared.id.lock().clone()
    }

    /// Sets the module id.
    pub fn set_id(&self, id: &str) {
        *self.shared.id.lock() = id.to_string();
    }

    /// Module display name.
    pub fn name(&self) -> String {
        self.shared.name.lock().clone()
    }

    /// Sets the module display name.
    pub fn set_name(&self, name: &str) {
        *self.shared.name.lock() = name.to_string();
    }

    /// Begins asynchronous construction.
    ///
    /// Acceptance is synchronous: a builder without a bound trace, a
    /// disposed builder, or one that already reached a terminal state is
    /// rejected. Scheduling an already running or finished build is a
    /// no-op returning success.
    pub fn schedule(&self) -> ScheduleResult {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(ScheduleError::Disposed(self.id()));
        }
        let mut state = self.shared.state.lock();
        match *state {
            BuildState::NotStarted => {}
            BuildState::Initializing | BuildState::Built => return Ok(()),
            BuildState::Cancelled | BuildState::Failed => {
                return Err(ScheduleError::Terminated(self.id()));
            }
        }
        if self.shared.trace.lock().is_none() {
            return Err(ScheduleError::NoTrace(self.id()));
        }
        *state = BuildState::Initializing;
        drop(state);

        debug!(id = %self.id(), "state system build scheduled");
        let shared = Arc::clone(&self.shared);
        *self.worker.lock() = Some(thread::spawn(move || run_build(shared)));
        Ok(())
    }

    /// Blocks until the stores are open for queries or the build resolved
    /// without getting there; returns whether initialization succeeded.
    pub fn wait_for_initialization(&self) -> bool {
        self.shared.init.wait()
    }

    /// Blocks until the build fully completes or resolves as cancelled or
    /// failed; a cancelled `monitor` is propagated into the build. Returns
    /// true only for a complete build.
    pub fn wait_for_completion(&self, monitor: Option<&dyn Monitor>) -> bool {
        loop {
            if let Some(outcome) = self.shared.completion.wait_timeout(POLL_INTERVAL) {
                return outcome;
            }
            if let Some(monitor) = monitor {
                if monitor.is_cancelled() {
                    self.cancel();
                }
            }
        }
    }

    /// Requests early termination. Idempotent; safe before, during and
    /// after the build.
    pub fn cancel(&self) {
        self.shared.cancel.cancel(None);
        let mut state = self.shared.state.lock();
        if *state == BuildState::NotStarted {
            *state = BuildState::Cancelled;
            self.shared.init.signal(false);
            self.shared.completion.signal(false);
        }
    }

    /// Whether the build terminated through cancellation.
    pub fn is_cancelled(&self) -> bool {
        *self.shared.state.lock() == BuildState::Cancelled
    }

    /// Current lifecycle state.
    pub fn current_state(&self) -> BuildState {
        *self.shared.state.lock()
    }

    /// The sub-store registered under `id`, if initialization created it.
    pub fn state_system(&self, id: &str) -> Option<Arc<StateSystem>> {
        self.shared.stores.read().get(id).cloned()
    }

    /// All sub-stores, id order.
    pub fn state_systems(&self) -> Vec<Arc<StateSystem>> {
        self.shared.stores.read().values().cloned().collect()
    }

    /// Diagnostic key/value view of the module.
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        properties.insert("id".to_string(), self.id());
        properties.insert("name".to_string(), self.name());
        properties.insert("state".to_string(), format!("{:?}", self.current_state()));
        if let Some(trace) = self.shared.trace.lock().as_ref() {
            properties.insert("trace".to_string(), trace.name().to_string());
        }
        properties
    }

    /// Cancels the build, joins the worker and drops the stores. Safe to
    /// call whether or not construction ever started.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        self.shared.stores.write().clear();
        *self.shared.trace.lock() = None;
    }
}

fn run_build(shared: Arc<Shared>) {
    let artifact_path = shared.artifact.lock().clone();

    if let Some(path) = artifact_path.as_deref() {
        if let Some(stores) = attach_persisted(path) {
            let count = stores.len();
            let mut table = shared.stores.write();
            for store in stores {
                table.insert(store.id().to_string(), store);
            }
            drop(table);
            *shared.state.lock() = BuildState::Built;
            shared.init.signal(true);
            shared.completion.signal(true);
            info!(stores = count, path = %path.display(), "attached persisted state system");
            return;
        }
    }

    let Some(trace) = shared.trace.lock().clone() else {
        *shared.state.lock() = BuildState::Failed;
        shared.init.signal(false);
        shared.completion.signal(false);
        return;
    };

    let range = trace.time_range();
    let start = range.map(|r| r.start).unwrap_or(0);
    let mut providers = std::mem::take(&mut *shared.providers.lock());

    // One store per distinct sub-store id; providers with the same id
    // share a writer.
    let mut writers: Vec<StateSystemWriter> = Vec::new();
    let mut writer_of: Vec<usize> = Vec::with_capacity(providers.len());
    {
        let mut table = shared.stores.write();
        for provider in &providers {
            let store_id = provider.store_id().to_string();
            let index = writers
                .iter()
                .position(|writer| writer.system().id() == store_id)
                .unwrap_or_else(|| {
                    let (system, writer) = StateSystem::begin(&store_id, start);
                    table.insert(store_id, system);
                    writers.push(writer);
                    writers.len() - 1
                });
            writer_of.push(index);
        }
    }

    // Stores are open; partial queries may start.
    shared.init.signal(true);

    let mut cancelled = false;
    for event in trace.iter() {
        if shared.cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        for (index, provider) in providers.iter_mut().enumerate() {
            provider.on_event(&event, &mut writers[writer_of[index]]);
        }
    }

    if cancelled {
        for mut writer in writers {
            let end = writer.system().current_end_time();
            writer.close(end);
            writer.seal_cancelled();
        }
        *shared.state.lock() = BuildState::Cancelled;
        shared.completion.signal(false);
        info!(id = %shared.id.lock(), "state system build cancelled");
        return;
    }

    let end = range.map(|r| r.end).unwrap_or(start);
    for writer in &mut writers {
        writer.close(end);
    }

    let snapshots: Vec<StateSnapshot> = writers.iter().map(|writer| writer.system().snapshot()).collect();
    for writer in writers {
        writer.seal_built();
    }

    if let Some(path) = artifact_path.as_deref() {
        if let Err(error) = persist(path, &snapshots) {
            warn!(path = %path.display(), %error, "failed to persist state system artifact");
        }
    }

    *shared.state.lock() = BuildState::Built;
    shared.completion.signal(true);
    debug!(id = %shared.id.lock(), stores = snapshots.len(), "state system build complete");
}

fn attach_persisted(path: &std::path::Path) -> Option<Vec<Arc<StateSystem>>> {
    let (payload, complete) = match artifact::read(path, artifact::STATE_SYSTEM_MAGIC) {
        Ok(read) => read,
        Err(error) => {
            debug!(path = %path.display(), %error, "no reusable state system artifact");
            return None;
        }
    };
    if !complete {
        debug!(path = %path.display(), "state system artifact is partial, rebuilding");
        return None;
    }
    let (snapshots, _): (Vec<StateSnapshot>, usize) =
        match bincode::serde::decode_from_slice(&payload, bincode::config::standard()) {
            Ok(decoded) => decoded,
            Err(error) => {
                debug!(path = %path.display(), %error, "undecodable state system artifact");
                return None;
            }
        };
    Some(snapshots.into_iter().map(StateSystem::from_snapshot).collect())
}

fn persist(path: &std::path::Path, snapshots: &[StateSnapshot]) -> Result<(), artifact::ArtifactError> {
    let payload = bincode::serde::encode_to_vec(snapshots, bincode::config::standard())
        .map_err(|error| artifact::ArtifactError::Codec(error.to_string()))?;
    artifact::write(path, artifact::STATE_SYSTEM_MAGIC, &payload, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{RecordedTrace, TraceEvent};
    use crate::state_system::provider::{EventTypesProvider, TotalsProvider};
    use crate::state_system::StateValue;

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

    fn statistics_builder(trace: Arc<RecordedTrace>) -> StateSystemBuilder {
        let builder = StateSystemBuilder::new("stats");
        builder.add_provider(Box::new(TotalsProvider));
        builder.add_provider(Box::new(EventTypesProvider));
        builder.set_trace(trace);
        builder
    }

    #[test]
    fn test_schedule_without_trace_is_rejected() {
        let builder = StateSystemBuilder::new("stats");
        assert_eq!(builder.schedule(), Err(ScheduleError::NoTrace("stats".to_string())));
    }

    #[test]
    fn test_build_produces_both_sub_stores() {
        let builder = statistics_builder(small_trace());
        builder.schedule().unwrap();

        assert!(builder.wait_for_initialization());
        assert!(builder.wait_for_completion(None));

        let totals = builder.state_system(TotalsProvider::STORE_ID).unwrap();
        assert!(totals.wait_until_built());
        assert_eq!(
            totals.query_value_at(TotalsProvider::TOTAL_ATTRIBUTE, 3),
            Some(StateValue::Int(3))
        );

        let types = builder.state_system(EventTypesProvider::STORE_ID).unwrap();
        assert_eq!(types.query_value_at("alpha", 3), Some(StateValue::Int(2)));
        assert_eq!(types.query_value_at("beta", 3), Some(StateValue::Int(1)));
    }

    #[test]
    fn test_schedule_is_idempotent_while_running() {
        let builder = statistics_builder(small_trace());
        builder.schedule().unwrap();
        assert_eq!(builder.schedule(), Ok(()));
        assert!(builder.wait_for_completion(None));
        assert_eq!(builder.schedule(), Ok(()));
    }

    #[test]
    fn test_cancel_before_schedule_resolves_latches() {
        let builder = statistics_builder(small_trace());
        builder.cancel();
        builder.cancel();

        assert!(!builder.wait_for_initialization());
        assert!(!builder.wait_for_completion(None));
        assert!(builder.is_cancelled());
        assert_eq!(builder.schedule(), Err(ScheduleError::Terminated("stats".to_string())));
    }

    #[test]
    fn test_artifact_roundtrip_skips_event_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.ht");

        let builder = statistics_builder(small_trace());
        builder.set_artifact_path(path.clone());
        builder.schedule().unwrap();
        assert!(builder.wait_for_completion(None));
        assert!(path.exists());

        // second build attaches to the artifact without consuming a trace
        let reuse = StateSystemBuilder::new("stats");
        reuse.set_trace(small_trace());
        reuse.set_artifact_path(path);
        reuse.schedule().unwrap();
        assert!(reuse.wait_for_initialization());
        assert!(reuse.wait_for_completion(None));

        let totals = reuse.state_system(TotalsProvider::STORE_ID).unwrap();
        assert_eq!(
            totals.query_value_at(TotalsProvider::TOTAL_ATTRIBUTE, 3),
            Some(StateValue::Int(3))
        );
    }

    #[test]
    fn test_dispose_is_safe_when_never_started() {
        let builder = StateSystemBuilder::new("stats");
        builder.dispose();
        builder.dispose();
    }
}
