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

//! Background builder of the segment-store stage.

use super::listener::{ListenerId, SegmentListener};
use super::resolver::SegmentResolver;
use super::segment::Segment;
use super::store::SegmentStore;
use crate::artifact;
use crate::event::EventSource;
use crate::state_system::StateSystem;
use dottrace_common::{BuildState, CancellationMonitor, InitLatch, Monitor, ScheduleError, ScheduleResult};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cadence of cancellation polls while parked.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Segments committed and signalled per batch.
const BATCH_SIZE: usize = 128;

/// Builds the segment store from the state-system stage's output on a
/// worker thread.
///
/// The worker parks on a write-once input cell until the orchestrator
/// hands it the interval store (or `None` when the upstream stage failed);
/// the builder never sequences that dependency itself. Registered
/// listeners are notified once per committed batch, in append order.
pub struct SegmentStoreBuilder {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    id: Mutex<String>,
    name: Mutex<String>,
    trace: Mutex<Option<Arc<dyn EventSource>>>,
    resolver: Mutex<Option<Box<dyn SegmentResolver>>>,
    artifact: Mutex<Option<PathBuf>>,
    input: Mutex<Option<Option<Arc<StateSystem>>>>,
    input_set: Condvar,
    store: RwLock<Option<Arc<SegmentStore>>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn SegmentListener>)>>,
    next_listener: AtomicU64,
    state: Mutex<BuildState>,
    completion: InitLatch,
    cancel: CancellationMonitor,
    disposed: AtomicBool,
}

impl SegmentStoreBuilder {
    /// Creates an idle builder with no resolver.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            shared: Arc::new(Shared {
                name: Mutex::new(id.clone()),
                id: Mutex::new(id),
                trace: Mutex::new(None),
                resolver: Mutex::new(None),
                artifact: Mutex::new(None),
                input: Mutex::new(None),
                input_set: Condvar::new(),
                store: RwLock::new(None),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                state: Mutex::new(BuildState::NotStarted),
                completion: InitLatch::new(),
                cancel: CancellationMonitor::new(),
                disposed: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Binds the trace this build belongs to.
    pub fn set_trace(&self, trace: Arc<dyn EventSource>) {
        *self.shared.trace.lock() = Some(trace);
    }

    /// Installs the derivation rule; must happen before `schedule`.
    pub fn set_resolver(&self, resolver: Box<dyn SegmentResolver>) {
        *self.shared.resolver.lock() = Some(resolver);
    }

    /// Sets the `.dat` artifact used for reuse and persistence.
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

    /// Resolves the worker's input dependency: the interval store to derive
    /// segments from, or `None` when the upstream stage did not initialize.
    pub fn set_input(&self, input: Option<Arc<StateSystem>>) {
        let mut slot = self.shared.input.lock();
        if slot.is_none() {
            *slot = Some(input);
            self.shared.input_set.notify_all();
        }
    }

    /// Registers a progress listener; legal at any time, including during
    /// active construction.
    pub fn add_listener(&self, listener: Arc<dyn SegmentListener>) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.lock().push((id, listener));
        id
    }

    /// Removes a previously registered listener.
    pub fn remove_listener(&self, id: ListenerId) {
        self.shared.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }

    /// Begins asynchronous construction; see
    /// [`StateSystemBuilder::schedule`](crate::state_system::StateSystemBuilder::schedule)
    /// for the acceptance rules, which are identical.
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

        debug!(id = %self.id(), "segment store build scheduled");
        let shared = Arc::clone(&self.shared);
        *self.worker.lock() = Some(thread::spawn(move || run_build(shared)));
        Ok(())
    }

    /// Blocks until segment construction finishes or a cancellation signal
    /// (internal or from `monitor`) takes effect; false on cancellation or
    /// failure.
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

    /// The segment store, `None` before any segment was committed. The
    /// returned handle supports concurrent reads while appends continue.
    pub fn segment_store(&self) -> Option<Arc<SegmentStore>> {
        self.shared.store.read().clone()
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

    /// Cancels the build, joins the worker and drops the store and
    /// listeners. Safe to call whether or not construction ever started.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        *self.shared.store.write() = None;
        self.shared.listeners.lock().clear();
        *self.shared.trace.lock() = None;
    }
}

fn run_build(shared: Arc<Shared>) {
    let artifact_path = shared.artifact.lock().clone();

    if let Some(path) = artifact_path.as_deref() {
        if let Some(segments) = attach_persisted(path) {
            let store = Arc::new(SegmentStore::from_segments(segments));
            *shared.store.write() = Some(Arc::clone(&store));
            notify(&shared, &store.snapshot());
            *shared.state.lock() = BuildState::Built;
            shared.completion.signal(true);
            info!(segments = store.len(), path = %path.display(), "attached persisted segment store");
            return;
        }
    }

    // Park until the orchestrator resolves the upstream dependency.
    let input = loop {
        if shared.cancel.is_cancelled() {
            finish_cancelled(&shared);
            return;
        }
        let mut slot = shared.input.lock();
        if let Some(input) = slot.clone() {
            break input;
        }
        let _ = shared.input_set.wait_for(&mut slot, POLL_INTERVAL);
        if let Some(input) = slot.clone() {
            break input;
        }
    };

    let Some(state_system) = input else {
        warn!(id = %shared.id.lock(), "segment store build failed: no state system available");
        *shared.state.lock() = BuildState::Failed;
        shared.completion.signal(false);
        return;
    };

    // Segment derivation reads the final interval state.
    let upstream_built = loop {
        if shared.cancel.is_cancelled() {
            finish_cancelled(&shared);
            return;
        }
        if let Some(outcome) = state_system.wait_until_built_for(POLL_INTERVAL) {
            break outcome;
        }
    };
    if !upstream_built {
        finish_cancelled(&shared);
        return;
    }

    let Some(mut resolver) = shared.resolver.lock().take() else {
        warn!(id = %shared.id.lock(), "segment store build failed: no resolver installed");
        *shared.state.lock() = BuildState::Failed;
        shared.completion.signal(false);
        return;
    };

    let segments = resolver.resolve(&state_system);
    let total = segments.len();
    let store = Arc::new(SegmentStore::new());

    let mut pending = segments.into_iter();
    loop {
        let batch: Vec<Segment> = pending.by_ref().take(BATCH_SIZE).collect();
        if batch.is_empty() {
            break;
        }
        if shared.cancel.is_cancelled() {
            finish_cancelled(&shared);
            return;
        }
        if shared.store.read().is_none() {
            *shared.store.write() = Some(Arc::clone(&store));
        }
        let added = store.append_batch(batch);
        notify(&shared, &added);
    }

    if let Some(path) = artifact_path.as_deref() {
        if let Err(error) = persist(path, &store) {
            warn!(path = %path.display(), %error, "failed to persist segment store artifact");
        }
    }

    *shared.state.lock() = BuildState::Built;
    shared.completion.signal(true);
    debug!(id = %shared.id.lock(), segments = total, "segment store build complete");
}

fn finish_cancelled(shared: &Shared) {
    *shared.state.lock() = BuildState::Cancelled;
    shared.completion.signal(false);
    info!(id = %shared.id.lock(), "segment store build cancelled");
}

fn notify(shared: &Shared, batch: &[Arc<Segment>]) {
    if batch.is_empty() {
        return;
    }
    let listeners: Vec<Arc<dyn SegmentListener>> = shared
        .listeners
        .lock()
        .iter()
        .map(|(_, listener)| Arc::clone(listener))
        .collect();
    for listener in listeners {
        listener.on_new_segments(batch);
    }
}

fn attach_persisted(path: &std::path::Path) -> Option<Vec<Segment>> {
    let (payload, complete) = match artifact::read(path, artifact::SEGMENT_STORE_MAGIC) {
        Ok(read) => read,
        Err(error) => {
            debug!(path = %path.display(), %error, "no reusable segment store artifact");
            return None;
        }
    };
    if !complete {
        debug!(path = %path.display(), "segment store artifact is partial, rebuilding");
        return None;
    }
    match bincode::serde::decode_from_slice::<Vec<Segment>, _>(&payload, bincode::config::standard()) {
        Ok((segments, _)) => Some(segments),
        Err(error) => {
            debug!(path = %path.display(), %error, "undecodable segment store artifact");
            None
        }
    }
}

fn persist(path: &std::path::Path, store: &SegmentStore) -> Result<(), artifact::ArtifactError> {
    let segments: Vec<Segment> = store.snapshot().iter().map(|segment| (**segment).clone()).collect();
    let payload = bincode::serde::encode_to_vec(&segments, bincode::config::standard())
        .map_err(|error| artifact::ArtifactError::Codec(error.to_string()))?;
    artifact::write(path, artifact::SEGMENT_STORE_MAGIC, &payload, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecordedTrace;
    use crate::segment_store::resolver::CategorySegmentResolver;
    use crate::state_system::{StateSystem, StateValue};

    fn dummy_trace() -> Arc<RecordedTrace> {
        Arc::new(RecordedTrace::new("trace", Vec::new()))
    }

    fn built_state_system() -> Arc<StateSystem> {
        let (system, mut writer) = StateSystem::begin("event-types", 0);
        writer.modify_attribute("alpha", StateValue::Int(1), 1);
        writer.modify_attribute("beta", StateValue::Int(1), 2);
        writer.close(10);
        writer.seal_built();
        system
    }

    fn ready_builder() -> SegmentStoreBuilder {
        let builder = SegmentStoreBuilder::new("stats");
        builder.set_trace(dummy_trace());
        builder.set_resolver(Box::new(CategorySegmentResolver));
        builder
    }

    #[test]
    fn test_schedule_without_trace_is_rejected() {
        let builder = SegmentStoreBuilder::new("stats");
        assert_eq!(builder.schedule(), Err(ScheduleError::NoTrace("stats".to_string())));
    }

    #[test]
    fn test_store_is_none_before_any_data() {
        let builder = ready_builder();
        builder.schedule().unwrap();
        assert!(builder.segment_store().is_none());
        builder.set_input(Some(built_state_system()));
        assert!(builder.wait_for_completion(None));
        assert_eq!(builder.segment_store().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_input_fails_the_build() {
        let builder = ready_builder();
        builder.schedule().unwrap();
        builder.set_input(None);
        assert!(!builder.wait_for_completion(None));
        assert_eq!(builder.current_state(), BuildState::Failed);
        assert!(!builder.is_cancelled());
    }

    #[test]
    fn test_cancel_while_parked_on_input() {
        let builder = ready_builder();
        builder.schedule().unwrap();
        builder.cancel();
        assert!(!builder.wait_for_completion(None));
        assert!(builder.is_cancelled());
    }

    #[test]
    fn test_listeners_receive_batches_in_order() {
        struct Recorder(Mutex<Vec<String>>);
        impl SegmentListener for Recorder {
            fn on_new_segments(&self, batch: &[Arc<Segment>]) {
                self.0.lock().extend(batch.iter().map(|segment| segment.name.clone()));
            }
        }

        let builder = ready_builder();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        builder.add_listener(Arc::clone(&recorder) as Arc<dyn SegmentListener>);
        builder.schedule().unwrap();
        builder.set_input(Some(built_state_system()));
        assert!(builder.wait_for_completion(None));

        let seen = recorder.0.lock().clone();
        assert_eq!(seen, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_removed_listener_is_not_notified() {
        struct Counter(AtomicU64);
        impl SegmentListener for Counter {
            fn on_new_segments(&self, batch: &[Arc<Segment>]) {
                self.0.fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
        }

        let builder = ready_builder();
        let counter = Arc::new(Counter(AtomicU64::new(0)));
        let id = builder.add_listener(Arc::clone(&counter) as Arc<dyn SegmentListener>);
        builder.remove_listener(id);
        builder.schedule().unwrap();
        builder.set_input(Some(built_state_system()));
        assert!(builder.wait_for_completion(None));
        assert_eq!(counter.0.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_artifact_reuse_restores_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.dat");

        let builder = ready_builder();
        builder.set_artifact_path(path.clone());
        builder.schedule().unwrap();
        builder.set_input(Some(built_state_system()));
        assert!(builder.wait_for_completion(None));
        assert!(path.exists());

        let reuse = SegmentStoreBuilder::new("stats");
        reuse.set_trace(dummy_trace());
        reuse.set_artifact_path(path);
        reuse.schedule().unwrap();
        // no input is ever provided: the artifact alone satisfies the build
        assert!(reuse.wait_for_completion(None));
        assert_eq!(reuse.segment_store().unwrap().len(), 2);
    }
}
