//! Live run registry
//!
//! Tracks in-flight pipeline runs together with their abort signals and
//! status watches. The registry is explicit shared state passed by `Arc`,
//! not a process-global; terminal runs leave the registry once persisted
//! and are served from the repository afterwards.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use anvil_core::domain::{PipelineRun, RunStatus};

struct RunHandle {
    run: PipelineRun,
    abort_tx: watch::Sender<bool>,
    status_tx: watch::Sender<RunStatus>,
}

/// Registry of live pipeline runs
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<Uuid, RunHandle>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run and returns its abort signal receiver
    pub fn insert(&self, run: PipelineRun) -> watch::Receiver<bool> {
        let (abort_tx, abort_rx) = watch::channel(false);
        let (status_tx, _) = watch::channel(run.status);
        let id = run.id;

        let mut runs = self.runs.lock().expect("registry lock poisoned");
        runs.insert(
            id,
            RunHandle {
                run,
                abort_tx,
                status_tx,
            },
        );
        debug!("Registered run {}", id);
        abort_rx
    }

    /// Mutates a live run and returns the updated snapshot
    ///
    /// Status changes are broadcast to watchers.
    pub fn update<F>(&self, id: Uuid, f: F) -> Option<PipelineRun>
    where
        F: FnOnce(&mut PipelineRun),
    {
        let mut runs = self.runs.lock().expect("registry lock poisoned");
        let handle = runs.get_mut(&id)?;
        f(&mut handle.run);
        handle.status_tx.send_replace(handle.run.status);
        Some(handle.run.clone())
    }

    /// Snapshot of a live run
    pub fn get(&self, id: Uuid) -> Option<PipelineRun> {
        let runs = self.runs.lock().expect("registry lock poisoned");
        runs.get(&id).map(|h| h.run.clone())
    }

    /// Subscribes to status transitions of a live run
    pub fn watch_status(&self, id: Uuid) -> Option<watch::Receiver<RunStatus>> {
        let runs = self.runs.lock().expect("registry lock poisoned");
        runs.get(&id).map(|h| h.status_tx.subscribe())
    }

    /// Signals a live run to abort
    ///
    /// Returns false when the run is unknown or already terminal.
    pub fn abort(&self, id: Uuid) -> bool {
        let runs = self.runs.lock().expect("registry lock poisoned");
        match runs.get(&id) {
            Some(handle) if !handle.run.status.is_terminal() => {
                handle.abort_tx.send_replace(true);
                debug!("Abort signalled for run {}", id);
                true
            }
            _ => false,
        }
    }

    /// Removes a run from the registry, returning its final snapshot
    pub fn remove(&self, id: Uuid) -> Option<PipelineRun> {
        let mut runs = self.runs.lock().expect("registry lock poisoned");
        runs.remove(&id).map(|h| h.run)
    }

    /// Ids of all live runs
    pub fn live_ids(&self) -> Vec<Uuid> {
        let runs = self.runs.lock().expect("registry lock poisoned");
        runs.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let registry = RunRegistry::new();
        let run = PipelineRun::new("r", "abc123");
        let id = run.id;

        registry.insert(run);
        assert!(registry.get(id).is_some());
        assert_eq!(registry.live_ids(), [id]);

        let removed = registry.remove(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_update_broadcasts_status() {
        let registry = RunRegistry::new();
        let run = PipelineRun::new("r", "abc123");
        let id = run.id;
        registry.insert(run);

        let mut rx = registry.watch_status(id).unwrap();
        assert_eq!(*rx.borrow_and_update(), RunStatus::Pending);

        registry.update(id, |r| r.status = RunStatus::Running);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), RunStatus::Running);
    }

    #[test]
    fn test_abort_signal_reaches_receiver() {
        let registry = RunRegistry::new();
        let run = PipelineRun::new("r", "abc123");
        let id = run.id;
        let abort_rx = registry.insert(run);

        assert!(!*abort_rx.borrow());
        assert!(registry.abort(id));
        assert!(*abort_rx.borrow());
    }

    #[test]
    fn test_abort_refused_for_terminal_or_unknown_runs() {
        let registry = RunRegistry::new();
        let run = PipelineRun::new("r", "abc123");
        let id = run.id;
        registry.insert(run);
        registry.update(id, |r| r.status = RunStatus::Succeeded);

        assert!(!registry.abort(id));
        assert!(!registry.abort(Uuid::new_v4()));
    }
}
