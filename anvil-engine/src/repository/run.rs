//! Run record persistence
//!
//! Records are written atomically (temp file + rename) so a crash while
//! persisting never leaves a half-written record for the report interface
//! to trip over.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use anvil_core::domain::PipelineRun;
use anvil_core::EngineError;

/// File-backed store of pipeline run records
pub struct RunRepository {
    dir: PathBuf,
}

impl RunRepository {
    /// Opens (creating if needed) the record store under a state directory
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = state_dir.into().join("runs");
        std::fs::create_dir_all(&dir).map_err(|e| {
            EngineError::Internal(format!("failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Persists a run record
    pub fn save(&self, run: &PipelineRun) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(run)
            .map_err(|e| EngineError::Internal(format!("failed to serialize run: {}", e)))?;

        let path = self.record_path(run.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| {
                EngineError::Internal(format!("failed to write {}: {}", path.display(), e))
            })?;

        debug!("Persisted run {} to {}", run.id, path.display());
        Ok(())
    }

    /// Loads a run record, if present
    pub fn load(&self, id: Uuid) -> Result<Option<PipelineRun>, EngineError> {
        let path = self.record_path(id);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngineError::Internal(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let run = serde_json::from_str(&json).map_err(|e| {
            EngineError::Internal(format!("corrupt run record {}: {}", path.display(), e))
        })?;
        Ok(Some(run))
    }

    /// Lists all records, newest first
    ///
    /// Unreadable records are skipped with a warning rather than failing
    /// the listing.
    pub fn list(&self) -> Result<Vec<PipelineRun>, EngineError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            EngineError::Internal(format!("failed to read {}: {}", self.dir.display(), e))
        })?;

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Internal(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|json| serde_json::from_str::<PipelineRun>(&json).map_err(|e| e.to_string()))
            {
                Ok(run) => runs.push(run),
                Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    /// Removes records whose runs finished before the retention window
    ///
    /// Returns the number of records removed. Records without a finish
    /// timestamp are kept; a live run's record only appears here after a
    /// crash, and keeping it is the safer default.
    pub fn purge_older_than(&self, retention: Duration) -> Result<usize, EngineError> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(retention)
                .map_err(|e| EngineError::Internal(format!("invalid retention: {}", e)))?;

        let mut removed = 0;
        for run in self.list()? {
            let Some(finished_at) = run.finished_at else {
                continue;
            };
            if finished_at < cutoff {
                let path = self.record_path(run.id);
                std::fs::remove_file(&path).map_err(|e| {
                    EngineError::Internal(format!("failed to remove {}: {}", path.display(), e))
                })?;
                debug!("Purged run record {}", run.id);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::domain::RunStatus;

    fn finished_run(age: chrono::Duration) -> PipelineRun {
        let mut run = PipelineRun::new("https://example.com/app.git", "abc123");
        run.status = RunStatus::Succeeded;
        run.created_at = chrono::Utc::now() - age;
        run.finished_at = Some(chrono::Utc::now() - age);
        run
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RunRepository::new(dir.path()).unwrap();
        let run = finished_run(chrono::Duration::zero());

        repo.save(&run).unwrap();
        let loaded = repo.load(run.id).unwrap().unwrap();
        assert_eq!(loaded.id, run.id);
        assert_eq!(loaded.status, RunStatus::Succeeded);
        assert_eq!(loaded.revision, "abc123");
    }

    #[test]
    fn test_load_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RunRepository::new(dir.path()).unwrap();
        assert!(repo.load(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RunRepository::new(dir.path()).unwrap();

        let old = finished_run(chrono::Duration::hours(2));
        let new = finished_run(chrono::Duration::zero());
        repo.save(&old).unwrap();
        repo.save(&new).unwrap();

        let listed = repo.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, new.id);
        assert_eq!(listed[1].id, old.id);
    }

    #[test]
    fn test_purge_respects_retention() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RunRepository::new(dir.path()).unwrap();

        let old = finished_run(chrono::Duration::days(40));
        let recent = finished_run(chrono::Duration::days(1));
        repo.save(&old).unwrap();
        repo.save(&recent).unwrap();

        let removed = repo
            .purge_older_than(Duration::from_secs(30 * 24 * 3600))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(repo.load(old.id).unwrap().is_none());
        assert!(repo.load(recent.id).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_record_skipped_in_listing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = RunRepository::new(dir.path()).unwrap();

        let run = finished_run(chrono::Duration::zero());
        repo.save(&run).unwrap();
        std::fs::write(dir.path().join("runs").join("broken.json"), "{ not json").unwrap();

        let listed = repo.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, run.id);
    }
}
