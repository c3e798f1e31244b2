//! File-backed ledger store.
//!
//! Each job lives in `<dir>/<job_id>.json`. Every write rewrites that file
//! through a temp file, `fsync` and rename, so a crash leaves either the
//! old or the new document on disk and never a torn one.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::debug;

use super::document::{JobDocument, WriteEffect};
use super::store::LedgerStore;
use crate::core::{ArtifactRecord, Job, JobId, JobState, StepRecord, StepStatus};
use crate::errors::LedgerError;

/// A ledger store persisted as one JSON document per job.
///
/// Writes to one job are serialised; writes to different jobs proceed
/// independently.
#[derive(Debug)]
pub struct FileLedgerStore {
    dir: PathBuf,
    locks: DashMap<JobId, Arc<Mutex<()>>>,
}

impl FileLedgerStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: DashMap::new(),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn job_lock(&self, job_id: &JobId) -> Arc<Mutex<()>> {
        self.locks.entry(job_id.clone()).or_default().clone()
    }

    fn release(&self, job_id: &JobId, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(job_id, |_, l| Arc::strong_count(l) == 1);
    }

    fn path_for(&self, job_id: &JobId) -> Result<PathBuf, LedgerError> {
        let id = job_id.as_str();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(LedgerError::Storage(format!(
                "job id '{id}' is not usable as a file name"
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read_document(&self, job_id: &JobId) -> Result<Option<JobDocument>, LedgerError> {
        let path = self.path_for(job_id)?;
        read_document_at(&path).await
    }

    async fn write_document(&self, doc: &JobDocument) -> Result<(), LedgerError> {
        let path = self.path_for(&doc.job.id)?;
        let bytes = serde_json::to_vec_pretty(doc)?;
        tokio::task::spawn_blocking(move || atomic_write_file(&path, &bytes))
            .await
            .map_err(|e| LedgerError::Storage(format!("write task failed: {e}")))??;
        debug!(job_id = %doc.job.id, "ledger document written");
        Ok(())
    }

    /// Loads, mutates and rewrites one document under its job's lock.
    async fn update<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut JobDocument) -> Result<(T, WriteEffect), LedgerError> + Send,
    ) -> Result<T, LedgerError> {
        let lock = self.job_lock(job_id);
        let guard = lock.lock().await;
        let result = self.apply(job_id, f).await;
        drop(guard);
        self.release(job_id, lock);
        result
    }

    async fn apply<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut JobDocument) -> Result<(T, WriteEffect), LedgerError> + Send,
    ) -> Result<T, LedgerError> {
        let mut doc = self
            .read_document(job_id)
            .await?
            .ok_or_else(|| LedgerError::JobNotFound(job_id.to_string()))?;
        let (out, effect) = f(&mut doc)?;
        if effect == WriteEffect::Applied {
            self.write_document(&doc).await?;
        }
        Ok(out)
    }

    async fn create(&self, job: Job) -> Result<(), LedgerError> {
        if self.read_document(&job.id).await?.is_some() {
            return Err(LedgerError::DuplicateJob(job.id.to_string()));
        }
        self.write_document(&JobDocument::new(job)).await
    }
}

async fn read_document_at(path: &Path) -> Result<Option<JobDocument>, LedgerError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn atomic_write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    let stem = path
        .file_name()
        .and_then(|v| v.to_str())
        .unwrap_or("ledger");
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let tmp_path = parent.join(format!(".{stem}.{}.{nanos}.tmp", std::process::id()));

    let file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&tmp_path)?;
    if let Err(err) = persist(file, content, &tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    sync_dir(parent)
}

fn persist(mut file: fs::File, content: &[u8], tmp_path: &Path, path: &Path) -> std::io::Result<()> {
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp_path, path)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn insert_job(&self, job: Job) -> Result<(), LedgerError> {
        let job_id = job.id.clone();
        let lock = self.job_lock(&job_id);
        let guard = lock.lock().await;
        let result = self.create(job).await;
        drop(guard);
        self.release(&job_id, lock);
        result
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, LedgerError> {
        Ok(self.read_document(job_id).await?.map(|d| d.job))
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, LedgerError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_document = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
            if !is_document {
                continue;
            }
            if let Some(doc) = read_document_at(&path).await? {
                jobs.push(doc.job);
            }
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn compare_and_set_job(&self, expected: JobState, job: Job) -> Result<(), LedgerError> {
        let job_id = job.id.clone();
        self.update(&job_id, |doc| {
            doc.compare_and_set_job(expected, job)
                .map(|()| ((), WriteEffect::Applied))
        })
        .await
    }

    async fn get_step(
        &self,
        job_id: &JobId,
        step_index: usize,
    ) -> Result<Option<StepRecord>, LedgerError> {
        Ok(self
            .read_document(job_id)
            .await?
            .and_then(|mut d| d.steps.remove(&step_index)))
    }

    async fn list_steps(&self, job_id: &JobId) -> Result<Vec<StepRecord>, LedgerError> {
        Ok(self
            .read_document(job_id)
            .await?
            .map(|d| d.steps.into_values().collect())
            .unwrap_or_default())
    }

    async fn compare_and_set_step(
        &self,
        expected: Option<StepStatus>,
        record: StepRecord,
    ) -> Result<StepRecord, LedgerError> {
        let job_id = record.job_id.clone();
        self.update(&job_id, |doc| doc.compare_and_set_step(expected, record))
            .await
    }

    async fn put_artifact(&self, record: ArtifactRecord) -> Result<(), LedgerError> {
        let job_id = record.job_id.clone();
        self.update(&job_id, |doc| {
            doc.put_artifact(record).map(|()| ((), WriteEffect::Applied))
        })
        .await
    }

    async fn get_artifact(&self, job_id: &JobId) -> Result<Option<ArtifactRecord>, LedgerError> {
        Ok(self.read_document(job_id).await?.and_then(|d| d.artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobParams;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let job = Job::new(JobParams::new("durable topic"));
        {
            let store = FileLedgerStore::open(dir.path()).unwrap();
            store.insert_job(job.clone()).await.unwrap();
            let started = StepRecord::pending(job.id.clone(), 0, "fetch-context").started();
            store.compare_and_set_step(None, started.clone()).await.unwrap();
            store
                .compare_and_set_step(Some(StepStatus::Running), started.succeeded(json!({"n": 1})))
                .await
                .unwrap();
        }

        let reopened = FileLedgerStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get_job(&job.id).await.unwrap(), Some(job.clone()));
        let steps = reopened.list_steps(&job.id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::Succeeded);
        assert_eq!(steps[0].payload, Some(json!({"n": 1})));
        assert_eq!(reopened.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::open(dir.path()).unwrap();
        let job = Job::new(JobParams::new("topic"));
        store.insert_job(job.clone()).await.unwrap();
        store
            .compare_and_set_job(JobState::Pending, job.transitioned(JobState::Running, None))
            .await
            .unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.json", job.id)]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::open(dir.path()).unwrap();
        let job = Job::with_id(JobId::from("../escape"), JobParams::new("topic"));
        assert!(matches!(
            store.insert_job(job).await,
            Err(LedgerError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_job_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::open(dir.path()).unwrap();
        let id = JobId::from("nope");
        assert!(store.get_job(&id).await.unwrap().is_none());
        assert!(store.list_steps(&id).await.unwrap().is_empty());
        assert!(store.get_artifact(&id).await.unwrap().is_none());
    }

    #[test]
    fn test_failed_write_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("blocked.json");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("occupant"), b"x").unwrap();

        assert!(atomic_write_file(&target, b"{}").is_err());

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["blocked.json".to_string()]);
    }

    #[tokio::test]
    async fn test_jobs_write_independently() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileLedgerStore::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let job = Job::new(JobParams::new(format!("topic {i}")));
                store.insert_job(job.clone()).await.unwrap();
                let started = StepRecord::pending(job.id.clone(), 0, "fetch-context").started();
                store.compare_and_set_step(None, started.clone()).await.unwrap();
                store
                    .compare_and_set_step(Some(StepStatus::Running), started.succeeded(json!(i)))
                    .await
                    .unwrap();
                job.id
            }));
        }
        for handle in handles {
            let job_id = handle.await.unwrap();
            let steps = store.list_steps(&job_id).await.unwrap();
            assert_eq!(steps[0].status, StepStatus::Succeeded);
        }
        assert_eq!(store.list_jobs().await.unwrap().len(), 4);
        assert!(store.locks.is_empty());
    }
}
