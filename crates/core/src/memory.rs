//! In-memory store implementations for tests and single-process development.
//!
//! Every store keeps its state behind a `std::sync::Mutex`; none of them hold
//! the lock across an await point. Timestamps handed out by
//! [`MemoryJobStore`] are strictly increasing so ordering by `created_at` is
//! deterministic even when inserts land in the same clock tick.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::import_job::{ImportJob, ImportJobStatus, NewImportJob};
use crate::rate_limit::{CounterStore, WindowUsage};
use crate::stores::{EntryStore, JobStore, ObjectDeletion, ObjectStore, StoreError, StoredObject};
use crate::types::{DbId, Timestamp};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Default)]
struct JobTable {
    next_id: DbId,
    last_ts: Option<Timestamp>,
    rows: Vec<ImportJob>,
}

impl JobTable {
    fn tick(&mut self) -> Timestamp {
        let now = Utc::now();
        let ts = match self.last_ts {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_ts = Some(ts);
        ts
    }
}

/// Job table backed by a `Vec`, ordered by insertion.
#[derive(Default)]
pub struct MemoryJobStore {
    table: Mutex<JobTable>,
    fail_inserts: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.table).rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &NewImportJob) -> Result<ImportJob, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("job_store", "insert rejected"));
        }
        let mut table = lock(&self.table);
        table.next_id += 1;
        let now = table.tick();
        let row = ImportJob {
            id: table.next_id,
            filename: job.filename.clone(),
            file_ref: job.file_ref.clone(),
            status: ImportJobStatus::Pending,
            created_at: now,
            updated_at: now,
            error_message: None,
        };
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<ImportJob>, StoreError> {
        Ok(lock(&self.table).rows.iter().find(|j| j.id == id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<ImportJob>, StoreError> {
        let mut rows = lock(&self.table).rows.clone();
        rows.sort_by_key(|j| (j.created_at, j.id));
        Ok(rows)
    }

    async fn list_by_statuses(
        &self,
        statuses: &[ImportJobStatus],
    ) -> Result<Vec<ImportJob>, StoreError> {
        let mut rows: Vec<ImportJob> = lock(&self.table)
            .rows
            .iter()
            .filter(|j| statuses.contains(&j.status))
            .cloned()
            .collect();
        rows.sort_by_key(|j| (j.created_at, j.id));
        Ok(rows)
    }

    async fn transition(
        &self,
        id: DbId,
        from: &[ImportJobStatus],
        to: ImportJobStatus,
        error_message: Option<&str>,
    ) -> Result<Option<ImportJob>, StoreError> {
        let mut table = lock(&self.table);
        let now = table.tick();
        let Some(row) = table
            .rows
            .iter_mut()
            .find(|j| j.id == id && from.contains(&j.status))
        else {
            return Ok(None);
        };
        row.status = to;
        row.updated_at = now;
        row.error_message = error_message.map(str::to_string);
        Ok(Some(row.clone()))
    }

    async fn delete_many(&self, ids: &[DbId]) -> Result<u64, StoreError> {
        let mut table = lock(&self.table);
        let before = table.rows.len();
        table.rows.retain(|j| !ids.contains(&j.id));
        Ok((before - table.rows.len()) as u64)
    }

    async fn delete_by_statuses(&self, statuses: &[ImportJobStatus]) -> Result<u64, StoreError> {
        let mut table = lock(&self.table);
        let before = table.rows.len();
        table.rows.retain(|j| !statuses.contains(&j.status));
        Ok((before - table.rows.len()) as u64)
    }

    async fn fail_stale_processing(
        &self,
        cutoff: Timestamp,
        error_message: &str,
    ) -> Result<u64, StoreError> {
        let mut table = lock(&self.table);
        let now = table.tick();
        let mut failed = 0;
        for row in table
            .rows
            .iter_mut()
            .filter(|j| j.status == ImportJobStatus::Processing && j.updated_at < cutoff)
        {
            row.status = ImportJobStatus::Failed;
            row.updated_at = now;
            row.error_message = Some(error_message.to_string());
            failed += 1;
        }
        Ok(failed)
    }
}

// ---------------------------------------------------------------------------
// Knowledge-base entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct EntryRow {
    produced_by_job_id: Option<DbId>,
    created_at: Timestamp,
}

/// Knowledge-base entries, reduced to the columns compensation looks at.
#[derive(Default)]
pub struct MemoryEntryStore {
    rows: Mutex<Vec<EntryRow>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry as the import worker would.
    pub fn insert_at(&self, created_at: Timestamp, produced_by_job_id: Option<DbId>) {
        lock(&self.rows).push(EntryRow {
            produced_by_job_id,
            created_at,
        });
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn delete_created_since(&self, watermark: Timestamp) -> Result<u64, StoreError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|e| e.created_at < watermark);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_produced_by(&self, job_id: DbId) -> Result<u64, StoreError> {
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|e| e.produced_by_job_id != Some(job_id));
        Ok((before - rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// Object store keeping bytes in a map. Failure switches let tests exercise
/// the dependency-error paths.
pub struct MemoryObjectStore {
    public_base_url: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    undeletable: Mutex<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            undeletable: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make deletes of this one path fail while the rest succeed.
    pub fn refuse_delete_of(&self, path: impl Into<String>) {
        lock(&self.undeletable).insert(path.into());
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.objects).contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(path).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("http://localhost/files")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("object_store", "upload rejected"));
        }
        lock(&self.objects).insert(path.to_string(), bytes);
        Ok(StoredObject {
            path: path.to_string(),
            public_url: format!("{}/{path}", self.public_base_url),
        })
    }

    async fn delete_many(&self, paths: &[String]) -> Result<ObjectDeletion, StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("object_store", "delete rejected"));
        }
        let undeletable = lock(&self.undeletable);
        let mut objects = lock(&self.objects);
        let mut tally = ObjectDeletion::default();
        for path in paths {
            if undeletable.contains(path) {
                tally.failed += 1;
            } else if objects.remove(path).is_some() {
                tally.deleted += 1;
            }
        }
        Ok(tally)
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Sliding-window log per key. Pruning happens on every hit; a key is
/// dropped once its own window has emptied.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, HitLog>>,
}

struct HitLog {
    window: chrono::Duration,
    hits: VecDeque<Timestamp>,
}

impl HitLog {
    fn is_idle(&self, now: Timestamp) -> bool {
        self.hits.back().map_or(true, |last| *last + self.window <= now)
    }
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits currently recorded under `key`, without pruning.
    pub fn count(&self, key: &str) -> usize {
        lock(&self.windows).get(key).map_or(0, |log| log.hits.len())
    }

    fn record_at(&self, key: &str, window: Duration, now: Timestamp) -> WindowUsage {
        let window =
            chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let mut windows = lock(&self.windows);

        windows.retain(|_, log| !log.is_idle(now));

        let log = windows.entry(key.to_string()).or_insert_with(|| HitLog {
            window,
            hits: VecDeque::new(),
        });
        log.window = window;
        while log.hits.front().is_some_and(|oldest| *oldest + window <= now) {
            log.hits.pop_front();
        }
        log.hits.push_back(now);

        let oldest = log.hits.front().copied().unwrap_or(now);
        WindowUsage {
            count: log.hits.len() as u64,
            reset_at: oldest + window,
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn record_hit(&self, key: &str, window: Duration) -> Result<WindowUsage, StoreError> {
        Ok(self.record_at(key, window, Utc::now()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(name: &str) -> NewImportJob {
        NewImportJob {
            filename: name.to_string(),
            file_ref: format!("imports/{name}"),
        }
    }

    #[tokio::test]
    async fn inserted_jobs_are_pending_with_increasing_timestamps() {
        let store = MemoryJobStore::new();
        let a = store.insert(&new_job("a.txt")).await.unwrap();
        let b = store.insert(&new_job("b.txt")).await.unwrap();
        assert_eq!(a.status, ImportJobStatus::Pending);
        assert!(b.created_at > a.created_at);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[tokio::test]
    async fn transition_respects_guard() {
        let store = MemoryJobStore::new();
        let job = store.insert(&new_job("a.txt")).await.unwrap();

        let none = store
            .transition(job.id, &[ImportJobStatus::Processing], ImportJobStatus::Completed, None)
            .await
            .unwrap();
        assert!(none.is_none());

        let moved = store
            .transition(job.id, &[ImportJobStatus::Pending], ImportJobStatus::Processing, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.status, ImportJobStatus::Processing);
        assert_eq!(moved.created_at, job.created_at);
        assert!(moved.updated_at > job.updated_at);
    }

    #[tokio::test]
    async fn fail_stale_only_touches_old_processing_jobs() {
        let store = MemoryJobStore::new();
        let stale = store.insert(&new_job("stale.txt")).await.unwrap();
        store
            .transition(stale.id, &[ImportJobStatus::Pending], ImportJobStatus::Processing, None)
            .await
            .unwrap();
        let queued = store.insert(&new_job("queued.txt")).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let failed = store.fail_stale_processing(cutoff, "stale").await.unwrap();
        assert_eq!(failed, 1);

        let stale = store.find_by_id(stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, ImportJobStatus::Failed);
        let queued = store.find_by_id(queued.id).await.unwrap().unwrap();
        assert_eq!(queued.status, ImportJobStatus::Pending);
    }

    #[tokio::test]
    async fn entry_watermark_is_inclusive() {
        let store = MemoryEntryStore::new();
        let t0 = Utc::now();
        store.insert_at(t0 - chrono::Duration::seconds(1), None);
        store.insert_at(t0, None);
        store.insert_at(t0 + chrono::Duration::seconds(1), None);
        assert_eq!(store.delete_created_since(t0).await.unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn object_delete_counts_only_existing() {
        let store = MemoryObjectStore::default();
        store.put("imports/a", b"x".to_vec(), "text/plain").await.unwrap();
        let deleted = store
            .delete_many(&["imports/a".to_string(), "imports/missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, ObjectDeletion { deleted: 1, failed: 0 });
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn object_delete_continues_past_a_refused_path() {
        let store = MemoryObjectStore::default();
        store.put("imports/a", b"x".to_vec(), "text/plain").await.unwrap();
        store.put("imports/b", b"x".to_vec(), "text/plain").await.unwrap();
        store.refuse_delete_of("imports/a");

        let tally = store
            .delete_many(&["imports/a".to_string(), "imports/b".to_string()])
            .await
            .unwrap();

        assert_eq!(tally, ObjectDeletion { deleted: 1, failed: 1 });
        assert!(store.contains("imports/a"));
        assert!(!store.contains("imports/b"));
    }

    #[test]
    fn counter_window_slides() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);
        let t0 = Utc::now();

        assert_eq!(store.record_at("k", window, t0).count, 1);
        assert_eq!(store.record_at("k", window, t0 + chrono::Duration::seconds(30)).count, 2);

        // The first hit has left the window; the second is still inside.
        let usage = store.record_at("k", window, t0 + chrono::Duration::seconds(61));
        assert_eq!(usage.count, 2);
        assert_eq!(usage.reset_at, t0 + chrono::Duration::seconds(90));
    }

    #[test]
    fn idle_keys_are_dropped() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(10);
        let t0 = Utc::now();
        store.record_at("idle", window, t0);
        store.record_at("busy", window, t0 + chrono::Duration::seconds(20));
        assert_eq!(store.count("idle"), 0);
        assert_eq!(store.count("busy"), 1);
    }

    #[test]
    fn short_windows_do_not_evict_long_ones() {
        let store = MemoryCounterStore::new();
        let t0 = Utc::now();
        store.record_at("day", Duration::from_secs(86_400), t0);
        store.record_at("minute", Duration::from_secs(60), t0 + chrono::Duration::seconds(120));
        assert_eq!(store.count("day"), 1);
    }
}
