use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::resource::Resource;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("memory store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("memory store refused the commit")]
    CommitRefused,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<String, String>,
    fail_commits: bool,
    commits: usize,
}

/// In-memory key/value store with transactional, all-or-nothing commits.
///
/// Cloning creates another handle to the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

/// Writes buffered by an active unit, applied atomically on commit.
#[derive(Debug, Default)]
pub struct StagedWrites {
    ops: Vec<(String, Option<String>)>,
}

impl StagedWrites {
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ops.push((key.into(), Some(value.into())));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push((key.into(), None));
    }

    /// Latest staged value for `key`: `Some(None)` if staged for deletion.
    #[must_use]
    pub fn staged(&self, key: &str) -> Option<Option<&str>> {
        self.ops
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.state.read().ok()?.entries.get(key).cloned()
    }

    /// Copy of every committed entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.state
            .read()
            .map(|state| state.entries.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().map_or(0, |state| state.entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state.read().map_or(0, |state| state.commits)
    }

    /// Make every subsequent commit fail until switched off again.
    pub fn fail_commits(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_commits = fail;
        }
    }
}

impl Resource for MemoryStore {
    type Transaction = StagedWrites;
    type Error = MemoryStoreError;

    fn begin(&self) -> Result<StagedWrites, MemoryStoreError> {
        Ok(StagedWrites::default())
    }

    fn commit(&self, transaction: StagedWrites) -> Result<(), MemoryStoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| MemoryStoreError::LockPoisoned("commit"))?;

        if state.fail_commits {
            return Err(MemoryStoreError::CommitRefused);
        }

        for (key, value) in transaction.ops {
            match value {
                Some(value) => {
                    state.entries.insert(key, value);
                }
                None => {
                    state.entries.remove(&key);
                }
            }
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(&self, transaction: StagedWrites) -> Result<(), MemoryStoreError> {
        drop(transaction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_writes_become_visible() -> Result<(), MemoryStoreError> {
        let store = MemoryStore::new();
        let mut tx = store.begin()?;
        tx.put("customer:1", "ada@example.com");

        assert_eq!(store.get("customer:1"), None);
        store.commit(tx)?;

        assert_eq!(store.get("customer:1").as_deref(), Some("ada@example.com"));
        assert_eq!(store.commit_count(), 1);
        Ok(())
    }

    #[test]
    fn rolled_back_writes_are_discarded() -> Result<(), MemoryStoreError> {
        let store = MemoryStore::new();
        let mut tx = store.begin()?;
        tx.put("customer:1", "ada@example.com");

        store.rollback(tx)?;

        assert!(store.is_empty());
        assert_eq!(store.commit_count(), 0);
        Ok(())
    }

    #[test]
    fn delete_removes_committed_entry() -> Result<(), MemoryStoreError> {
        let store = MemoryStore::new();
        let mut tx = store.begin()?;
        tx.put("token:1", "abc");
        store.commit(tx)?;

        let mut tx = store.begin()?;
        tx.delete("token:1");
        store.commit(tx)?;

        assert_eq!(store.get("token:1"), None);
        Ok(())
    }

    #[test]
    fn refused_commit_applies_nothing() -> Result<(), MemoryStoreError> {
        let store = MemoryStore::new();
        store.fail_commits(true);
        let mut tx = store.begin()?;
        tx.put("customer:1", "ada@example.com");

        let result = store.commit(tx);

        assert_eq!(result, Err(MemoryStoreError::CommitRefused));
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn staged_reports_latest_write_for_key() {
        let mut tx = StagedWrites::default();
        tx.put("k", "first");
        tx.put("k", "second");

        assert_eq!(tx.staged("k"), Some(Some("second")));

        tx.delete("k");
        assert_eq!(tx.staged("k"), Some(None));
        assert_eq!(tx.staged("missing"), None);
        assert_eq!(tx.len(), 3);
    }

    #[test]
    fn clones_share_storage() -> Result<(), MemoryStoreError> {
        let store = MemoryStore::new();
        let handle = store.clone();
        let mut tx = store.begin()?;
        tx.put("k", "v");

        store.commit(tx)?;

        assert_eq!(handle.get("k").as_deref(), Some("v"));
        Ok(())
    }
}
