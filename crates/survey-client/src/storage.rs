//! Key-value persistence injected into the credential and answer layers.
//!
//! Two scopes exist: `persistent` survives reloads (credentials, the form
//! instance id) while `session` lives for one tab/session and holds the
//! per-answer record ids used for update-vs-create routing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub mod keys {
    /// Persistent: id of the current questionnaire submission.
    pub const GENERAL_DATA_ID: &str = "general_data_id";
    /// Session: `answer_{general_data_id}_{category_id}_{question_id}` -> record id.
    pub const ANSWER_PREFIX: &str = "answer_";
}

/// Storage abstraction so credential and answer state can be exercised in isolation.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    fn remove_prefixed(&self, prefix: &str) -> Result<usize, StorageError> {
        let doomed: Vec<String> = self
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        for key in &doomed {
            self.remove(key)?;
        }
        Ok(doomed.len())
    }
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("stored value for '{key}' is malformed: {detail}")]
    Malformed { key: String, detail: String },
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("storage mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self.entries.lock().expect("storage mutex poisoned");
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self.entries.lock().expect("storage mutex poisoned");
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self.entries.lock().expect("storage mutex poisoned");
        guard.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let guard = self.entries.lock().expect("storage mutex poisoned");
        Ok(guard.keys().cloned().collect())
    }
}

/// The two storage scopes handed to the client.
#[derive(Clone)]
pub struct StorageScopes {
    pub persistent: Arc<dyn KeyValueStore>,
    pub session: Arc<dyn KeyValueStore>,
}

impl StorageScopes {
    pub fn new(persistent: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self {
            persistent,
            session,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }
}

impl std::fmt::Debug for StorageScopes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageScopes").finish_non_exhaustive()
    }
}
