//! Document storage for pairing codes and user profiles
//!
//! The [`CodeStore`] and [`ProfileStore`] traits describe what the pairing
//! flow needs from a document backend. [`CodeStorage`] and [`ProfileStorage`]
//! implement them with an in-memory map, optionally persisted as a JSON file
//! (e.g. `~/.local/share/pairlink/pairing_codes.json`).
//!
//! Every mutation is applied under the collection's write lock and the file
//! is rewritten before the lock is released. If the write fails the mutation
//! is rolled back, so callers never observe a half-applied delete.

use crate::code::{CodeId, CodeRecord, PairingCode, UserId};
use crate::profile::UserProfile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Field filters over the pairing code collection
///
/// All set filters must match. Results are ordered by expiry time, earliest
/// first, then by document id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeQuery {
    code: Option<PairingCode>,
    expires_after: Option<DateTime<Utc>>,
    expires_before: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

impl CodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// `code == code`
    pub fn code_eq(mut self, code: PairingCode) -> Self {
        self.code = Some(code);
        self
    }

    /// `expiryTime > instant`
    pub fn expires_after(mut self, instant: DateTime<Utc>) -> Self {
        self.expires_after = Some(instant);
        self
    }

    /// `expiryTime < instant`
    pub fn expires_before(mut self, instant: DateTime<Utc>) -> Self {
        self.expires_before = Some(instant);
        self
    }

    /// Return at most `n` documents
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether a single document satisfies every filter
    pub fn matches(&self, record: &CodeRecord) -> bool {
        self.code.as_ref().map_or(true, |c| record.code == *c)
            && self.expires_after.map_or(true, |t| record.expiry_time > t)
            && self.expires_before.map_or(true, |t| record.expiry_time < t)
    }

    /// Filter, order and limit an iterator of documents
    pub fn apply<'a>(&self, records: impl Iterator<Item = &'a CodeRecord>) -> Vec<CodeRecord> {
        let mut matched: Vec<CodeRecord> =
            records.filter(|r| self.matches(r)).cloned().collect();
        matched.sort_by(|a, b| {
            a.expiry_time
                .cmp(&b.expiry_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Backend for the pairing code collection
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Write a new document
    async fn insert(&self, record: CodeRecord) -> StorageResult<()>;

    /// Run a field query
    async fn query(&self, query: &CodeQuery) -> StorageResult<Vec<CodeRecord>>;

    /// Read a single document by reference
    async fn get(&self, id: &CodeId) -> StorageResult<Option<CodeRecord>>;

    /// Delete a single document by reference.
    ///
    /// Returns `false` if the document was already gone. At most one of any
    /// number of concurrent deletes of the same id returns `true`.
    async fn delete(&self, id: &CodeId) -> StorageResult<bool>;

    /// Delete several documents atomically: either every present document is
    /// removed or none is. Ids that no longer exist are skipped. Returns the
    /// number of documents removed.
    async fn delete_batch(&self, ids: &[CodeId]) -> StorageResult<usize>;
}

/// Backend for the user profile collection
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &UserId) -> StorageResult<Option<UserProfile>>;
}

/// Optional JSON file backing a collection
#[derive(Debug, Clone)]
struct JsonFile {
    path: Option<PathBuf>,
}

impl JsonFile {
    fn in_memory() -> Self {
        Self { path: None }
    }

    fn at(path: PathBuf) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path: Some(path) })
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load existing data or start empty
    fn load<T: DeserializeOwned + Default>(&self) -> StorageResult<T> {
        let Some(path) = self.path() else {
            return Ok(T::default());
        };

        if !path.exists() {
            debug!("No existing storage at {:?}, creating new", path);
            return Ok(T::default());
        }

        let contents = std::fs::read_to_string(path)?;
        match serde_json::from_str(&contents) {
            Ok(data) => {
                info!("Loaded storage from {:?}", path);
                Ok(data)
            }
            Err(e) => {
                warn!("Failed to parse storage at {:?}, starting fresh: {}", path, e);
                Ok(T::default())
            }
        }
    }

    /// Replace the file contents via a temp file and rename
    fn save<T: Serialize>(&self, data: &T) -> StorageResult<()> {
        let Some(path) = self.path() else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!("Saved storage to {:?}", path);
        Ok(())
    }
}

/// Stored pairing codes, indexed by document id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCodes {
    codes: HashMap<String, CodeRecord>,
}

/// Pairing code collection with optional file persistence
#[derive(Debug)]
pub struct CodeStorage {
    file: JsonFile,
    data: RwLock<StoredCodes>,
}

impl CodeStorage {
    /// Create a collection that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            file: JsonFile::in_memory(),
            data: RwLock::new(StoredCodes::default()),
        }
    }

    /// Create storage at a specific path, loading existing data if present
    pub async fn with_path(path: PathBuf) -> StorageResult<Self> {
        let file = JsonFile::at(path)?;
        let data = file.load()?;
        Ok(Self {
            file,
            data: RwLock::new(data),
        })
    }

    /// Number of documents currently stored
    pub async fn len(&self) -> usize {
        self.data.read().await.codes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.codes.is_empty()
    }
}

#[async_trait]
impl CodeStore for CodeStorage {
    async fn insert(&self, record: CodeRecord) -> StorageResult<()> {
        let key = record.id.to_string();
        let mut data = self.data.write().await;
        let previous = data.codes.insert(key.clone(), record);
        if let Err(e) = self.file.save(&*data) {
            match previous {
                Some(previous) => data.codes.insert(key, previous),
                None => data.codes.remove(&key),
            };
            return Err(e);
        }
        debug!("Inserted pairing code {}", key);
        Ok(())
    }

    async fn query(&self, query: &CodeQuery) -> StorageResult<Vec<CodeRecord>> {
        let data = self.data.read().await;
        Ok(query.apply(data.codes.values()))
    }

    async fn get(&self, id: &CodeId) -> StorageResult<Option<CodeRecord>> {
        let data = self.data.read().await;
        Ok(data.codes.get(&id.to_string()).cloned())
    }

    async fn delete(&self, id: &CodeId) -> StorageResult<bool> {
        let key = id.to_string();
        let mut data = self.data.write().await;
        let Some(removed) = data.codes.remove(&key) else {
            return Ok(false);
        };
        if let Err(e) = self.file.save(&*data) {
            data.codes.insert(key, removed);
            return Err(e);
        }
        debug!("Deleted pairing code {}", key);
        Ok(true)
    }

    async fn delete_batch(&self, ids: &[CodeId]) -> StorageResult<usize> {
        let mut data = self.data.write().await;
        let removed: Vec<(String, CodeRecord)> = ids
            .iter()
            .filter_map(|id| {
                let key = id.to_string();
                data.codes.remove(&key).map(|record| (key, record))
            })
            .collect();

        if removed.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.file.save(&*data) {
            data.codes.extend(removed);
            return Err(e);
        }
        debug!("Deleted {} pairing codes in batch", removed.len());
        Ok(removed.len())
    }
}

/// Stored profiles, indexed by user id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredProfiles {
    profiles: HashMap<String, UserProfile>,
}

/// User profile collection with optional file persistence
#[derive(Debug)]
pub struct ProfileStorage {
    file: JsonFile,
    data: RwLock<StoredProfiles>,
}

impl ProfileStorage {
    /// Create a collection that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            file: JsonFile::in_memory(),
            data: RwLock::new(StoredProfiles::default()),
        }
    }

    /// Create storage at a specific path, loading existing data if present
    pub async fn with_path(path: PathBuf) -> StorageResult<Self> {
        let file = JsonFile::at(path)?;
        let data = file.load()?;
        Ok(Self {
            file,
            data: RwLock::new(data),
        })
    }

    /// Add or update a profile
    pub async fn save_profile(&self, profile: UserProfile) -> StorageResult<()> {
        let key = profile.user_id.to_string();
        let mut data = self.data.write().await;
        let previous = data.profiles.insert(key.clone(), profile);
        if let Err(e) = self.file.save(&*data) {
            match previous {
                Some(previous) => data.profiles.insert(key, previous),
                None => data.profiles.remove(&key),
            };
            return Err(e);
        }
        info!("Saved profile {}", key);
        Ok(())
    }

    /// Number of stored profiles
    pub async fn len(&self) -> usize {
        self.data.read().await.profiles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileStore for ProfileStorage {
    async fn get(&self, user_id: &UserId) -> StorageResult<Option<UserProfile>> {
        let data = self.data.read().await;
        Ok(data.profiles.get(user_id.as_str()).cloned())
    }
}
