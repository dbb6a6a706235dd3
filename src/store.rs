//! Flat-file record store
//!
//! Domain records live in a single pretty-printed JSON array. Every mutation
//! reads the whole file, applies the change and writes the whole file back.
//! All operations go through one async mutex, so overlapping requests are
//! applied one after the other instead of losing updates.

use crate::metrics::DOMAINS;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::debug;

/// A tracked domain
///
/// Older data files may hold records with missing keys or keys of their
/// own; missing keys load as empty strings and unknown keys are kept in
/// `extra` so they survive the next write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DomainRecord {
    pub fqdn: String,
    pub private_ip: String,
    pub owner: String,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl DomainRecord {
    #[must_use]
    pub fn new(
        fqdn: impl Into<String>,
        private_ip: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            fqdn: fqdn.into(),
            private_ip: private_ip.into(),
            owner: owner.into(),
            extra: Map::new(),
        }
    }
}

fn publish_count(len: usize) {
    DOMAINS.set(i64::try_from(len).unwrap_or(i64::MAX));
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record at index {index} ({len} records)")]
    NotFound { index: usize, len: usize },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode records: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// True for failures loading the current list (missing or corrupt file)
    #[must_use]
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Parse { .. })
    }
}

/// JSON-file backed list of domain records
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RecordStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record, in stored order
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or not a JSON array of records
    pub async fn list_all(&self) -> Result<Vec<DomainRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let records = self.load().await?;
        publish_count(records.len());
        Ok(records)
    }

    /// Add a record at the end of the list
    ///
    /// # Errors
    ///
    /// Returns an error if the current list cannot be loaded or the new list cannot be written
    pub async fn append(&self, record: DomainRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        records.push(record);
        self.save(&records).await
    }

    /// Replace the record at `index`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if `index` is out of bounds, or an I/O error
    pub async fn replace_at(&self, index: usize, record: DomainRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let len = records.len();
        let slot = records
            .get_mut(index)
            .ok_or(StoreError::NotFound { index, len })?;
        *slot = record;
        self.save(&records).await
    }

    /// Remove and return the record at `index`, keeping the order of the rest
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if `index` is out of bounds, or an I/O error
    pub async fn remove_at(&self, index: usize) -> Result<DomainRecord, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let len = records.len();
        if index >= len {
            return Err(StoreError::NotFound { index, len });
        }
        let removed = records.remove(index);
        self.save(&records).await?;
        Ok(removed)
    }

    async fn load(&self) -> Result<Vec<DomainRecord>, StoreError> {
        let data = fs::read(&self.path).await.map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;

        // an empty file is an empty list
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&data).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, records: &[DomainRecord]) -> Result<(), StoreError> {
        let mut data = serde_json::to_vec_pretty(records).map_err(StoreError::Encode)?;
        data.push(b'\n');

        let tmp = self.tmp_path();
        let write_err = |source: io::Error| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, &data).await.map_err(write_err)?;
        fs::rename(&tmp, &self.path).await.map_err(write_err)?;

        publish_count(records.len());
        debug!(path = %self.path.display(), records = records.len(), "record store saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
