use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::path::StorageKey;
use crate::storage::Result;

/// Readable body of a stored object.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// A stored object as reported by [StorageBackend::list].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    // relative to the storage root, `/` separated
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Outcome of one retention sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Storage contract shared by the local disk and remote object store
/// variants. Keys always come from [crate::path::PathResolver].
///
/// Implementations are shared between request handlers and the cleanup
/// worker and must be safe for concurrent use.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    fn storage_type(&self) -> &'static str;

    /// Writes `body` to `key`, replacing any previous content, and returns the
    /// number of bytes stored. A failed save leaves nothing readable at `key`.
    async fn save(
        &self,
        key: &StorageKey,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64>;

    async fn open(&self, key: &StorageKey) -> Result<ByteStream>;

    async fn delete(&self, key: &StorageKey) -> Result<()>;

    /// Removes everything stored below `prefix`. Fails with
    /// [crate::storage::StorageError::ForbiddenRoot] when `prefix` is the
    /// storage root.
    async fn delete_prefix(&self, prefix: &StorageKey) -> Result<()>;

    /// Lists every object below `prefix` with its last modification time,
    /// sorted by key.
    async fn list(&self, prefix: &StorageKey) -> Result<Vec<ObjectInfo>>;

    /// Removes whatever expired at or before `cutoff`. Per-entry failures are
    /// counted in the report; a failure to list aborts the sweep.
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<SweepReport>;
}
