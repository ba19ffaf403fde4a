use std::io::Cursor;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fastrace_macro::trace;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::path::StorageKey;
use crate::storage::{
    ByteStream, ObjectClient, ObjectInfo, Result, S3Client, StorageBackend, StorageError,
    SweepReport,
};

/// Remote object store variant. The storage key relative to the root is
/// used verbatim as the object key; no directory markers are written.
#[derive(Debug)]
pub struct RemoteObjectStore<C> {
    client: C,
}

pub type S3ObjectStore = RemoteObjectStore<S3Client>;

impl<C> RemoteObjectStore<C>
where
    C: ObjectClient,
{
    pub fn new(client: C) -> Self {
        RemoteObjectStore { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait::async_trait]
impl<C> StorageBackend for RemoteObjectStore<C>
where
    C: ObjectClient + 'static,
{
    fn storage_type(&self) -> &'static str {
        crate::consts::STORAGE_TYPE_S3
    }

    /// Buffers the whole body before a single put, so nothing is committed
    /// unless the body was read to the end without error.
    #[trace(name = "object_store::save")]
    async fn save(
        &self,
        key: &StorageKey,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64> {
        let mut buffer = Vec::new();
        body.read_to_end(&mut buffer).await.map_err(|e| {
            StorageError::IoError(format!(
                "unable to read content for object {}: {:?}",
                key.object_key(),
                e
            ))
        })?;

        let written = buffer.len() as u64;
        self.client
            .put_object(key.object_key(), Bytes::from(buffer))
            .await?;

        Ok(written)
    }

    #[trace(name = "object_store::open")]
    async fn open(&self, key: &StorageKey) -> Result<ByteStream> {
        match self.client.get_object(key.object_key()).await? {
            Some(data) => Ok(Box::pin(Cursor::new(data))),
            None => Err(StorageError::NotFound(key.object_key().to_owned())),
        }
    }

    #[trace(name = "object_store::delete")]
    async fn delete(&self, key: &StorageKey) -> Result<()> {
        // deleting a missing object succeeds on S3, so existence is checked first
        if self.client.head_object(key.object_key()).await?.is_none() {
            return Err(StorageError::NotFound(key.object_key().to_owned()));
        }

        self.client.delete_object(key.object_key()).await
    }

    /// Best effort: a listing failure fails the call, individual delete
    /// failures are logged and skipped.
    #[trace(name = "object_store::delete_prefix")]
    async fn delete_prefix(&self, prefix: &StorageKey) -> Result<()> {
        if prefix.is_root() {
            return Err(StorageError::ForbiddenRoot(prefix.path().display().to_string()));
        }

        let object_prefix = prefix.object_prefix();
        let mut token = None;
        let mut deleted = 0_usize;

        loop {
            let page = self.client.list_page(&object_prefix, token).await?;

            for object in page.objects {
                match self.client.delete_object(&object.key).await {
                    Ok(()) => deleted += 1,
                    Err(e) => log::warn!("Failed to delete object {}: {}", object.key, e),
                }
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        log::debug!("Deleted {} object(s) under {}", deleted, object_prefix);

        Ok(())
    }

    #[trace(name = "object_store::list")]
    async fn list(&self, prefix: &StorageKey) -> Result<Vec<ObjectInfo>> {
        let object_prefix = if prefix.is_root() {
            String::new()
        } else {
            prefix.object_prefix()
        };
        let mut token = None;
        let mut objects = Vec::new();

        loop {
            let page = self.client.list_page(&object_prefix, token).await?;

            objects.extend(page.objects.into_iter().map(|object| ObjectInfo {
                key: object.key,
                size: object.size,
                last_modified: object.last_modified,
            }));

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(objects)
    }

    /// Expiry is judged per object, not per handle: the store reports last
    /// modified times for objects only.
    #[trace(name = "object_store::sweep_expired")]
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<SweepReport> {
        let mut token = None;
        let mut report = SweepReport::default();

        loop {
            let page = self.client.list_page("", token).await?;

            for object in page.objects {
                report.scanned += 1;

                if object.last_modified > cutoff {
                    log::trace!(
                        "Keeping object {}, last modified {}",
                        object.key,
                        object.last_modified
                    );
                    continue;
                }

                match self.client.delete_object(&object.key).await {
                    Ok(()) => {
                        log::info!("Deleted expired object {}", object.key);
                        report.removed += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to delete expired object {}: {}", object.key, e);
                        report.failed += 1;
                    }
                }
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(report)
    }
}
