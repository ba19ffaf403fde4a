//! Upload, download and delete operations offered to the HTTP layer.

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::config::Config;
use crate::handle::generate_handle;
use crate::path::{self, PathError, PathResolver};
use crate::storage::{ByteStream, ObjectInfo, StorageBackend};
use crate::types::Result;
use crate::upload;

// unreserved characters stay readable, everything else (including `/`) is escaped
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub handle: String,
    pub file_path: String,
    pub size: u64,
}

impl UploadReceipt {
    /// Path part of the download URL, `/<handle>/<escaped file path>`.
    pub fn access_path(&self) -> String {
        format!(
            "/{}/{}",
            self.handle,
            utf8_percent_encode(&self.file_path, PATH_SEGMENT)
        )
    }
}

pub struct Download {
    pub file_name: String,
    pub body: ByteStream,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deleted {
    File(String),
    Handle(String),
}

#[derive(Clone)]
pub struct FileDropService {
    config: Arc<Config>,
    resolver: PathResolver,
    storage: Arc<dyn StorageBackend>,
}

/// Sanitizes a path naming a single file; the bare handle (`.`) is not one.
fn file_path(user_path: &str) -> Result<String> {
    match path::sanitize(user_path)? {
        relative if relative == "." => Err(PathError::EmptyPath.into()),
        relative => Ok(relative),
    }
}

impl FileDropService {
    pub fn new(
        config: Arc<Config>,
        resolver: PathResolver,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self { config, resolver, storage }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Stores `body` under a freshly generated handle.
    pub async fn upload<R>(&self, user_path: &str, body: R) -> Result<UploadReceipt>
    where
        R: AsyncRead + Unpin + Send,
    {
        let handle = generate_handle();

        self.upload_to(&handle, user_path, body).await
    }

    /// Stores `body` at `handle`/`user_path`, replacing what was there. The
    /// size ceiling is read from the configuration on every call.
    pub async fn upload_to<R>(
        &self,
        handle: &str,
        user_path: &str,
        body: R,
    ) -> Result<UploadReceipt>
    where
        R: AsyncRead + Unpin + Send,
    {
        let relative = file_path(user_path)?;
        let key = self.resolver.resolve(handle, &relative)?;
        let limit = self.config.max_upload_size();

        let size = upload::write(self.storage.as_ref(), &key, body, limit).await?;

        log::info!("Stored {} ({} bytes)", key.object_key(), size);

        Ok(UploadReceipt {
            handle: handle.to_owned(),
            file_path: relative,
            size,
        })
    }

    pub async fn download(&self, handle: &str, user_path: &str) -> Result<Download> {
        let relative = file_path(user_path)?;
        let key = self.resolver.resolve(handle, &relative)?;
        let body = self.storage.open(&key).await?;
        let file_name = key.file_name().unwrap_or(relative.as_str()).to_owned();

        log::debug!("Serving {} for download", key.object_key());

        Ok(Download { file_name, body })
    }

    /// Deletes one file, or every file under `handle` when `user_path` is
    /// empty or `.`.
    pub async fn delete(&self, handle: &str, user_path: &str) -> Result<Deleted> {
        let relative = match path::sanitize(user_path) {
            Ok(relative) if relative != "." => Some(relative),
            Ok(_) | Err(PathError::EmptyPath) => None,
            Err(e) => return Err(e.into()),
        };

        match relative {
            Some(relative) => {
                let key = self.resolver.resolve(handle, &relative)?;
                self.storage.delete(&key).await?;

                log::info!("Deleted file {}", key.object_key());

                Ok(Deleted::File(relative))
            }
            None => {
                let key = self.resolver.resolve_handle(handle)?;
                self.storage.delete_prefix(&key).await?;

                log::info!("Deleted handle {} and all its contents", key.object_key());

                Ok(Deleted::Handle(handle.to_owned()))
            }
        }
    }

    pub async fn list(&self, handle: &str) -> Result<Vec<ObjectInfo>> {
        let key = self.resolver.resolve_handle(handle)?;
        if key.is_root() {
            return Err(PathError::PathTraversal(handle.to_owned()).into());
        }

        Ok(self.storage.list(&key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_path_escapes_file_path() {
        let receipt = UploadReceipt {
            handle: "abcdefghijkl".to_owned(),
            file_path: "docs/my report.pdf".to_owned(),
            size: 3,
        };

        assert_eq!(receipt.access_path(), "/abcdefghijkl/docs%2Fmy%20report.pdf");
    }

    #[test]
    fn file_path_rejects_bare_handle() {
        assert!(file_path(".").is_err());
        assert!(file_path("").is_err());
        assert_eq!(file_path("a/./b").unwrap(), "a/b");
    }
}
