//! Minimal object store client surface used by [crate::storage::RemoteObjectStore].
//!
//! [S3Client] talks to any S3 compatible endpoint (AWS, MinIO, R2) through
//! `rust-s3`. [InMemoryObjectClient] keeps objects in a map and is meant for
//! tests and local development.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use s3::error::S3Error;

use crate::storage::{Result, StorageError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of a listing. `next_token` is set while more pages remain.
#[derive(Debug, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

#[async_trait::async_trait]
pub trait ObjectClient: Send + Sync {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;
    /// `Ok(None)` when the object does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Bytes>>;
    async fn head_object(&self, key: &str) -> Result<Option<ObjectSummary>>;
    async fn delete_object(&self, key: &str) -> Result<()>;
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage>;
}

#[derive(Clone, Debug)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

pub struct S3Client {
    bucket: s3::Bucket,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client").field("bucket", &self.bucket.name()).finish()
    }
}

fn s3_error(action: &str, key: &str, e: S3Error) -> StorageError {
    StorageError::IoError(format!("unable to {} object {}: {:?}", action, key, e))
}

fn status_error(action: &str, key: &str, status: u16) -> StorageError {
    StorageError::IoError(format!(
        "unable to {} object {}: unexpected status {}",
        action, key, status
    ))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

impl S3Client {
    pub fn new(settings: &S3Settings) -> Result<Self> {
        let region = s3::Region::Custom {
            region: settings.region.clone(),
            endpoint: settings.endpoint.clone(),
        };

        let credentials = s3::creds::Credentials::new(
            Some(settings.access_key.as_str()),
            Some(settings.secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::IoError(format!("invalid object store credentials: {:?}", e)))?;

        let bucket = s3::Bucket::new(&settings.bucket, region, credentials)
            .map_err(|e| {
                StorageError::IoError(format!(
                    "unable to configure bucket {}: {:?}",
                    settings.bucket, e
                ))
            })?
            .with_path_style();

        log::info!(
            "Object store client initialized for endpoint {}, bucket {}",
            settings.endpoint,
            settings.bucket
        );

        Ok(S3Client { bucket: *bucket })
    }
}

#[async_trait::async_trait]
impl ObjectClient for S3Client {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let response = self
            .bucket
            .put_object(key, &data)
            .await
            .map_err(|e| s3_error("store", key, e))?;

        match response.status_code() {
            status if is_success(status) => Ok(()),
            status => Err(status_error("store", key, status)),
        }
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>> {
        match self.bucket.get_object(key).await {
            Ok(response) => match response.status_code() {
                404 => Ok(None),
                status if is_success(status) => Ok(Some(response.bytes().clone())),
                status => Err(status_error("fetch", key, status)),
            },
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(s3_error("fetch", key, e)),
        }
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectSummary>> {
        let (head, status) = match self.bucket.head_object(key).await {
            Ok(result) => result,
            Err(S3Error::HttpFailWithBody(404, _)) => return Ok(None),
            Err(e) => return Err(s3_error("inspect", key, e)),
        };

        match status {
            404 => Ok(None),
            status if is_success(status) => {
                let last_modified = head
                    .last_modified
                    .as_deref()
                    .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
                    .map(|value| value.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);

                Ok(Some(ObjectSummary {
                    key: key.to_owned(),
                    size: head.content_length.unwrap_or_default().max(0) as u64,
                    last_modified,
                }))
            }
            status => Err(status_error("inspect", key, status)),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| s3_error("delete", key, e))?;

        match response.status_code() {
            status if is_success(status) => Ok(()),
            status => Err(status_error("delete", key, status)),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage> {
        let (result, status) = self
            .bucket
            .list_page(prefix.to_owned(), None, continuation_token, None, None)
            .await
            .map_err(|e| s3_error("list", prefix, e))?;

        if !is_success(status) {
            return Err(status_error("list", prefix, status));
        }

        let objects = result
            .contents
            .into_iter()
            .filter_map(|object| match DateTime::parse_from_rfc3339(&object.last_modified) {
                Ok(last_modified) => Some(ObjectSummary {
                    key: object.key,
                    size: object.size,
                    last_modified: last_modified.with_timezone(&Utc),
                }),
                Err(e) => {
                    log::warn!(
                        "Skipping object {} with unreadable last modified {}: {:?}",
                        object.key,
                        object.last_modified,
                        e
                    );
                    None
                }
            })
            .collect();

        let next_token = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };

        Ok(ObjectPage { objects, next_token })
    }
}

/// Map backed object client. Listing is paginated by key order so callers
/// exercise the same continuation loop as against a real store.
#[derive(Debug)]
pub struct InMemoryObjectClient {
    objects: Mutex<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
    page_size: usize,
    failing_deletes: Mutex<HashSet<String>>,
    failing_listing: AtomicBool,
}

impl Default for InMemoryObjectClient {
    fn default() -> Self {
        Self::with_page_size(1000)
    }
}

impl InMemoryObjectClient {
    pub fn with_page_size(page_size: usize) -> Self {
        InMemoryObjectClient {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            failing_deletes: Mutex::new(HashSet::new()),
            failing_listing: AtomicBool::new(false),
        }
    }

    fn objects(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, (Bytes, DateTime<Utc>)>>> {
        self.objects
            .lock()
            .map_err(|_| StorageError::IoError("object map lock poisoned".to_owned()))
    }

    /// Stores an object with an explicit last modified time.
    pub fn insert(&self, key: &str, data: Bytes, last_modified: DateTime<Utc>) -> Result<()> {
        self.objects()?.insert(key.to_owned(), (data, last_modified));

        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.objects()?.keys().cloned().collect())
    }

    /// Makes every later delete of `key` fail.
    pub fn fail_deletes_of(&self, key: &str) {
        if let Ok(mut failing) = self.failing_deletes.lock() {
            failing.insert(key.to_owned());
        }
    }

    /// Makes every later listing fail.
    pub fn fail_listing(&self, fail: bool) {
        self.failing_listing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ObjectClient for InMemoryObjectClient {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        self.insert(key, data, Utc::now())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.objects()?.get(key).map(|(data, _)| data.clone()))
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectSummary>> {
        Ok(self.objects()?.get(key).map(|(data, last_modified)| ObjectSummary {
            key: key.to_owned(),
            size: data.len() as u64,
            last_modified: *last_modified,
        }))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let failing = self
            .failing_deletes
            .lock()
            .map(|failing| failing.contains(key))
            .unwrap_or(false);

        if failing {
            return Err(StorageError::IoError(format!("unable to delete object {}", key)));
        }

        self.objects()?.remove(key);

        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage> {
        if self.failing_listing.load(Ordering::SeqCst) {
            return Err(StorageError::IoError(format!("unable to list prefix {}", prefix)));
        }

        let objects = self.objects()?;
        let start = match continuation_token {
            Some(token) => Bound::Excluded(token),
            None => Bound::Unbounded,
        };

        let mut matching = objects
            .range((start, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (data, last_modified))| ObjectSummary {
                key: key.clone(),
                size: data.len() as u64,
                last_modified: *last_modified,
            });

        let page: Vec<_> = matching.by_ref().take(self.page_size).collect();
        let next_token = match matching.next() {
            Some(_) => page.last().map(|object| object.key.clone()),
            None => None,
        };

        Ok(ObjectPage { objects: page, next_token })
    }
}
