use std::sync::Arc;

use serde::Serialize;

use crate::config::{Config, StorageType};
use crate::types::{DropError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RetentionInfo {
    pub retention_seconds: i64,
    pub cleanup_interval_seconds: i64,
    pub storage_type: StorageType,
    pub auto_cleanup: bool,
}

/// Administrative view of the configuration. The upload ceiling is the only
/// setting that can change while the process runs.
#[derive(Debug)]
pub struct Admin {
    config: Arc<Config>,
}

impl Admin {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn max_upload_size(&self) -> u64 {
        self.config.max_upload_size()
    }

    /// Changes the upload ceiling. Refused unless a password is configured
    /// and `password` matches it.
    pub fn set_max_upload_size(&self, password: &str, size: i64) -> Result<u64> {
        match &self.config.config_api_password {
            Some(expected) if expected == password => (),
            _ => return Err(DropError::Unauthorized),
        }

        let size = u64::try_from(size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| {
                DropError::InvalidArgument(format!(
                    "max upload size must be positive, got {}",
                    size
                ))
            })?;

        log::info!("Setting max upload size to {} bytes", size);
        self.config.set_max_upload_size(size);

        Ok(self.config.max_upload_size())
    }

    pub fn retention_policy(&self) -> RetentionInfo {
        let policy = self.config.retention_policy();

        RetentionInfo {
            retention_seconds: policy.retention_seconds,
            cleanup_interval_seconds: policy.interval_seconds,
            storage_type: self.config.storage_type,
            auto_cleanup: policy.is_enabled(),
        }
    }
}
