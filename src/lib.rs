pub mod admin;
pub mod cleanup;
pub mod config;
pub mod consts;
pub mod handle;
pub mod path;
pub mod service;
pub mod storage;
pub mod trace;
pub mod types;
pub mod upload;

use std::sync::Arc;

use crate::admin::Admin;
use crate::cleanup::CleanupWorker;
use crate::config::{Config, StorageType};
use crate::path::PathResolver;
use crate::service::FileDropService;
use crate::storage::{FileSystem, S3Client, S3ObjectStore, StorageBackend};
use crate::types::{DropError, Result};

/// Everything a serving process needs, wired from one [Config].
pub struct AppContext {
    pub config: Arc<Config>,
    pub storage: Arc<dyn StorageBackend>,
    pub service: FileDropService,
    pub admin: Admin,
}

impl AppContext {
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let resolver = PathResolver::new(&config.storage_base_path).map_err(|e| {
            DropError::InvalidApplicationState(format!(
                "unable to resolve storage base path {}: {:?}",
                config.storage_base_path, e
            ))
        })?;
        let storage = connect_storage(&config, &resolver).await?;

        Ok(Self::with_storage(config, resolver, storage))
    }

    /// Wires the context around an already built backend.
    pub fn with_storage(
        config: Arc<Config>,
        resolver: PathResolver,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        let service = FileDropService::new(config.clone(), resolver, storage.clone());
        let admin = Admin::new(config.clone());

        AppContext { config, storage, service, admin }
    }

    pub fn cleanup_worker(&self) -> CleanupWorker {
        CleanupWorker::new(self.storage.clone(), self.config.retention_policy())
    }
}

async fn connect_storage(
    config: &Config,
    resolver: &PathResolver,
) -> Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match config.storage_type {
        StorageType::FileSystem => {
            let storage = FileSystem::new(resolver.root());
            storage.ensure_root().await?;

            Arc::new(storage)
        }
        StorageType::S3 => {
            let client = S3Client::new(&config.s3_settings()?)?;

            Arc::new(S3ObjectStore::new(client))
        }
    };

    log::info!("Using {} storage", storage.storage_type());

    Ok(storage)
}
