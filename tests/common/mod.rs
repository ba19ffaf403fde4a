#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use file_drop::config::Config;
use file_drop::path::PathResolver;
use file_drop::service::FileDropService;
use file_drop::storage::{InMemoryObjectClient, RemoteObjectStore};
use file_drop::AppContext;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use tokio::io::AsyncReadExt;

pub const PASSWORD: &str = "correct horse battery staple";

pub fn rand_string() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

pub fn scratch_root() -> PathBuf {
    std::env::temp_dir().join(format!("file-drop-it-{}", rand_string()))
}

pub fn test_config(root: &Path, max_upload_size: u64) -> Config {
    let mut config = Config::default().with_max_upload_size(max_upload_size);
    config.storage_base_path = root.to_string_lossy().to_string();
    config.retention_seconds = 3600;
    config.cleanup_interval_seconds = 3600;
    config.config_api_password = Some(PASSWORD.to_owned());

    config
}

pub async fn local_context(max_upload_size: u64) -> AppContext {
    let config = Arc::new(test_config(&scratch_root(), max_upload_size));

    AppContext::new(config).await.unwrap()
}

pub struct RemoteContext {
    pub context: AppContext,
    pub store: Arc<RemoteObjectStore<InMemoryObjectClient>>,
}

pub fn remote_context(max_upload_size: u64) -> RemoteContext {
    let root = scratch_root();
    let config = Arc::new(test_config(&root, max_upload_size));
    let store = Arc::new(RemoteObjectStore::new(InMemoryObjectClient::default()));
    let resolver = PathResolver::new(&root).unwrap();
    let context = AppContext::with_storage(config, resolver, store.clone());

    RemoteContext { context, store }
}

pub fn local_root(context: &AppContext) -> PathBuf {
    PathResolver::new(&context.config.storage_base_path)
        .unwrap()
        .root()
        .to_path_buf()
}

pub async fn download_all(service: &FileDropService, handle: &str, path: &str) -> Vec<u8> {
    let mut download = service.download(handle, path).await.unwrap();
    let mut data = Vec::new();
    download.body.read_to_end(&mut data).await.unwrap();

    data
}

/// Backdates a file's modification time by `age`.
pub fn set_modified(path: &Path, age: std::time::Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}
