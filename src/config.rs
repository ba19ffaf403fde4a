use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cleanup::RetentionPolicy;
use crate::consts::{
    DEFAULT_CLEANUP_INTERVAL_SECONDS, DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_RETENTION_SECONDS,
    DEFAULT_S3_REGION, DEFAULT_STORAGE_BASE_PATH, STORAGE_TYPE_FILE_SYSTEM, STORAGE_TYPE_S3,
};
use crate::storage::S3Settings;
use crate::types::{DropError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    FileSystem,
    S3,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::FileSystem => STORAGE_TYPE_FILE_SYSTEM,
            StorageType::S3 => STORAGE_TYPE_S3,
        }
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            STORAGE_TYPE_FILE_SYSTEM => Ok(StorageType::FileSystem),
            STORAGE_TYPE_S3 => Ok(StorageType::S3),
            other => Err(format!("unknown storage type {}", other)),
        }
    }
}

impl Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process configuration. Everything is fixed after start-up except the
/// upload ceiling, which administrative calls may change at any time.
#[derive(Debug)]
pub struct Config {
    pub storage_type: StorageType,
    pub storage_base_path: String,
    pub retention_seconds: i64,
    pub cleanup_interval_seconds: i64,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_bucket: Option<String>,
    pub config_api_password: Option<String>,
    pub trace_console_enabled: bool,
    max_upload_size: AtomicU64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_type: StorageType::FileSystem,
            storage_base_path: DEFAULT_STORAGE_BASE_PATH.to_owned(),
            retention_seconds: DEFAULT_RETENTION_SECONDS,
            cleanup_interval_seconds: DEFAULT_CLEANUP_INTERVAL_SECONDS,
            s3_endpoint: None,
            s3_region: DEFAULT_S3_REGION.to_owned(),
            s3_access_key: None,
            s3_secret_key: None,
            s3_bucket: None,
            config_api_password: None,
            trace_console_enabled: false,
            max_upload_size: AtomicU64::new(DEFAULT_MAX_UPLOAD_SIZE),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

/// Parses `name` if set; unparsable or rejected values fall back to
/// `default` with a warning.
fn parse_var<T>(name: &str, default: T, accept: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Display,
{
    match non_empty_var(name) {
        None => default,
        Some(raw) => match raw.parse::<T>() {
            Ok(value) if accept(&value) => value,
            _ => {
                log::warn!("Invalid {} value '{}', using default {}", name, raw, default);
                default
            }
        },
    }
}

impl Config {
    pub fn from_env() -> Self {
        let storage_type = parse_var("STORAGE_TYPE", StorageType::FileSystem, |_| true);
        let storage_base_path = non_empty_var("STORAGE_BASE_PATH")
            .unwrap_or_else(|| DEFAULT_STORAGE_BASE_PATH.to_owned());
        let max_upload_size =
            parse_var("MAX_UPLOAD_SIZE", DEFAULT_MAX_UPLOAD_SIZE, |size| *size > 0);
        // non-positive values are kept, they disable cleanup
        let retention_seconds = parse_var("RETENTION_SECONDS", DEFAULT_RETENTION_SECONDS, |_| true);
        let cleanup_interval_seconds =
            parse_var("CLEANUP_INTERVAL_SECONDS", DEFAULT_CLEANUP_INTERVAL_SECONDS, |_| true);
        let s3_endpoint = non_empty_var("S3_ENDPOINT");
        let s3_region = non_empty_var("S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_owned());
        let s3_access_key = non_empty_var("S3_ACCESS_KEY");
        let s3_secret_key = non_empty_var("S3_SECRET_KEY");
        let s3_bucket = non_empty_var("S3_BUCKET");
        let config_api_password = non_empty_var("CONFIG_API_PASSWORD");
        let trace_console_enabled = parse_var("TRACE_CONSOLE_ENABLED", false, |_| true);

        Self {
            storage_type,
            storage_base_path,
            retention_seconds,
            cleanup_interval_seconds,
            s3_endpoint,
            s3_region,
            s3_access_key,
            s3_secret_key,
            s3_bucket,
            config_api_password,
            trace_console_enabled,
            max_upload_size: AtomicU64::new(max_upload_size),
        }
    }

    pub fn with_max_upload_size(self, size: u64) -> Self {
        self.max_upload_size.store(size, Ordering::SeqCst);
        self
    }

    /// Current upload ceiling in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size.load(Ordering::SeqCst)
    }

    pub fn set_max_upload_size(&self, size: u64) {
        self.max_upload_size.store(size, Ordering::SeqCst);
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retention_seconds, self.cleanup_interval_seconds)
    }

    /// Object store settings, required when `storage_type` is S3.
    pub fn s3_settings(&self) -> Result<S3Settings> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| DropError::InvalidApplicationState(format!("{} not set", name)))
        };

        let endpoint = required(&self.s3_endpoint, "S3_ENDPOINT")?;
        url::Url::parse(&endpoint).map_err(|e| {
            DropError::InvalidApplicationState(format!(
                "S3_ENDPOINT {} is not a valid url: {}",
                endpoint, e
            ))
        })?;

        Ok(S3Settings {
            endpoint,
            region: self.s3_region.clone(),
            access_key: required(&self.s3_access_key, "S3_ACCESS_KEY")?,
            secret_key: required(&self.s3_secret_key, "S3_SECRET_KEY")?,
            bucket: required(&self.s3_bucket, "S3_BUCKET")?,
        })
    }
}
