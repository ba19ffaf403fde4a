mod common;

use std::sync::Arc;

use file_drop::config::StorageType;
use file_drop::types::DropError;
use file_drop::AppContext;

use crate::common::{local_context, scratch_root, test_config, PASSWORD};

#[tokio::test]
async fn ceiling_is_shared_with_the_service() {
    let context = local_context(16).await;

    assert_eq!(context.admin.max_upload_size(), 16);
    assert_eq!(context.admin.set_max_upload_size(PASSWORD, 32).unwrap(), 32);
    assert_eq!(context.config.max_upload_size(), 32);
}

#[tokio::test]
async fn wrong_password_leaves_ceiling_unchanged() {
    let context = local_context(16).await;

    let err = context.admin.set_max_upload_size("hunter2", 32).unwrap_err();

    assert!(matches!(err, DropError::Unauthorized));
    assert_eq!(err.status_code(), 401);
    assert_eq!(context.admin.max_upload_size(), 16);
}

#[tokio::test]
async fn unset_password_disables_updates() {
    let mut config = test_config(&scratch_root(), 16);
    config.config_api_password = None;
    let context = AppContext::new(Arc::new(config)).await.unwrap();

    assert!(matches!(
        context.admin.set_max_upload_size(PASSWORD, 32),
        Err(DropError::Unauthorized)
    ));
}

#[tokio::test]
async fn non_positive_ceiling_is_rejected() {
    let context = local_context(16).await;

    let err = context.admin.set_max_upload_size(PASSWORD, 0).unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(context.admin.max_upload_size(), 16);
}

#[tokio::test]
async fn retention_policy_reflects_config() {
    let mut config = test_config(&scratch_root(), 16);
    config.retention_seconds = 7200;
    config.cleanup_interval_seconds = -1;
    let context = AppContext::new(Arc::new(config)).await.unwrap();

    let info = context.admin.retention_policy();

    assert_eq!(info.retention_seconds, 7200);
    assert_eq!(info.cleanup_interval_seconds, -1);
    assert_eq!(info.storage_type, StorageType::FileSystem);
    assert!(!info.auto_cleanup);
    assert!(context.cleanup_worker().start().is_none());
}

#[tokio::test]
async fn s3_without_settings_fails_to_start() {
    let mut config = test_config(&scratch_root(), 16);
    config.storage_type = StorageType::S3;

    let result = AppContext::new(Arc::new(config)).await;

    assert!(matches!(result, Err(DropError::InvalidApplicationState(_))));
}
