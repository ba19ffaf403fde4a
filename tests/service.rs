mod common;

use file_drop::path::PathError;
use file_drop::service::Deleted;
use file_drop::storage::StorageError;
use file_drop::types::DropError;

use crate::common::{download_all, local_context, local_root, remote_context, PASSWORD};

fn is_size_exceeded(result: &file_drop::types::Result<impl std::fmt::Debug>) -> bool {
    matches!(result, Err(DropError::Storage(StorageError::SizeExceeded(_))))
}

#[tokio::test]
async fn local_upload_round_trip() {
    let context = local_context(1024).await;

    let receipt = context
        .service
        .upload("docs/report.txt", &b"quarterly numbers"[..])
        .await
        .unwrap();

    assert_eq!(receipt.handle.len(), 12);
    assert_eq!(receipt.file_path, "docs/report.txt");
    assert_eq!(receipt.size, 17);
    assert_eq!(receipt.access_path(), format!("/{}/docs%2Freport.txt", receipt.handle));

    let on_disk = local_root(&context).join(&receipt.handle).join("docs/report.txt");
    assert!(on_disk.is_file());

    let download = context.service.download(&receipt.handle, "docs/report.txt").await.unwrap();
    assert_eq!(download.file_name, "report.txt");
    assert_eq!(
        download_all(&context.service, &receipt.handle, "docs/report.txt").await,
        b"quarterly numbers".to_vec()
    );
}

#[tokio::test]
async fn remote_upload_round_trip() {
    let remote = remote_context(1024);
    let service = &remote.context.service;

    let receipt = service.upload(" notes.md/ ", &b"# notes"[..]).await.unwrap();

    assert_eq!(receipt.file_path, "notes.md");
    assert_eq!(
        remote.store.client().keys(),
        Ok(vec![format!("{}/notes.md", receipt.handle)])
    );
    assert_eq!(download_all(service, &receipt.handle, "notes.md").await, b"# notes".to_vec());
}

#[tokio::test]
async fn upload_replaces_existing_file() {
    let context = local_context(1024).await;

    context.service.upload_to("samehandle00", "a.txt", &b"first version"[..]).await.unwrap();
    context.service.upload_to("samehandle00", "a.txt", &b"second"[..]).await.unwrap();

    assert_eq!(download_all(&context.service, "samehandle00", "a.txt").await, b"second".to_vec());
}

#[tokio::test]
async fn local_size_ceiling_is_inclusive() {
    let context = local_context(8).await;
    let root = local_root(&context);

    let receipt = context
        .service
        .upload_to("ceilinghandl", "exact.bin", &[1_u8; 8][..])
        .await
        .unwrap();
    assert_eq!(receipt.size, 8);

    let result = context.service.upload_to("ceilinghandl", "over.bin", &[1_u8; 9][..]).await;
    assert!(is_size_exceeded(&result));
    assert_eq!(result.unwrap_err().status_code(), 413);
    assert!(!root.join("ceilinghandl/over.bin").exists());
}

#[tokio::test]
async fn remote_size_ceiling_commits_nothing() {
    let remote = remote_context(8);
    let service = &remote.context.service;

    service.upload_to("ceilinghandl", "exact.bin", &[1_u8; 8][..]).await.unwrap();
    let result = service.upload_to("ceilinghandl", "over.bin", &[1_u8; 9][..]).await;

    assert!(is_size_exceeded(&result));
    assert_eq!(remote.store.client().keys(), Ok(vec!["ceilinghandl/exact.bin".to_owned()]));
}

#[tokio::test]
async fn ceiling_change_applies_to_next_upload() {
    let context = local_context(4).await;
    let body = [0_u8; 6];

    assert!(is_size_exceeded(&context.service.upload("grow.bin", &body[..]).await));

    context.admin.set_max_upload_size(PASSWORD, 6).unwrap();
    assert_eq!(context.service.upload("grow.bin", &body[..]).await.unwrap().size, 6);

    context.admin.set_max_upload_size(PASSWORD, 5).unwrap();
    assert!(is_size_exceeded(&context.service.upload("grow.bin", &body[..]).await));
}

#[tokio::test]
async fn delete_single_file_keeps_siblings() {
    let context = local_context(1024).await;
    let service = &context.service;

    service.upload_to("deletehandle", "a.txt", &b"a"[..]).await.unwrap();
    service.upload_to("deletehandle", "b.txt", &b"b"[..]).await.unwrap();

    assert_eq!(
        service.delete("deletehandle", "a.txt").await.unwrap(),
        Deleted::File("a.txt".to_owned())
    );

    let listed = service.list("deletehandle").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "deletehandle/b.txt");

    let missing = service.delete("deletehandle", "a.txt").await.unwrap_err();
    assert_eq!(missing.status_code(), 404);
}

#[tokio::test]
async fn delete_whole_handle_on_both_backends() {
    let local = local_context(1024).await;
    let remote = remote_context(1024);

    for service in [&local.service, &remote.context.service] {
        service.upload_to("wholehandle0", "a/b/c.txt", &b"c"[..]).await.unwrap();
        service.upload_to("wholehandle0", "d.txt", &b"d"[..]).await.unwrap();
        service.upload_to("otherhandle0", "e.txt", &b"e"[..]).await.unwrap();

        assert_eq!(
            service.delete("wholehandle0", "").await.unwrap(),
            Deleted::Handle("wholehandle0".to_owned())
        );

        assert!(service.list("wholehandle0").await.unwrap().is_empty());
        assert_eq!(service.list("otherhandle0").await.unwrap().len(), 1);
    }

    assert!(!local_root(&local).join("wholehandle0").exists());
}

#[tokio::test]
async fn deleting_the_root_is_forbidden() {
    let local = local_context(1024).await;
    let remote = remote_context(1024);

    local.service.upload_to("keepmehandle", "a.txt", &b"a"[..]).await.unwrap();
    remote.context.service.upload_to("keepmehandle", "a.txt", &b"a"[..]).await.unwrap();

    for service in [&local.service, &remote.context.service] {
        let err = service.delete(".", "").await.unwrap_err();

        assert!(matches!(err, DropError::Storage(StorageError::ForbiddenRoot(_))));
        assert_eq!(err.status_code(), 403);
        assert_eq!(service.list("keepmehandle").await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn invalid_paths_are_rejected_without_side_effects() {
    let local = local_context(1024).await;
    let remote = remote_context(1024);
    let long = "x".repeat(300);

    for service in [&local.service, &remote.context.service] {
        for path in ["", "   ", "../escape.txt", "a/../../b", "/etc/passwd", long.as_str()] {
            let err = service.upload_to("invalidhndl0", path, &b"payload"[..]).await.unwrap_err();

            assert_eq!(err.status_code(), 400, "path {:?}", path);
        }

        let err = service.upload_to("..", "a.txt", &b"payload"[..]).await.unwrap_err();
        assert!(matches!(
            err,
            DropError::Storage(StorageError::InvalidPath(PathError::PathTraversal(_)))
        ));
    }

    assert_eq!(remote.store.client().keys(), Ok(Vec::new()));
    assert_eq!(std::fs::read_dir(local_root(&local)).unwrap().count(), 0);
}

#[tokio::test]
async fn download_of_missing_file_is_not_found() {
    let context = local_context(1024).await;

    let err = context.service.download("nosuchhandle", "a.txt").await.err().unwrap();

    assert!(matches!(err, DropError::Storage(StorageError::NotFound(_))));
}

#[tokio::test]
async fn uploads_need_a_single_segment_handle() {
    let local = local_context(1024).await;
    let remote = remote_context(1024);

    for service in [&local.service, &remote.context.service] {
        for handle in ["", ".", "a/b"] {
            let err = service.upload_to(handle, "loose.txt", &b"x"[..]).await.unwrap_err();

            assert!(
                matches!(err, DropError::Storage(StorageError::InvalidPath(_))),
                "handle {:?}",
                handle
            );
        }
    }

    assert_eq!(remote.store.client().keys(), Ok(Vec::new()));
    assert_eq!(std::fs::read_dir(local_root(&local)).unwrap().count(), 0);
}
