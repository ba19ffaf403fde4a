mod common;

use std::time::Duration;

use chrono::Utc;
use file_drop::cleanup::{SweepOutcome, WorkerState};
use file_drop::storage::SweepReport;

use crate::common::{local_context, local_root, remote_context, set_modified};

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn local_sweep_expires_whole_handles() {
    let context = local_context(1024).await;
    let root = local_root(&context);
    let service = &context.service;

    service.upload_to("stalehandle0", "a/old.txt", &b"old"[..]).await.unwrap();
    service.upload_to("stalehandle0", "older.txt", &b"older"[..]).await.unwrap();
    service.upload_to("mixedhandle0", "old.txt", &b"old"[..]).await.unwrap();
    service.upload_to("mixedhandle0", "fresh.txt", &b"fresh"[..]).await.unwrap();

    set_modified(&root.join("stalehandle0/a/old.txt"), 2 * HOUR);
    set_modified(&root.join("stalehandle0/older.txt"), 3 * HOUR);
    set_modified(&root.join("mixedhandle0/old.txt"), 2 * HOUR);
    set_modified(&root.join("mixedhandle0/fresh.txt"), HOUR / 2);

    let worker = context.cleanup_worker();

    assert_eq!(
        worker.sweep_at(Utc::now()).await,
        SweepOutcome::Completed(SweepReport { scanned: 2, removed: 1, failed: 0 })
    );

    assert!(!root.join("stalehandle0").exists());
    // a single fresh file keeps its whole handle alive
    assert!(root.join("mixedhandle0/old.txt").is_file());
    assert!(root.join("mixedhandle0/fresh.txt").is_file());
}

#[tokio::test]
async fn local_sweep_of_empty_root() {
    let context = local_context(1024).await;

    assert_eq!(
        context.cleanup_worker().run_once().await,
        SweepOutcome::Completed(SweepReport::default())
    );
}

#[tokio::test]
async fn remote_sweep_expires_single_objects() {
    let remote = remote_context(1024);
    let client = remote.store.client();
    let now = Utc::now();

    client
        .insert(
            "mixedhandle0/old.txt",
            bytes::Bytes::from_static(b"o"),
            now - chrono::Duration::hours(2),
        )
        .unwrap();
    client
        .insert(
            "mixedhandle0/fresh.txt",
            bytes::Bytes::from_static(b"f"),
            now - chrono::Duration::minutes(30),
        )
        .unwrap();

    let outcome = remote.context.cleanup_worker().sweep_at(now).await;

    assert_eq!(outcome, SweepOutcome::Completed(SweepReport { scanned: 2, removed: 1, failed: 0 }));
    assert_eq!(client.keys(), Ok(vec!["mixedhandle0/fresh.txt".to_owned()]));
}

#[tokio::test]
async fn started_worker_stops_cleanly() {
    let context = local_context(1024).await;

    let handle = context.cleanup_worker().start().unwrap();
    assert_ne!(handle.state(), WorkerState::Disabled);

    handle.stop().await;
}
