//! Integration tests against a live backend
//!
//! These tests need real credentials in the environment.
//!
//! Run with:
//! ```bash
//! # Dropbox backend
//! export FERRY_TEST_BACKEND=dropbox
//! export DROPBOX_TOKEN=... DROPBOX_APP_KEY=... DROPBOX_APP_SECRET=...
//!
//! # or the SFTP backend
//! export FERRY_TEST_BACKEND=sftp
//! export SFTP_HOST=... SFTP_USERNAME=... SFTP_PRIVATE_KEY_BASE64=...
//!
//! cargo test --features integration
//! # large-object tests
//! cargo test --features slow
//! ```
//!
//! Every test works under its own unique prefix and removes what it
//! created, so suites can run in parallel against a shared account.

#![cfg(feature = "integration")]

use std::sync::Arc;

use ferry::{
    BackendKind, ByteSink, ByteSource, CancellationToken, Credentials, Error, RemoteRef,
    TransferDescriptor, TransferEngine,
};

/// RUST_LOG-driven logging for debugging live failures
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(EnvFilter::from_default_env())
            .init();
    });
}

/// Build the backend selected by FERRY_TEST_BACKEND, or None when the
/// environment is not configured.
fn setup_backend() -> Option<Arc<dyn ferry::StorageBackend>> {
    init_tracing();
    let kind: BackendKind = std::env::var("FERRY_TEST_BACKEND").ok()?.parse().ok()?;
    let credentials = match Credentials::resolve_from_process(kind) {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("Skipping: credentials not available: {err}");
            return None;
        }
    };
    Some(
        ferry::create_backend(credentials, Some("ferry-integration-tests"))
            .expect("Failed to build backend"),
    )
}

fn setup_engine() -> Option<TransferEngine> {
    setup_backend().map(TransferEngine::new)
}

/// Unique per-test prefix so parallel runs do not collide
fn test_ref(test: &str, name: &str) -> RemoteRef {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{test}-{:x}/{name}", nanos % 0xFFFF_FFFF)
        .parse()
        .expect("Failed to build test reference")
}

async fn cleanup(engine: &TransferEngine, reference: &RemoteRef) {
    let _ = engine.delete(reference, &CancellationToken::new()).await;
}

mod object_operations {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_roundtrip() {
        let Some(engine) = setup_engine() else {
            eprintln!("Skipping: FERRY_TEST_BACKEND not configured");
            return;
        };
        let cancel = CancellationToken::new();
        let reference = test_ref("roundtrip", "hello.txt");
        let body = b"Hello, ferry integration test!".to_vec();

        let outcome = engine
            .upload(
                &TransferDescriptor::new(reference.clone()),
                ByteSource::from(body.clone()),
                &cancel,
            )
            .await
            .expect("Failed to upload");
        assert_eq!(outcome.bytes_transferred, body.len() as u64);

        let download = engine
            .download(&reference, &ByteSink::Memory, &cancel)
            .await
            .expect("Failed to download");
        assert_eq!(
            download.body.expect("memory sink returns the body").as_ref(),
            body.as_slice(),
            "Downloaded content doesn't match"
        );

        cleanup(&engine, &reference).await;
    }

    #[tokio::test]
    async fn test_upload_download_via_files() {
        let Some(engine) = setup_engine() else {
            eprintln!("Skipping: FERRY_TEST_BACKEND not configured");
            return;
        };
        let cancel = CancellationToken::new();
        let reference = test_ref("files", "payload.bin");

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source_path = dir.path().join("source.bin");
        let body: Vec<u8> = (0..16 * 1024).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&source_path, &body)
            .await
            .expect("Failed to write source file");

        engine
            .upload(
                &TransferDescriptor::new(reference.clone()),
                ByteSource::File(source_path),
                &cancel,
            )
            .await
            .expect("Failed to upload");

        let target_path = dir.path().join("downloaded.bin");
        engine
            .download(&reference, &ByteSink::File(target_path.clone()), &cancel)
            .await
            .expect("Failed to download");

        let downloaded = tokio::fs::read(&target_path)
            .await
            .expect("Failed to read downloaded file");
        assert_eq!(downloaded, body, "Downloaded content doesn't match");

        cleanup(&engine, &reference).await;
    }

    #[tokio::test]
    async fn test_empty_object() {
        let Some(engine) = setup_engine() else {
            eprintln!("Skipping: FERRY_TEST_BACKEND not configured");
            return;
        };
        let cancel = CancellationToken::new();
        let reference = test_ref("empty", "empty.txt");

        engine
            .upload(
                &TransferDescriptor::new(reference.clone()),
                ByteSource::from(Vec::new()),
                &cancel,
            )
            .await
            .expect("Failed to upload empty object");

        let download = engine
            .download(&reference, &ByteSink::Memory, &cancel)
            .await
            .expect("Failed to download empty object");
        assert_eq!(download.outcome.bytes_transferred, 0);
        assert!(download.body.expect("memory body").is_empty());

        cleanup(&engine, &reference).await;
    }

    #[tokio::test]
    async fn test_delete_and_absence() {
        let Some(engine) = setup_engine() else {
            eprintln!("Skipping: FERRY_TEST_BACKEND not configured");
            return;
        };
        let cancel = CancellationToken::new();
        let reference = test_ref("delete", "victim.txt");

        engine
            .upload(
                &TransferDescriptor::new(reference.clone()),
                ByteSource::from("delete me"),
                &cancel,
            )
            .await
            .expect("Failed to upload");
        assert!(engine.exists(&reference, &cancel).await.expect("exists"));

        engine
            .delete(&reference, &cancel)
            .await
            .expect("Failed to delete");
        assert!(!engine.exists(&reference, &cancel).await.expect("exists"));

        // Deleting again reports the absence, not success
        let err = engine
            .delete(&reference, &cancel)
            .await
            .expect_err("second delete must fail");
        assert!(matches!(err, Error::NotFound(_)), "got {err}");
    }

    #[tokio::test]
    async fn test_rename_moves_object() {
        let Some(engine) = setup_engine() else {
            eprintln!("Skipping: FERRY_TEST_BACKEND not configured");
            return;
        };
        let cancel = CancellationToken::new();
        let from = test_ref("rename", "before.txt");
        let to = from.parent().expect("parent").join("after.txt").expect("join");

        engine
            .upload(
                &TransferDescriptor::new(from.clone()),
                ByteSource::from("movable"),
                &cancel,
            )
            .await
            .expect("Failed to upload");

        engine
            .rename(&from, &to, &cancel)
            .await
            .expect("Failed to rename");

        assert!(!engine.exists(&from, &cancel).await.expect("exists"));
        let download = engine
            .download(&to, &ByteSink::Memory, &cancel)
            .await
            .expect("Failed to download renamed object");
        assert_eq!(download.body.expect("memory body").as_ref(), b"movable");

        cleanup(&engine, &to).await;
    }

    #[tokio::test]
    async fn test_rename_into_occupied_destination_conflicts() {
        let Some(engine) = setup_engine() else {
            eprintln!("Skipping: FERRY_TEST_BACKEND not configured");
            return;
        };
        let cancel = CancellationToken::new();
        let from = test_ref("renameconflict", "a.txt");
        let to = from.parent().expect("parent").join("b.txt").expect("join");

        for (reference, body) in [(&from, "first"), (&to, "second")] {
            engine
                .upload(
                    &TransferDescriptor::new(reference.clone()),
                    ByteSource::from(body),
                    &cancel,
                )
                .await
                .expect("Failed to upload");
        }

        let err = engine
            .rename(&from, &to, &cancel)
            .await
            .expect_err("rename onto an existing object must fail");
        assert!(matches!(err, Error::Conflict(_)), "got {err}");

        cleanup(&engine, &from).await;
        cleanup(&engine, &to).await;
    }
}

mod listing_operations {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_list_shows_uploaded_objects() {
        let Some(engine) = setup_engine() else {
            eprintln!("Skipping: FERRY_TEST_BACKEND not configured");
            return;
        };
        let cancel = CancellationToken::new();
        let first = test_ref("list", "one.txt");
        let prefix = first.parent().expect("parent");
        let second = prefix.join("two.txt").expect("join");

        for reference in [&first, &second] {
            engine
                .upload(
                    &TransferDescriptor::new(reference.clone()),
                    ByteSource::from("listed"),
                    &cancel,
                )
                .await
                .expect("Failed to upload");
        }

        let stream = engine
            .list(Some(&prefix), &cancel)
            .await
            .expect("Failed to list");
        let objects: Vec<_> = stream.try_collect().await.expect("Failed to drain listing");

        let names: Vec<&str> = objects
            .iter()
            .map(|o| o.reference.file_name())
            .collect();
        assert!(names.contains(&"one.txt"), "one.txt missing in {names:?}");
        assert!(names.contains(&"two.txt"), "two.txt missing in {names:?}");
        for object in &objects {
            assert!(!object.is_dir);
            assert_eq!(object.size_bytes, Some(6));
        }

        cleanup(&engine, &first).await;
        cleanup(&engine, &second).await;
    }
}

mod revision_operations {
    use super::*;

    #[tokio::test]
    async fn test_safe_update_rejects_stale_revision() {
        let Some(engine) = setup_engine() else {
            eprintln!("Skipping: FERRY_TEST_BACKEND not configured");
            return;
        };
        if engine.backend().as_safe_update().is_none() {
            eprintln!("Skipping: backend has no revision support");
            return;
        }
        let cancel = CancellationToken::new();
        let reference = test_ref("revisions", "contested.txt");

        let outcome = engine
            .upload(
                &TransferDescriptor::new(reference.clone()),
                ByteSource::from("v1"),
                &cancel,
            )
            .await
            .expect("Failed to upload");
        let revision = outcome.revision.expect("revisioned backend returns one");

        // A matching revision updates in place
        let updated = engine
            .update(&reference, ByteSource::from("v2"), &revision, &cancel)
            .await
            .expect("Failed to update with current revision");
        assert_ne!(updated.revision.as_deref(), Some(revision.as_str()));

        // The original revision is now stale
        let err = engine
            .update(&reference, ByteSource::from("v3"), &revision, &cancel)
            .await
            .expect_err("stale revision must be rejected");
        assert!(matches!(err, Error::Conflict(_)), "got {err}");

        let download = engine
            .download(&reference, &ByteSink::Memory, &cancel)
            .await
            .expect("Failed to download");
        assert_eq!(download.body.expect("memory body").as_ref(), b"v2");

        cleanup(&engine, &reference).await;
    }
}

#[cfg(feature = "slow")]
mod slow_operations {
    use super::*;

    #[tokio::test]
    async fn test_large_upload_roundtrip() {
        let Some(backend) = setup_backend() else {
            eprintln!("Skipping: FERRY_TEST_BACKEND not configured");
            return;
        };
        let cancel = CancellationToken::new();
        let reference = test_ref("slow", "large.bin");

        // Threshold lowered so the payload crosses into the chunked path
        // without shipping 150 MiB per run
        let engine = TransferEngine::with_options(
            backend,
            ferry::TransferOptions {
                chunk_threshold: 4 * 1024 * 1024,
                chunk_size: 1024 * 1024,
                ..Default::default()
            },
        );
        let body: Vec<u8> = (0..8 * 1024 * 1024).map(|i| (i % 241) as u8).collect();

        let started = std::time::Instant::now();
        let outcome = engine
            .upload(
                &TransferDescriptor::new(reference.clone()).expected_size(body.len() as u64),
                ByteSource::from(body.clone()),
                &cancel,
            )
            .await
            .expect("Failed to upload large object");
        println!("Uploaded {} bytes in {:?}", body.len(), started.elapsed());
        assert_eq!(outcome.bytes_transferred, body.len() as u64);

        let download = engine
            .download(&reference, &ByteSink::Memory, &cancel)
            .await
            .expect("Failed to download large object");
        assert_eq!(download.body.expect("memory body").as_ref(), body.as_slice());

        cleanup(&engine, &reference).await;
    }
}
