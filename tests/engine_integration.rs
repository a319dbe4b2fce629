//! Integration tests for the download engine against an in-memory store.

mod support;

use std::sync::Arc;
use std::time::Duration;

use drive_core::{CredentialPool, DownloadRequest, FailureKind, RemoteNode, RunOutcome};
use tempfile::TempDir;

use support::{
    Fault, MockTransport, PDF_MIME, RecordingListener, ZIP_MIME, list_files, orchestrator, payload,
    primary, service_accounts, test_config,
};

fn request(name: &str) -> Arc<DownloadRequest> {
    Arc::new(DownloadRequest::new("https://drive.google.com/drive/folders/root", name))
}

fn primary_pool() -> CredentialPool {
    CredentialPool::new(Some(primary()), Vec::new()).unwrap()
}

#[tokio::test]
async fn test_folder_tree_is_mirrored_in_name_order() {
    let transport = MockTransport::new()
        .folder(
            "root",
            "Root",
            vec![
                RemoteNode::new("nested", "nested", drive_core::remote::FOLDER_MIME_TYPE),
                RemoteNode::new("beta", "beta.txt", PDF_MIME),
                RemoteNode::new("alpha", "alpha.txt", PDF_MIME),
            ],
        )
        .folder(
            "nested",
            "nested",
            vec![RemoteNode::new("gamma", "gamma.bin", ZIP_MIME)],
        )
        .content("alpha", b"alpha")
        .content("beta", b"beta")
        .content("gamma", &payload(37));
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("root", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(listener.completed(), 1);
    assert!(listener.errors().is_empty());
    assert_eq!(req.name(), "Root");
    assert_eq!(
        list_files(dir.path()),
        vec!["Root/alpha.txt", "Root/beta.txt", "Root/nested/gamma.bin"]
    );
    assert_eq!(std::fs::read(dir.path().join("Root/alpha.txt")).unwrap(), b"alpha");
    assert_eq!(
        std::fs::read(dir.path().join("Root/nested/gamma.bin")).unwrap(),
        payload(37)
    );
    let order: Vec<_> = transport
        .opened_streams()
        .into_iter()
        .map(|s| s.object_id)
        .collect();
    assert_eq!(order, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn test_empty_folder_creates_directory_only() {
    let transport = MockTransport::new().folder("root", "Empty", Vec::new());
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("root", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(dir.path().join("Empty").is_dir());
    assert!(list_files(dir.path()).is_empty());
    assert!(transport.opened_streams().is_empty());
}

#[tokio::test]
async fn test_single_file_uses_requested_name() {
    let transport = MockTransport::new().file("f1", "remote.bin", ZIP_MIME, &payload(20));
    let dir = TempDir::new().unwrap();
    let req = request("custom.bin");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(6), &req, &listener)
        .run("f1", dir.path().join("out").as_path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        std::fs::read(dir.path().join("out/custom.bin")).unwrap(),
        payload(20)
    );
    assert_eq!(req.name(), "custom.bin");
}

#[tokio::test]
async fn test_long_name_is_truncated_and_display_name_follows() {
    let long_name = format!("{}.txt", "a".repeat(300));
    let transport = MockTransport::new().file("f1", &long_name, PDF_MIME, b"data");
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("f1", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    let files = list_files(dir.path());
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].len(), 255);
    assert!(files[0].ends_with(".txt"));
    assert_eq!(req.name(), files[0]);
}

#[tokio::test]
async fn test_transient_failures_below_limit_keep_file_intact() {
    let data = payload(30);
    let transport = MockTransport::new()
        .file("f1", "data.bin", ZIP_MIME, &data)
        .script(
            "f1",
            vec![
                None,
                Some(Fault::Transient(503)),
                Some(Fault::Transient(500)),
                None,
                Some(Fault::Transient(429)),
            ],
        );
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("f1", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(std::fs::read(dir.path().join("data.bin")).unwrap(), data);
    assert_eq!(transport.opened_streams().len(), 1);
}

#[tokio::test]
async fn test_transient_failures_beyond_limit_restart_from_zero() {
    let data = payload(30);
    let transport = MockTransport::new()
        .file("f1", "data.bin", ZIP_MIME, &data)
        .script(
            "f1",
            vec![
                None,
                Some(Fault::Transient(503)),
                Some(Fault::Transient(503)),
                Some(Fault::Transient(503)),
                Some(Fault::Transient(503)),
            ],
        );
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("f1", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(std::fs::read(dir.path().join("data.bin")).unwrap(), data);
    assert_eq!(transport.opened_streams().len(), 2);
}

#[tokio::test]
async fn test_quota_rotates_service_account_and_restarts_from_zero() {
    let data = payload(24);
    let transport = MockTransport::new()
        .file("f1", "data.bin", ZIP_MIME, &data)
        .script("f1", vec![None, Some(Fault::Quota)]);
    let pool = CredentialPool::new(None, service_accounts(3)).unwrap();
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let mut run = orchestrator(&transport, pool, test_config(8), &req, &listener);
    let outcome = run.run("f1", dir.path()).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(std::fs::read(dir.path().join("data.bin")).unwrap(), data);
    let creds: Vec<_> = transport
        .opened_streams()
        .into_iter()
        .map(|s| s.credential)
        .collect();
    assert_eq!(creds, vec!["sa0", "sa1"]);
    assert_eq!(run.pool().rotation_count(), 1);
}

#[tokio::test]
async fn test_quota_on_primary_fails_without_retry() {
    let transport = MockTransport::new()
        .file("f1", "data.bin", ZIP_MIME, &payload(8))
        .quota_exhausted_for("primary");
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("f1", dir.path())
        .await;

    assert_eq!(
        outcome,
        RunOutcome::Failed {
            kind: FailureKind::QuotaExceeded,
            message: "Download Quota Exceeded.".to_string(),
        }
    );
    assert_eq!(listener.errors(), vec!["Download Quota Exceeded."]);
    assert_eq!(listener.completed(), 0);
    assert_eq!(transport.opened_streams().len(), 1);
    assert!(req.is_cancelled());
}

#[tokio::test]
async fn test_rotation_exhaustion_reports_error_exactly_once() {
    let transport = MockTransport::new()
        .folder(
            "root",
            "Root",
            vec![
                RemoteNode::new("a", "a.bin", ZIP_MIME),
                RemoteNode::new("b", "b.bin", ZIP_MIME),
            ],
        )
        .content("a", &payload(8))
        .content("b", &payload(8))
        .quota_exhausted_for("sa0")
        .quota_exhausted_for("sa1");
    let pool = CredentialPool::new(Some(primary()), service_accounts(2))
        .unwrap()
        .starting_with_service_accounts();
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, pool, test_config(8), &req, &listener)
        .run("root", dir.path())
        .await;

    assert!(matches!(
        outcome,
        RunOutcome::Failed {
            kind: FailureKind::CredentialsExhausted,
            ..
        }
    ));
    assert_eq!(listener.errors(), vec!["Download Quota Exceeded."]);
    assert_eq!(listener.completed(), 0);
    let streams = transport.opened_streams();
    assert_eq!(streams.len(), 3);
    assert!(streams.iter().all(|s| s.object_id == "a"));
}

#[tokio::test]
async fn test_cancel_mid_transfer_fires_no_callback() {
    let transport = MockTransport::new().file("f1", "big.bin", ZIP_MIME, &payload(40));
    let dir = TempDir::new().unwrap();
    let req = request("");
    transport.cancel_after_chunks(2, Arc::clone(&req));
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(4), &req, &listener)
        .run("f1", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(listener.completed(), 0);
    assert!(listener.errors().is_empty());
    assert_eq!(transport.chunk_calls(), 2);
    assert_eq!(std::fs::read(dir.path().join("big.bin")).unwrap().len(), 8);
}

#[tokio::test]
async fn test_cancel_in_folder_skips_remaining_children() {
    let transport = MockTransport::new()
        .folder(
            "root",
            "Root",
            vec![
                RemoteNode::new("a", "a.bin", ZIP_MIME),
                RemoteNode::new("b", "b.bin", ZIP_MIME),
                RemoteNode::new("c", "c.bin", ZIP_MIME),
            ],
        )
        .content("a", b"aaaa")
        .content("b", b"bbbb")
        .content("c", b"cccc");
    let dir = TempDir::new().unwrap();
    let req = request("");
    transport.cancel_after_chunks(1, Arc::clone(&req));
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("root", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(list_files(dir.path()), vec!["Root/a.bin"]);
    assert_eq!(transport.opened_streams().len(), 1);
    assert_eq!(listener.completed(), 0);
    assert!(listener.errors().is_empty());
}

#[tokio::test]
async fn test_cancel_before_run_downloads_nothing() {
    let transport = MockTransport::new().file("f1", "data.bin", ZIP_MIME, b"data");
    let dir = TempDir::new().unwrap();
    let req = request("");
    req.cancel();
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("f1", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(transport.opened_streams().is_empty());
    assert_eq!(listener.completed(), 0);
    assert!(listener.errors().is_empty());
}

#[tokio::test]
async fn test_not_found_on_primary_retries_once_with_service_accounts() {
    let transport = MockTransport::new()
        .file("f1", "shared.bin", ZIP_MIME, &payload(12))
        .hidden_from("primary");
    let pool = CredentialPool::new(Some(primary()), service_accounts(2)).unwrap();
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let mut run = orchestrator(&transport, pool, test_config(8), &req, &listener);
    let outcome = run.run("f1", dir.path()).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(listener.completed(), 1);
    assert_eq!(transport.metadata_calls(), 2);
    assert_eq!(transport.opened_streams()[0].credential, "sa0");
    assert!(run.pool().using_service());
    assert!(run.pool().alt_auth_attempted());
}

#[tokio::test]
async fn test_service_account_rerun_downloads_file_left_partial() {
    let transport = MockTransport::new()
        .folder("root", "Root", vec![RemoteNode::new("a", "a.bin", ZIP_MIME)])
        .content("a", &payload(16))
        .script(
            "a",
            vec![Some(Fault::NotFound), Some(Fault::NotFound), Some(Fault::NotFound)],
        );
    let pool = CredentialPool::new(Some(primary()), service_accounts(2)).unwrap();
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let mut run = orchestrator(&transport, pool, test_config(8), &req, &listener);
    let outcome = run.run("root", dir.path()).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(listener.completed(), 1);
    assert!(run.pool().alt_auth_attempted());
    assert_eq!(
        std::fs::read(dir.path().join("Root/a.bin")).unwrap(),
        payload(16)
    );
    let streams = transport.opened_streams();
    assert_eq!(streams.len(), 4);
    assert_eq!(streams[3].credential, "sa0");
}

#[tokio::test]
async fn test_file_present_before_service_account_rerun_is_still_skipped() {
    let transport = MockTransport::new()
        .folder(
            "root",
            "Root",
            vec![
                RemoteNode::new("a", "a.bin", ZIP_MIME),
                RemoteNode::new("b", "b.bin", ZIP_MIME),
            ],
        )
        .content("a", &payload(16))
        .content("b", b"remote")
        .script(
            "a",
            vec![Some(Fault::NotFound), Some(Fault::NotFound), Some(Fault::NotFound)],
        );
    let pool = CredentialPool::new(Some(primary()), service_accounts(1)).unwrap();
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("Root")).unwrap();
    std::fs::write(dir.path().join("Root/b.bin"), b"local").unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, pool, test_config(8), &req, &listener)
        .run("root", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(std::fs::read(dir.path().join("Root/a.bin")).unwrap(), payload(16));
    assert_eq!(std::fs::read(dir.path().join("Root/b.bin")).unwrap(), b"local");
    assert!(transport.opened_streams().iter().all(|s| s.object_id == "a"));
}

#[tokio::test]
async fn test_not_found_everywhere_reports_file_not_found_once() {
    let transport = MockTransport::new();
    let pool = CredentialPool::new(Some(primary()), service_accounts(1)).unwrap();
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, pool, test_config(8), &req, &listener)
        .run("missing-id", dir.path())
        .await;

    assert_eq!(
        outcome,
        RunOutcome::Failed {
            kind: FailureKind::NotFound,
            message: "File not found!".to_string(),
        }
    );
    assert_eq!(transport.metadata_calls(), 2);
    assert_eq!(listener.errors(), vec!["File not found!"]);
}

#[tokio::test]
async fn test_not_found_without_service_accounts_is_not_retried() {
    let transport = MockTransport::new();
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("missing-id", dir.path())
        .await;

    assert!(matches!(outcome, RunOutcome::Failed { .. }));
    assert_eq!(transport.metadata_calls(), 1);
    assert_eq!(listener.errors().len(), 1);
}

#[tokio::test]
async fn test_excluded_and_existing_files_are_skipped() {
    let transport = MockTransport::new()
        .folder(
            "root",
            "Root",
            vec![
                RemoteNode::new("iso", "movie.ISO", ZIP_MIME),
                RemoteNode::new("keep", "keep.txt", PDF_MIME),
                RemoteNode::new("present", "present.txt", PDF_MIME),
            ],
        )
        .content("iso", b"iso")
        .content("keep", b"keep")
        .content("present", b"remote");
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("Root")).unwrap();
    std::fs::write(dir.path().join("Root/present.txt"), b"local").unwrap();
    let req = Arc::new(
        DownloadRequest::new("root", "").with_excluded_extensions([".iso", ".part"]),
    );
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("root", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        list_files(dir.path()),
        vec!["Root/keep.txt", "Root/present.txt"]
    );
    assert_eq!(std::fs::read(dir.path().join("Root/present.txt")).unwrap(), b"local");
    assert_eq!(transport.metadata_calls(), 1);
    let streams: Vec<_> = transport
        .opened_streams()
        .into_iter()
        .map(|s| s.object_id)
        .collect();
    assert_eq!(streams, vec!["keep"]);
}

#[tokio::test]
async fn test_native_document_falls_back_to_export() {
    let transport = MockTransport::new()
        .folder(
            "root",
            "Root",
            vec![RemoteNode::new("doc", "Notes", support::GDOC_MIME)],
        )
        .native_document("doc", "Notes", b"%PDF-1.7 exported");
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(64), &req, &listener)
        .run("root", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(list_files(dir.path()), vec!["Root/Notes.pdf"]);
    assert_eq!(
        std::fs::read(dir.path().join("Root/Notes.pdf")).unwrap(),
        b"%PDF-1.7 exported"
    );
    let modes: Vec<_> = transport
        .opened_streams()
        .into_iter()
        .map(|s| s.exporting)
        .collect();
    assert_eq!(modes, vec![false, true]);
}

#[tokio::test]
async fn test_exported_single_document_display_name_gains_extension() {
    let transport = MockTransport::new().native_document("doc", "Notes", b"%PDF-1.7 exported");
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(64), &req, &listener)
        .run("doc", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(req.name(), "Notes.pdf");
    assert_eq!(list_files(dir.path()), vec!["Notes.pdf"]);
    assert!(dir.path().join(req.name()).is_file());
}

#[tokio::test]
async fn test_previously_exported_document_is_skipped() {
    let transport = MockTransport::new()
        .folder(
            "root",
            "Root",
            vec![RemoteNode::new("doc", "Notes", support::GDOC_MIME)],
        )
        .native_document("doc", "Notes", b"new");
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("Root")).unwrap();
    std::fs::write(dir.path().join("Root/Notes.pdf"), b"old").unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(64), &req, &listener)
        .run("root", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(transport.opened_streams().is_empty());
    assert_eq!(std::fs::read(dir.path().join("Root/Notes.pdf")).unwrap(), b"old");
}

#[tokio::test]
async fn test_shortcut_downloads_target_under_shortcut_name() {
    let transport = MockTransport::new()
        .folder(
            "root",
            "Root",
            vec![RemoteNode::shortcut("s1", "link.bin", "target", ZIP_MIME)],
        )
        .content("target", b"target bytes");
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(64), &req, &listener)
        .run("root", dir.path())
        .await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        std::fs::read(dir.path().join("Root/link.bin")).unwrap(),
        b"target bytes"
    );
    assert_eq!(transport.opened_streams()[0].object_id, "target");
}

#[tokio::test]
async fn test_persistent_error_is_retried_then_reported_without_markup() {
    let transport = MockTransport::new()
        .file("f1", "data.bin", ZIP_MIME, &payload(8))
        .script(
            "f1",
            vec![Some(Fault::Fatal), Some(Fault::Fatal), Some(Fault::Fatal)],
        );
    let dir = TempDir::new().unwrap();
    let req = request("");
    let listener = RecordingListener::new();

    let outcome = orchestrator(&transport, primary_pool(), test_config(8), &req, &listener)
        .run("f1", dir.path())
        .await;

    let RunOutcome::Failed { kind, message } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(kind, FailureKind::Other);
    assert!(!message.contains('<'));
    assert!(message.contains("Bad"));
    assert_eq!(transport.opened_streams().len(), 3);
    assert_eq!(listener.errors().len(), 1);
}

#[tokio::test]
async fn test_progress_stops_when_run_returns() {
    for fail in [false, true] {
        let mut transport = MockTransport::new().file("f1", "data.bin", ZIP_MIME, &payload(16));
        if fail {
            transport = transport.quota_exhausted_for("primary");
        }
        let dir = TempDir::new().unwrap();
        let req = request("");
        let listener = RecordingListener::new();

        orchestrator(&transport, primary_pool(), test_config(4), &req, &listener)
            .run("f1", dir.path())
            .await;

        let samples = listener.progress_samples();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(listener.progress_samples(), samples);
    }
}
