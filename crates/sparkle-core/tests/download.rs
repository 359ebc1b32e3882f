use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use httpmock::Method::{GET, HEAD};
use httpmock::MockServer;
use sparkle_appcast::{AppCastItem, HttpOptions};
use sparkle_core::{DOWNLOAD_CHUNK_SIZE, DownloadError, DownloadEvent, UpdateDownloader};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

struct Outcome {
    progress: Vec<u64>,
    error: Option<DownloadError>,
    was_canceled: bool,
    completions: usize,
}

async fn collect(mut events: UnboundedReceiver<DownloadEvent>) -> Outcome {
    let mut outcome = Outcome {
        progress: Vec::new(),
        error: None,
        was_canceled: false,
        completions: 0,
    };
    while let Some(event) = events.recv().await {
        assert_eq!(outcome.completions, 0, "nothing should follow the completion event");
        match event {
            DownloadEvent::Progress(progress) => outcome.progress.push(progress.bytes_received),
            DownloadEvent::Completed {
                error,
                was_canceled,
            } => {
                outcome.error = error;
                outcome.was_canceled = was_canceled;
                outcome.completions += 1;
            }
        }
    }
    outcome
}

fn downloader() -> UpdateDownloader {
    UpdateDownloader::new(&HttpOptions::default()).expect("client should build")
}

fn partial_of(path: &Path) -> std::path::PathBuf {
    path.with_file_name(format!(
        "{}.partial",
        path.file_name()
            .and_then(|name| name.to_str())
            .expect("test path should have a name")
    ))
}

#[tokio::test]
async fn progress_increases_then_completes() {
    let server = MockServer::start_async().await;
    let body = vec![42_u8; DOWNLOAD_CHUNK_SIZE * 3 + 100];
    server
        .mock_async(|when, then| {
            when.method(GET).path("/Rocket-2.0.0.msi");
            then.status(200).body(body.clone());
        })
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let destination = dir.path().join("Rocket-2.0.0.msi");
    let events = downloader()
        .start_file_download(&server.url("/Rocket-2.0.0.msi"), &destination)
        .await;
    let outcome = collect(events).await;

    assert_eq!(outcome.completions, 1);
    assert!(outcome.error.is_none());
    assert!(!outcome.was_canceled);
    assert!(!outcome.progress.is_empty());
    assert!(outcome.progress.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(outcome.progress.last().copied(), Some(body.len() as u64));
    assert_eq!(
        std::fs::read(&destination).expect("download should exist"),
        body
    );
    assert!(!partial_of(&destination).exists());
}

#[tokio::test]
async fn cancel_removes_the_partial_file() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow.exe");
            then.status(200)
                .delay(Duration::from_secs(5))
                .body(vec![1_u8; 1024]);
        })
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let destination = dir.path().join("slow.exe");
    let downloader = downloader();
    let events = downloader
        .start_file_download(&server.url("/slow.exe"), &destination)
        .await;
    downloader.cancel_download();

    let outcome = tokio::time::timeout(Duration::from_secs(3), collect(events))
        .await
        .expect("cancel should complete promptly");

    assert_eq!(outcome.completions, 1);
    assert!(outcome.was_canceled);
    assert!(outcome.error.is_none());
    assert!(!destination.exists());
    assert!(!partial_of(&destination).exists());
}

#[tokio::test]
async fn starting_a_new_download_cancels_the_previous_one() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow.exe");
            then.status(200)
                .delay(Duration::from_secs(5))
                .body(vec![1_u8; 16]);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/fast.exe");
            then.status(200).body(vec![2_u8; 16]);
        })
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let downloader = downloader();
    let first = downloader
        .start_file_download(&server.url("/slow.exe"), &dir.path().join("slow.exe"))
        .await;
    let second = downloader
        .start_file_download(&server.url("/fast.exe"), &dir.path().join("fast.exe"))
        .await;

    let first = collect(first).await;
    let second = collect(second).await;
    assert!(first.was_canceled);
    assert!(!second.was_canceled);
    assert!(second.error.is_none());
    assert!(dir.path().join("fast.exe").exists());
}

#[tokio::test]
async fn http_errors_leave_no_file_behind() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing.exe");
            then.status(404);
        })
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let destination = dir.path().join("missing.exe");
    let outcome = collect(
        downloader()
            .start_file_download(&server.url("/missing.exe"), &destination)
            .await,
    )
    .await;

    assert_eq!(outcome.completions, 1);
    assert!(matches!(
        outcome.error,
        Some(DownloadError::HttpStatus { status, .. }) if status.as_u16() == 404
    ));
    assert!(!destination.exists());
    assert!(!partial_of(&destination).exists());
}

#[tokio::test]
async fn refused_redirect_is_not_followed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/latest.exe");
            then.status(302).header("location", "/mirror/latest.exe");
        })
        .await;
    let target = server
        .mock_async(|when, then| {
            when.method(GET).path("/mirror/latest.exe");
            then.status(200).body("installer");
        })
        .await;

    let options = HttpOptions {
        redirect_hook: Arc::new(|_: &Url, to: &Url| !to.path().starts_with("/mirror/")),
        ..HttpOptions::default()
    };
    let downloader = UpdateDownloader::new(&options).expect("client should build");
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let destination = dir.path().join("latest.exe");

    let outcome = collect(
        downloader
            .start_file_download(&server.url("/latest.exe"), &destination)
            .await,
    )
    .await;

    assert!(matches!(
        outcome.error,
        Some(DownloadError::HttpStatus { status, .. }) if status.as_u16() == 302
    ));
    target.assert_hits_async(0).await;
    assert!(!destination.exists());
}

#[tokio::test]
async fn destination_name_comes_from_content_disposition() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/download");
            then.status(200)
                .header("content-disposition", "attachment; filename=\"Rocket Setup.exe\"");
        })
        .await;

    let item = AppCastItem::new(
        "2.0.0".parse().expect("version should parse"),
        server.url("/download?build=2.0.0"),
    );
    assert_eq!(
        downloader().retrieve_destination_file_name(&item).await,
        "Rocket Setup.exe"
    );
}

#[tokio::test]
async fn destination_name_falls_back_to_the_url() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/builds/Rocket-2.0.0.dmg");
            then.status(405);
        })
        .await;

    let item = AppCastItem::new(
        "2.0.0".parse().expect("version should parse"),
        server.url("/builds/Rocket-2.0.0.dmg"),
    );
    assert_eq!(
        downloader().retrieve_destination_file_name(&item).await,
        "Rocket-2.0.0.dmg"
    );
}
