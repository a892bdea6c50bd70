//! End-to-end gateway tests against a scripted stand-in for exiftool.
//!
//! The script in `common::ECHO_WORKER` answers each request with the mode,
//! the staged path, the size and the content of the staged file.

#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use exifgate::config::Settings;
use exifgate::gateway::{MetadataExtractor, MetadataGateway, ResponseInfo};
use exifgate::worker::{EngineError, Mode};
use exifgate::workspace::Workspace;
use tempfile::TempDir;

use common::{
    entries, field, http_response, process_exists, requests_seen, settings_for, write_script,
};

async fn start_echo(scripts: &TempDir) -> MetadataGateway {
    let worker = write_script(scripts, "exiftool", common::ECHO_WORKER);
    MetadataGateway::start(&settings_for(&worker)).await.unwrap()
}

#[tokio::test]
async fn test_plain_extraction_reads_body_only() {
    let scripts = TempDir::new().unwrap();
    let gateway = start_echo(&scripts).await;

    let raw = http_response("image/jpeg", b"hello");
    let lines = gateway.read_metadata(&raw).await.unwrap();

    assert_eq!(field(&lines, "Mode"), Some("plain"));
    assert_eq!(field(&lines, "Size"), Some("5"));
    assert_eq!(field(&lines, "Content"), Some("hello"));
    assert_eq!(field(&lines, "Warning"), Some("fake worker"));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_html_extraction_sends_html_flag() {
    let scripts = TempDir::new().unwrap();
    let gateway = start_echo(&scripts).await;

    let raw = http_response("image/png", b"png");
    let lines = gateway.read_metadata_html(&raw).await.unwrap();
    assert_eq!(field(&lines, "Mode"), Some("html"));

    // The next plain request is unaffected.
    let lines = gateway.read_metadata(&raw).await.unwrap();
    assert_eq!(field(&lines, "Mode"), Some("plain"));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_staged_file_is_removed_after_exchange() {
    let scripts = TempDir::new().unwrap();
    let gateway = start_echo(&scripts).await;

    let info = ResponseInfo::body().with_stated("image/gif");
    let lines = gateway.extract(b"GIF89a", &info, Mode::Plain).await.unwrap();

    let source = PathBuf::from(field(&lines, "Source").unwrap());
    assert!(source.starts_with(gateway.workspace().path()));
    assert!(!source.exists());
    assert_eq!(entries(gateway.workspace().path()), 0);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_ignored_type_is_not_sent() {
    let scripts = TempDir::new().unwrap();
    let gateway = start_echo(&scripts).await;
    gateway.set_types_to_ignore(["text/html"]).await;

    let stated = ResponseInfo::body().with_stated("text/html");
    let inferred = ResponseInfo::body()
        .with_stated("image/jpeg")
        .with_inferred("text/html");

    assert!(gateway.extract(b"<html>", &stated, Mode::Plain).await.unwrap().is_empty());
    assert!(gateway.extract(b"<html>", &inferred, Mode::Html).await.unwrap().is_empty());
    assert!(!gateway.can_read_metadata(&http_response("text/html", b"<p>")).await);
    assert!(gateway.can_read_metadata(&http_response("image/jpeg", b"x")).await);

    // Nothing was staged and the worker never saw a request.
    let worker = scripts.path().join("exiftool");
    assert_eq!(entries(gateway.workspace().path()), 0);
    assert!(requests_seen(&worker).is_empty());

    let jpeg = ResponseInfo::body().with_stated("image/jpeg");
    gateway.extract(b"\xFF\xD8\xFF", &jpeg, Mode::Plain).await.unwrap();
    assert_eq!(requests_seen(&worker).len(), 1);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_line_filter_can_be_replaced() {
    let scripts = TempDir::new().unwrap();
    let gateway = start_echo(&scripts).await;
    let info = ResponseInfo::body();

    gateway.set_lines_to_ignore(["Warning", "Source"]).await;
    let lines = gateway.extract(b"abc", &info, Mode::Plain).await.unwrap();
    assert_eq!(lines, vec!["Mode:plain", "Size:3", "Content:abc"]);
    assert_eq!(field(&lines, "Warning"), None);
    assert_eq!(field(&lines, "Source"), None);

    gateway.set_lines_to_ignore(["Content"]).await;
    let lines = gateway.extract(b"abc", &info, Mode::Plain).await.unwrap();
    assert_eq!(field(&lines, "Content"), None);
    assert_eq!(field(&lines, "Warning"), Some("fake worker"));
    assert_eq!(gateway.lines_to_ignore().await.prefixes(), ["Content:"]);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_worker_error_sentinel_still_returns_lines() {
    let scripts = TempDir::new().unwrap();
    let gateway = start_echo(&scripts).await;

    let lines = gateway
        .extract(b"corrupt", &ResponseInfo::body(), Mode::Plain)
        .await
        .unwrap();
    assert_eq!(field(&lines, "Error"), Some("File format error"));

    // The worker is still usable afterwards.
    let lines = gateway
        .extract(b"fine", &ResponseInfo::body(), Mode::Plain)
        .await
        .unwrap();
    assert_eq!(field(&lines, "Content"), Some("fine"));

    gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_extractions_are_not_mixed_up() {
    let scripts = TempDir::new().unwrap();
    let gateway = Arc::new(start_echo(&scripts).await);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move {
                let body = format!("payload-{}", i);
                let lines = gateway
                    .extract(body.as_bytes(), &ResponseInfo::body(), Mode::Plain)
                    .await
                    .unwrap();
                (body, lines)
            })
        })
        .collect();

    for task in tasks {
        let (body, lines) = task.await.unwrap();
        assert_eq!(field(&lines, "Content"), Some(body.as_str()));
    }
    assert_eq!(entries(gateway.workspace().path()), 0);

    let gateway = Arc::try_unwrap(gateway).unwrap();
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_batch_keeps_input_order() {
    let scripts = TempDir::new().unwrap();
    let gateway = start_echo(&scripts).await;

    let responses = vec![
        (b"one".to_vec(), ResponseInfo::body()),
        (b"<html>".to_vec(), ResponseInfo::body().with_stated("text/html")),
        (b"three".to_vec(), ResponseInfo::body()),
    ];
    gateway.set_types_to_ignore(["text/html"]).await;

    let results = gateway.extract_batch(&responses, Mode::Plain).await;
    assert_eq!(results.len(), 3);

    let first = results[0].as_ref().unwrap();
    let second = results[1].as_ref().unwrap();
    let third = results[2].as_ref().unwrap();
    assert_eq!(field(first, "Content"), Some("one"));
    assert!(second.is_empty());
    assert_eq!(field(third, "Content"), Some("three"));
    assert_eq!(requests_seen(&scripts.path().join("exiftool")).len(), 2);
    assert_eq!(entries(gateway.workspace().path()), 0);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_dead_worker_reports_exchange_error() {
    let scripts = TempDir::new().unwrap();
    let worker = write_script(&scripts, "exiftool", common::DYING_WORKER);
    let gateway = MetadataGateway::start(&settings_for(&worker)).await.unwrap();

    let err = gateway
        .extract(b"data", &ResponseInfo::body(), Mode::Plain)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExchangeIo(_)));
    assert!(err.is_exchange());
    assert_eq!(entries(gateway.workspace().path()), 0);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_removes_workspace() {
    let scripts = TempDir::new().unwrap();
    let gateway = start_echo(&scripts).await;
    let dir = gateway.workspace().path().to_path_buf();

    assert!(gateway.supervisor().is_running().await);
    assert!(gateway.supervisor().pid().is_some());
    assert!(gateway.supervisor().extracted_binary().is_none());

    gateway.shutdown().await;
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_missing_worker_fails_and_cleans_up() {
    let mut settings = Settings::default();
    settings.worker.path = Some("/nonexistent/exifgate/exiftool".to_string());

    let workspace = Workspace::create().unwrap();
    let dir = workspace.path().to_path_buf();

    let err = MetadataGateway::with_workspace(workspace, &settings)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WorkerLaunch { .. }));
    assert!(err.is_fatal_for_engine());
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_configured_ignore_rules_apply_at_start() {
    let scripts = TempDir::new().unwrap();
    let worker = write_script(&scripts, "exiftool", common::ECHO_WORKER);

    let mut settings = settings_for(&worker);
    settings.ignore.types = vec!["image/svg+xml".to_string()];
    settings.ignore.lines = vec!["Warning".to_string(), "Size".to_string()];
    let gateway = MetadataGateway::start(&settings).await.unwrap();

    let svg = ResponseInfo::body().with_inferred("image/svg+xml");
    assert!(gateway.extract(b"<svg/>", &svg, Mode::Plain).await.unwrap().is_empty());

    let lines = gateway
        .extract(b"data", &ResponseInfo::body(), Mode::Plain)
        .await
        .unwrap();
    assert_eq!(field(&lines, "Warning"), None);
    assert_eq!(field(&lines, "Size"), None);
    assert_eq!(field(&lines, "Content"), Some("data"));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_abandoned_extraction_does_not_shift_later_replies() {
    let scripts = TempDir::new().unwrap();
    let worker = write_script(&scripts, "exiftool", common::SLOW_WORKER);
    let gateway = MetadataGateway::start(&settings_for(&worker)).await.unwrap();
    let info = ResponseInfo::body();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(300),
        gateway.extract(b"first", &info, Mode::Plain),
    )
    .await;
    assert!(abandoned.is_err());

    let second = gateway.extract(b"second", &info, Mode::Plain).await.unwrap();
    let third = gateway.extract(b"third", &info, Mode::Plain).await.unwrap();
    assert_eq!(field(&second, "Content"), Some("second"));
    assert_eq!(field(&third, "Content"), Some("third"));
    assert_eq!(entries(gateway.workspace().path()), 0);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_gives_up_on_a_worker_that_stays() {
    let scripts = TempDir::new().unwrap();
    let worker = write_script(&scripts, "exiftool", common::STUBBORN_WORKER);

    let mut settings = settings_for(&worker);
    settings.worker.exit_timeout_secs = 1;
    let gateway = MetadataGateway::start(&settings).await.unwrap();
    let dir = gateway.workspace().path().to_path_buf();

    let started = Instant::now();
    gateway.shutdown().await;

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_shutdown_kills_a_worker_that_stays_when_asked() {
    let scripts = TempDir::new().unwrap();
    let worker = write_script(&scripts, "exiftool", common::STUBBORN_WORKER);

    let mut settings = settings_for(&worker);
    settings.worker.exit_timeout_secs = 1;
    settings.worker.kill_on_timeout = true;
    let gateway = MetadataGateway::start(&settings).await.unwrap();
    let dir = gateway.workspace().path().to_path_buf();
    let pid = gateway.supervisor().pid().unwrap();
    assert!(process_exists(pid));

    gateway.shutdown().await;

    assert!(!process_exists(pid));
    assert!(!dir.exists());
}
