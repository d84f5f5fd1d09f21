//! Integration test: a local live HLS server, the reqwest driver and a full session.
//!
//! Each test starts a stream whose media playlist grows on every poll, runs a
//! session against it and checks the assembled file byte for byte.

mod common;

use common::hls_server::{self, segment_body, LiveStreamOptions};
use hls_archiver::core::config::ArchiveConfig;
use hls_archiver::core::model::{ArchiveRequest, RequestHeaders, SessionPhase, StreamReference, VariantPreference};
use hls_archiver::core::retry::RetryPolicy;
use hls_archiver::core::session::{ArchiveSession, SessionOutcome};
use hls_archiver::plugins::hls::resolver::parse_document;
use hls_archiver::plugins::http::driver::HttpDriver;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn fast_config() -> ArchiveConfig {
    ArchiveConfig {
        concurrency: 4,
        retry: RetryPolicy { max_attempts: 3, delay: Duration::from_millis(20), attempt_timeout: Duration::from_secs(5) },
        playlist_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(30),
        tail_cooldown: Duration::from_millis(250),
        ..ArchiveConfig::default()
    }
}

fn expected(range: std::ops::RangeInclusive<u64>, missing: &[u64]) -> String {
    range.filter(|i| !missing.contains(i)).map(segment_body).collect()
}

fn driver() -> Arc<HttpDriver> {
    Arc::new(HttpDriver::new("hls-archiver-test/0.1").unwrap())
}

#[tokio::test]
async fn live_stream_is_archived_end_to_end() {
    let server = hls_server::start(LiveStreamOptions {
        initial_top: 5,
        final_top: 9,
        missing: HashSet::new(),
        cookie: None,
    });
    let out_dir = tempdir().unwrap();
    let dest = out_dir.path().join("archive.ts");

    let request = ArchiveRequest {
        reference: StreamReference::Url(server.master_url()),
        destination: Some(dest.clone()),
        headers: RequestHeaders::new(),
        preference: VariantPreference { resolution: Some("1280x720".to_string()), bandwidth: Some(2_500_000) },
    };
    let report = ArchiveSession::new(request, fast_config(), driver()).run().await;

    assert_eq!(report.phase, SessionPhase::Completed, "outcome: {:?}", report.outcome);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), expected(0..=9, &[]));
    assert_eq!(report.variant.unwrap().resolution.as_deref(), Some("1280x720"));
    assert_eq!(report.progress.downloaded, 10);
    assert_eq!(report.tail.unwrap().discovered, 4);
    assert!(!report.work_dir.unwrap().exists(), "working directory is removed");
    // every segment fetched exactly once
    for i in 0..=9 {
        assert_eq!(server.hits(&format!("/live/720/index_0_{i}.ts")), 1, "segment {i}");
    }
    assert_eq!(server.hits("/live/360/"), 0);
}

#[tokio::test]
async fn missing_segment_is_retried_then_left_out() {
    let server = hls_server::start(LiveStreamOptions {
        initial_top: 4,
        final_top: 4,
        missing: HashSet::from([2]),
        cookie: None,
    });
    let out_dir = tempdir().unwrap();
    let dest = out_dir.path().join("gaps.ts");

    let request = ArchiveRequest {
        reference: StreamReference::Url(server.media_url()),
        destination: Some(dest.clone()),
        headers: RequestHeaders::new(),
        preference: VariantPreference::default(),
    };
    let report = ArchiveSession::new(request, fast_config(), driver()).run().await;

    match report.outcome {
        SessionOutcome::CompletedWithGaps { ref skipped, .. } => assert_eq!(skipped, &vec![2]),
        ref other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(report.progress.failed, 1);
    assert_eq!(server.hits("/live/720/index_0_2.ts"), 3);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), expected(0..=4, &[2]));
}

#[tokio::test]
async fn pasted_request_supplies_url_and_cookie() {
    let server = hls_server::start(LiveStreamOptions {
        initial_top: 3,
        final_top: 3,
        missing: HashSet::new(),
        cookie: Some("sid=abc123".to_string()),
    });
    let out_dir = tempdir().unwrap();
    let dest = out_dir.path().join("cookie.ts");

    let doc = format!("curl '{}' \\\n  -H 'Accept: */*' \\\n  -H 'Cookie: sid=abc123'\n", server.master_url());
    let input = parse_document(&doc).unwrap();

    let request = ArchiveRequest {
        reference: input.reference,
        destination: Some(dest.clone()),
        headers: input.headers,
        preference: VariantPreference::default(),
    };
    let report = ArchiveSession::new(request, fast_config(), driver()).run().await;

    assert_eq!(report.phase, SessionPhase::Completed, "outcome: {:?}", report.outcome);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), expected(0..=3, &[]));
}

#[tokio::test]
async fn kept_working_directory_resumes_without_refetching() {
    let server = hls_server::start(LiveStreamOptions {
        initial_top: 5,
        final_top: 5,
        missing: HashSet::new(),
        cookie: None,
    });
    let out_dir = tempdir().unwrap();
    let dest = out_dir.path().join("resumed.ts");
    let work_dir = out_dir.path().join("segments");
    std::fs::create_dir_all(&work_dir).unwrap();
    for i in 0..3u64 {
        std::fs::write(work_dir.join(format!("{i:08}.ts")), segment_body(i)).unwrap();
    }

    let cfg = ArchiveConfig { work_dir: Some(work_dir.clone()), keep_segments: true, ..fast_config() };
    let request = ArchiveRequest {
        reference: StreamReference::Url(server.media_url()),
        destination: Some(dest.clone()),
        headers: RequestHeaders::new(),
        preference: VariantPreference::default(),
    };
    let report = ArchiveSession::new(request, cfg, driver()).run().await;

    assert_eq!(report.phase, SessionPhase::Completed, "outcome: {:?}", report.outcome);
    assert_eq!(report.progress.skipped, 3);
    assert_eq!(report.progress.downloaded, 3);
    for i in 0..3 {
        assert_eq!(server.hits(&format!("/live/720/index_0_{i}.ts")), 0, "segment {i}");
    }
    assert!(work_dir.join("00000005.ts").exists());
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), expected(0..=5, &[]));
}

#[tokio::test]
async fn unreachable_playlist_fails_without_output() {
    let out_dir = tempdir().unwrap();
    let dest = out_dir.path().join("never.ts");
    let server = hls_server::start(LiveStreamOptions {
        initial_top: 1,
        final_top: 1,
        missing: HashSet::new(),
        cookie: None,
    });

    let request = ArchiveRequest {
        reference: StreamReference::Url(format!("{}live/gone.m3u8", server.base)),
        destination: Some(dest.clone()),
        headers: RequestHeaders::new(),
        preference: VariantPreference::default(),
    };
    let report = ArchiveSession::new(request, fast_config(), driver()).run().await;

    assert!(matches!(report.outcome, SessionOutcome::Failed { .. }));
    assert!(!dest.exists());
    assert!(report.work_dir.is_none());
}
