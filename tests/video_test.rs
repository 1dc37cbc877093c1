//! Video pipeline integration tests
//!
//! ffmpeg is replaced by small shell scripts so the bounded executor can be
//! driven end to end without real media.

#![cfg(unix)]

mod common;

use assert_matches::assert_matches;
use common::{fake_tool, TestHarness};
use mg_av::ToolRegistry;
use mg_core::config::{CeilingsConfig, Config};
use mg_core::Error;

fn harness(script: &str, ceilings: CeilingsConfig) -> (tempfile::TempDir, TestHarness) {
    let bin = tempfile::tempdir().unwrap();
    let ffmpeg = fake_tool(bin.path(), "ffmpeg", script);
    let tools = ToolRegistry::with_tools([("ffmpeg".to_string(), ffmpeg)]);
    let config = Config {
        ceilings,
        ..Default::default()
    };
    (bin, TestHarness::with(config, tools))
}

#[tokio::test]
async fn test_snapshot_overflow_kills_the_tool() {
    let (_bin, h) = harness(
        "exec yes",
        CeilingsConfig {
            snapshot_bytes: 4096,
            ..Default::default()
        },
    );
    h.put("clip.mp4", b"not really a video");

    let err = h
        .run("/clip.mp4?x-process=video/snapshot,t_1000,f_jpg")
        .await
        .unwrap_err();
    let failure = err.tool_failure().cloned();
    assert_matches!(err, Error::Overflow(_));
    let failure = failure.unwrap();
    assert!(failure.killed_by_ceiling);
    assert_eq!(failure.signal, Some(9));
    assert_eq!(err.public_message(), "media tool failed");
}

#[tokio::test]
async fn test_snapshot_returns_tool_stdout() {
    let (_bin, h) = harness("printf 'JPEGDATA'", CeilingsConfig::default());
    h.put("clip.mp4", b"video");

    let outcome = h
        .run("/clip.mp4?x-process=video/snapshot,t_0,w_320")
        .await
        .unwrap();
    assert_eq!(&outcome.payload[..], b"JPEGDATA");
    assert_eq!(outcome.content_type, "image/jpeg");
}

#[tokio::test]
async fn test_tool_receives_the_source_path() {
    // Echo the argument after -i so the test can see what ffmpeg was given.
    let script = r#"while [ "$#" -gt 0 ]; do if [ "$1" = "-i" ]; then printf '%s' "$2"; exit 0; fi; shift; done; exit 1"#;
    let (_bin, h) = harness(script, CeilingsConfig::default());
    let path = h.put("nested/clip.mp4", b"video");

    let outcome = h
        .run("/nested/clip.mp4?x-process=video/transcode,f_mkv")
        .await
        .unwrap();
    let canonical = std::fs::canonicalize(path).unwrap();
    assert_eq!(
        std::str::from_utf8(&outcome.payload).unwrap(),
        canonical.to_str().unwrap()
    );
    assert_eq!(outcome.content_type, "video/x-matroska");
}

#[tokio::test]
async fn test_failing_tool_is_a_tool_error() {
    let (_bin, h) = harness("echo boom >&2; exit 3", CeilingsConfig::default());
    h.put("clip.mp4", b"video");

    let err = h
        .run("/clip.mp4?x-process=video/compress,q_30")
        .await
        .unwrap_err();
    let failure = err.tool_failure().cloned().unwrap();
    assert_matches!(err, Error::Tool(_));
    assert_eq!(failure.exit_code, Some(3));
    assert!(!err.to_string().contains("clip.mp4"));
}

#[tokio::test]
async fn test_only_last_output_runs() {
    // Any earlier output action would also succeed; the payload tells which ran.
    let script = r#"for a in "$@"; do if [ "$a" = "matroska" ]; then printf mkv; exit 0; fi; done; printf other"#;
    let (_bin, h) = harness(script, CeilingsConfig::default());
    h.put("clip.mp4", b"video");

    let outcome = h
        .run("/clip.mp4?x-process=video/snapshot/compress/transcode,f_mkv")
        .await
        .unwrap();
    assert_eq!(&outcome.payload[..], b"mkv");
}

#[tokio::test]
async fn test_missing_ffmpeg() {
    let h = TestHarness::new();
    h.put("clip.mp4", b"video");
    assert_matches!(
        h.run("/clip.mp4?x-process=video/snapshot").await,
        Err(Error::Tool(_))
    );
}
