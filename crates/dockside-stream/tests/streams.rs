//! End-to-end checks of the public stream API against engine-shaped input.

use dockside_stream::{
    demux, demux_with_prefix, drain_progress, Frame, JsonStream, StreamTag,
};
use serde::Deserialize;

fn encode_frames(frames: &[(StreamTag, &[u8])]) -> Vec<u8> {
    frames
        .iter()
        .flat_map(|(tag, payload)| Frame::encode(*tag, payload))
        .collect()
}

#[tokio::test]
async fn test_frames_route_to_matching_sinks() {
    let frames: [(StreamTag, &[u8]); 5] = [
        (StreamTag::Stdout, b"starting\n"),
        (StreamTag::Stderr, b"warning: low memory\n"),
        (StreamTag::Stdout, b"ready\n"),
        (StreamTag::Stderr, b""),
        (StreamTag::Stdout, &[0xff, 0x00, 0x7f]),
    ];
    let data = encode_frames(&frames);
    let expected_total: usize = frames.iter().map(|(_, p)| p.len()).sum();

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let written = demux(data.as_slice(), &mut stdout, &mut stderr)
        .await
        .unwrap();

    assert_eq!(written as usize, expected_total);
    assert_eq!(stdout, b"starting\nready\n\xff\x00\x7f");
    assert_eq!(stderr, b"warning: low memory\n");
}

#[tokio::test]
async fn test_prefixed_demux_counts_payload_only() {
    let frames: [(StreamTag, &[u8]); 2] = [
        (StreamTag::Stdout, b"hello"),
        (StreamTag::Stderr, b"world"),
    ];
    let data = encode_frames(&frames);

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let written = demux_with_prefix(data.as_slice(), &mut stdout, &mut stderr, "[OUT] ", "[ERR] ")
        .await
        .unwrap();

    assert_eq!(written, 10);
    assert_eq!(String::from_utf8(stdout).unwrap(), "[OUT] hello");
    assert_eq!(String::from_utf8(stderr).unwrap(), "[ERR] world");
}

#[tokio::test]
async fn test_eof_at_boundary_versus_mid_frame() {
    let data = Frame::encode(StreamTag::Stdout, b"complete");

    let mut out = Vec::new();
    let mut err = Vec::new();
    assert!(demux(data.as_slice(), &mut out, &mut err).await.is_ok());

    for cut in [data.len() - 3, 5] {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = demux(&data[..cut], &mut out, &mut err).await;
        assert!(result.unwrap_err().is_framing(), "cut at {cut} should fail");
    }
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    read: String,
    num_procs: u32,
}

#[tokio::test]
async fn test_stats_snapshots_decode_lazily() {
    let body = concat!(
        r#"{"read":"2024-01-01T00:00:00Z","num_procs":1}"#,
        "\n",
        r#"{"read":"2024-01-01T00:00:01Z","num_procs":2}"#,
        "\n",
    );

    let mut stream: JsonStream<_, Snapshot> = JsonStream::new(body.as_bytes());
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.read, "2024-01-01T00:00:00Z");
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(second.num_procs, 2);
    assert!(stream.next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_progress_error_record_fails_pull() {
    let body = br#"{"error":"pull access denied for nope","errorDetail":{"message":"pull access denied for nope"}}"#;

    let err = drain_progress(&body[..], |_| {}).await.unwrap_err();
    assert!(err.is_operation());
    assert!(err.to_string().contains("pull access denied"));
}
