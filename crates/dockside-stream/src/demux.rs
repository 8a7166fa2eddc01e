//! Splitting a multiplexed stream into stdout and stderr sinks.
//!
//! Frames tagged stdout go to the stdout sink and frames tagged stderr go to
//! the stderr sink. Stdin-tagged frames and unknown tags are routed to the
//! stdout sink rather than rejected. The returned count is payload bytes
//! only: headers and prefixes are never counted.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::frame::{FrameReader, StreamTag};

/// Where frames are written.
enum Sinks<'a, O, E> {
    Split { stdout: &'a mut O, stderr: &'a mut E },
    Shared(&'a mut O),
}

/// Per-channel prefixes written before each frame's payload.
#[derive(Clone, Copy)]
struct Prefixes<'a> {
    stdout: &'a [u8],
    stderr: &'a [u8],
}

impl Prefixes<'static> {
    const NONE: Self = Self {
        stdout: b"",
        stderr: b"",
    };
}

/// Demultiplexes `source` into separate stdout and stderr sinks.
///
/// Returns the total number of payload bytes written across both sinks.
/// The first error from the source or either sink stops the copy.
pub async fn demux<R, O, E>(source: R, stdout: &mut O, stderr: &mut E) -> Result<u64>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    copy_frames(source, Sinks::Split { stdout, stderr }, Prefixes::NONE).await
}

/// Like [`demux`], but writes the channel's prefix before every frame.
///
/// Prefix bytes are not included in the returned count.
pub async fn demux_with_prefix<R, O, E>(
    source: R,
    stdout: &mut O,
    stderr: &mut E,
    stdout_prefix: &str,
    stderr_prefix: &str,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let prefixes = Prefixes {
        stdout: stdout_prefix.as_bytes(),
        stderr: stderr_prefix.as_bytes(),
    };
    copy_frames(source, Sinks::Split { stdout, stderr }, prefixes).await
}

/// Demultiplexes `source` into a single sink, interleaving both channels in
/// the order their frames arrived.
pub async fn demux_shared<R, W>(source: R, sink: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    copy_frames::<R, W, W>(source, Sinks::Shared(sink), Prefixes::NONE).await
}

/// Like [`demux_shared`], with a prefix per channel so the two remain
/// distinguishable in the combined output.
pub async fn demux_shared_with_prefix<R, W>(
    source: R,
    sink: &mut W,
    stdout_prefix: &str,
    stderr_prefix: &str,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let prefixes = Prefixes {
        stdout: stdout_prefix.as_bytes(),
        stderr: stderr_prefix.as_bytes(),
    };
    copy_frames::<R, W, W>(source, Sinks::Shared(sink), prefixes).await
}

async fn copy_frames<R, O, E>(
    source: R,
    mut sinks: Sinks<'_, O, E>,
    prefixes: Prefixes<'_>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut reader = FrameReader::new(source);
    let mut written = 0u64;

    while let Some(frame) = reader.next_frame().await? {
        let to_stderr = frame.stream() == Some(StreamTag::Stderr);
        if frame.stream().is_none() {
            tracing::trace!(tag = frame.tag, "routing unknown stream tag to stdout");
        }
        let prefix = if to_stderr {
            prefixes.stderr
        } else {
            prefixes.stdout
        };

        match &mut sinks {
            Sinks::Split { stderr, .. } if to_stderr => {
                write_frame(&mut **stderr, prefix, &frame.payload).await?;
            }
            Sinks::Split { stdout, .. } => {
                write_frame(&mut **stdout, prefix, &frame.payload).await?;
            }
            Sinks::Shared(sink) => {
                write_frame(&mut **sink, prefix, &frame.payload).await?;
            }
        }

        written += frame.payload.len() as u64;
    }

    Ok(written)
}

async fn write_frame<W>(sink: &mut W, prefix: &[u8], payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if !prefix.is_empty() {
        sink.write_all(prefix).await?;
    }
    sink.write_all(payload).await?;
    sink.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::Error;

    fn hello_world() -> Vec<u8> {
        let mut data = Frame::encode(StreamTag::Stdout, b"hello");
        data.extend(Frame::encode(StreamTag::Stderr, b"world"));
        data
    }

    #[tokio::test]
    async fn test_demux_routes_by_tag() {
        let data = hello_world();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let written = demux(data.as_slice(), &mut stdout, &mut stderr)
            .await
            .unwrap();

        assert_eq!(written, 10);
        assert_eq!(stdout, b"hello");
        assert_eq!(stderr, b"world");
    }

    #[tokio::test]
    async fn test_demux_with_prefix_excludes_prefix_from_count() {
        let data = hello_world();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let written =
            demux_with_prefix(data.as_slice(), &mut stdout, &mut stderr, "[OUT] ", "[ERR] ")
                .await
                .unwrap();

        assert_eq!(written, 10);
        assert_eq!(stdout, b"[OUT] hello");
        assert_eq!(stderr, b"[ERR] world");
    }

    #[tokio::test]
    async fn test_demux_shared_preserves_arrival_order() {
        let mut data = Frame::encode(StreamTag::Stdout, b"a");
        data.extend(Frame::encode(StreamTag::Stderr, b"b"));
        data.extend(Frame::encode(StreamTag::Stdout, b"c"));

        let mut sink = Vec::new();
        let written = demux_shared(data.as_slice(), &mut sink).await.unwrap();

        assert_eq!(written, 3);
        assert_eq!(sink, b"abc");
    }

    #[tokio::test]
    async fn test_demux_shared_with_prefix() {
        let data = hello_world();
        let mut sink = Vec::new();

        let written = demux_shared_with_prefix(data.as_slice(), &mut sink, "out: ", "err: ")
            .await
            .unwrap();

        assert_eq!(written, 10);
        assert_eq!(sink, b"out: helloerr: world");
    }

    #[tokio::test]
    async fn test_unknown_and_stdin_tags_go_to_stdout() {
        let mut data = Frame::encode(StreamTag::Stdin, b"in");
        data.extend([7u8, 0, 0, 0, 0, 0, 0, 3]);
        data.extend(b"odd");

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let written = demux(data.as_slice(), &mut stdout, &mut stderr)
            .await
            .unwrap();

        assert_eq!(written, 5);
        assert_eq!(stdout, b"inodd");
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_payload_stops_output() {
        let mut data = hello_world();
        data.truncate(data.len() - 1);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let err = demux(data.as_slice(), &mut stdout, &mut stderr)
            .await
            .unwrap_err();

        assert!(err.is_framing());
        assert_eq!(stdout, b"hello");
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn test_sink_error_is_returned() {
        struct Broken;

        impl AsyncWrite for Broken {
            fn poll_write(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &[u8],
            ) -> std::task::Poll<std::io::Result<usize>> {
                std::task::Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "sink closed",
                )))
            }

            fn poll_flush(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }

            fn poll_shutdown(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
        }

        let data = hello_world();
        let mut stdout = Vec::new();
        let err = demux(data.as_slice(), &mut stdout, &mut Broken)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::BrokenPipe));
    }
}
