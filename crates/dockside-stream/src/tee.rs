//! Background fan-out of a raw stream to a caller pipe and a shared sink.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

/// Pipe capacity between the tee task and the caller.
const TEE_BUFFER_SIZE: usize = 64 * 1024;

/// A writer that several owners can write to in turn.
pub type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Wraps a writer so it can be shared between a client and background tasks.
pub fn shared_writer<W>(writer: W) -> SharedWriter
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Copies `source` to both the returned pipe and `sink` on a spawned task.
///
/// The task owns the pipe's write side and shuts it down on every exit path,
/// so the caller's reads always end. Dropping the returned stream stops the
/// copy at its next write.
///
/// A source error is only logged. The pipe then ends like a clean EOF, so a
/// reader cannot tell a cut-off stream from a complete one; callers that
/// need to know must check the source themselves.
pub fn tee<R>(source: R, sink: SharedWriter) -> DuplexStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (reader, mut writer) = tokio::io::duplex(TEE_BUFFER_SIZE);

    tokio::spawn(async move {
        let result = copy_to_both(source, &mut writer, &sink).await;

        if let Err(e) = writer.shutdown().await {
            tracing::debug!("tee pipe shutdown failed: {}", e);
        }
        drop(writer);

        match result {
            Ok(bytes) => tracing::debug!(bytes, "tee finished"),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!("tee reader closed: {}", e);
            }
            Err(e) => tracing::warn!("error copying stream to tee sink: {}", e),
        }
    });

    reader
}

async fn copy_to_both<R>(
    mut source: R,
    pipe: &mut DuplexStream,
    sink: &SharedWriter,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8 * 1024];
    let mut total = 0u64;

    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        pipe.write_all(&buf[..n]).await?;
        {
            let mut sink = sink.lock().await;
            sink.write_all(&buf[..n]).await?;
            sink.flush().await?;
        }

        total += n as u64;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records into a buffer readable after the tee finishes.
    #[derive(Clone, Default)]
    struct Recorder(Arc<std::sync::Mutex<Vec<u8>>>);

    impl AsyncWrite for Recorder {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            std::task::Poll::Ready(Ok(buf.len()))
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

    #[tokio::test]
    async fn test_tee_copies_to_pipe_and_sink() {
        let recorder = Recorder::default();
        let sink = shared_writer(recorder.clone());

        let mut pipe = tee(&b"line one\nline two\n"[..], sink);

        let mut received = Vec::new();
        pipe.read_to_end(&mut received).await.unwrap();

        assert_eq!(received, b"line one\nline two\n");
        assert_eq!(&*recorder.0.lock().unwrap(), b"line one\nline two\n");
    }

    #[tokio::test]
    async fn test_tee_closes_pipe_on_source_error() {
        struct Failing;

        impl AsyncRead for Failing {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "engine went away",
                )))
            }
        }

        let recorder = Recorder::default();
        let source = (&b"partial "[..]).chain(Failing);
        let mut pipe = tee(source, shared_writer(recorder.clone()));

        // The cut-off stream reads as a clean EOF after the bytes already copied.
        let mut received = Vec::new();
        pipe.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"partial ");
        assert_eq!(&*recorder.0.lock().unwrap(), b"partial ");
    }
}
