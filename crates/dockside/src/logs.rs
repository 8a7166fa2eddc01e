//! Copying container log streams into local writers.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use dockside_stream::{demux, demux_shared, demux_shared_with_prefix, demux_with_prefix};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::error::Result;
use crate::transport::{BodyReader, Query};

/// Which log lines to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    /// Keeps the stream open and delivers new lines as they are written.
    pub follow: bool,
    pub timestamps: bool,
    /// Number of lines from the end; `None` means all.
    pub tail: Option<u64>,
    /// Unix timestamp or relative duration such as `10m`.
    pub since: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: true,
            timestamps: false,
            tail: None,
            since: None,
        }
    }
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn with_tail(mut self, lines: u64) -> Self {
        self.tail = Some(lines);
        self
    }

    pub fn with_since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    pub fn with_stdout(mut self, stdout: bool) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn with_stderr(mut self, stderr: bool) -> Self {
        self.stderr = stderr;
        self
    }

    pub(crate) fn query(&self) -> Query {
        let mut query = Query::new();
        query.push_bool("stdout", self.stdout);
        query.push_bool("stderr", self.stderr);
        query.push_flag("follow", self.follow);
        query.push_flag("timestamps", self.timestamps);
        match self.tail {
            Some(lines) => query.push("tail", &lines.to_string()),
            None => query.push("tail", "all"),
        }
        query.push_opt("since", self.since.as_deref());
        query
    }
}

/// A container's raw log stream, possibly also copied to the client's log
/// sink.
#[derive(Debug)]
pub enum LogStream {
    Direct(BodyReader),
    /// Fed by a background task that also writes to the log sink.
    Teed(DuplexStream),
}

impl AsyncRead for LogStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Direct(body) => Pin::new(body).poll_read(cx, buf),
            Self::Teed(pipe) => Pin::new(pipe).poll_read(cx, buf),
        }
    }
}

/// Routes a multiplexed log stream to a stdout writer and, optionally, a
/// separate stderr writer. Without a stderr writer both channels go to
/// stdout in arrival order.
#[derive(Debug)]
pub struct LogCopier<O, E = O> {
    stdout: O,
    stderr: Option<E>,
}

impl<O> LogCopier<O>
where
    O: AsyncWrite + Unpin,
{
    pub fn new(stdout: O) -> Self {
        Self {
            stdout,
            stderr: None,
        }
    }
}

impl<O, E> LogCopier<O, E>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    /// Sends stderr frames to their own writer.
    pub fn with_stderr<E2>(self, stderr: E2) -> LogCopier<O, E2>
    where
        E2: AsyncWrite + Unpin,
    {
        LogCopier {
            stdout: self.stdout,
            stderr: Some(stderr),
        }
    }

    /// Copies `source` until it ends. Returns payload bytes written.
    pub async fn copy<R>(&mut self, source: R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let written = match &mut self.stderr {
            Some(stderr) => demux(source, &mut self.stdout, stderr).await?,
            None => demux_shared(source, &mut self.stdout).await?,
        };
        Ok(written)
    }

    /// Like [`copy`](Self::copy), writing `stdout_prefix` or `stderr_prefix`
    /// before every frame. Prefix bytes are not counted.
    pub async fn copy_with_prefix<R>(
        &mut self,
        source: R,
        stdout_prefix: &str,
        stderr_prefix: &str,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let written = match &mut self.stderr {
            Some(stderr) => {
                demux_with_prefix(source, &mut self.stdout, stderr, stdout_prefix, stderr_prefix)
                    .await?
            }
            None => {
                demux_shared_with_prefix(source, &mut self.stdout, stdout_prefix, stderr_prefix)
                    .await?
            }
        };
        Ok(written)
    }

    pub fn into_inner(self) -> (O, Option<E>) {
        (self.stdout, self.stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockside_stream::{Frame, StreamTag};

    fn stream() -> Vec<u8> {
        let mut bytes = Frame::encode(StreamTag::Stdout, b"starting\n");
        bytes.extend(Frame::encode(StreamTag::Stderr, b"warning: low disk\n"));
        bytes.extend(Frame::encode(StreamTag::Stdout, b"ready\n"));
        bytes
    }

    #[test]
    fn test_log_query() {
        let query = LogOptions::new()
            .with_follow(false)
            .with_tail(50)
            .with_timestamps(true)
            .query();
        assert_eq!(query.to_string(), "stdout=1&stderr=1&timestamps=1&tail=50");
        assert_eq!(
            LogOptions::new().query().to_string(),
            "stdout=1&stderr=1&follow=1&tail=all"
        );
    }

    #[tokio::test]
    async fn test_split_copy() {
        let mut copier = LogCopier::new(Vec::new()).with_stderr(Vec::new());
        let written = copier.copy(&stream()[..]).await.unwrap();

        let (stdout, stderr) = copier.into_inner();
        assert_eq!(written, 33);
        assert_eq!(stdout, b"starting\nready\n");
        assert_eq!(stderr.unwrap(), b"warning: low disk\n");
    }

    #[tokio::test]
    async fn test_shared_copy_with_prefix() {
        let mut copier = LogCopier::new(Vec::new());
        let written = copier
            .copy_with_prefix(&stream()[..], "[web] ", "[web!] ")
            .await
            .unwrap();

        let (stdout, stderr) = copier.into_inner();
        assert_eq!(written, 33);
        assert!(stderr.is_none());
        assert_eq!(
            String::from_utf8(stdout).unwrap(),
            "[web] starting\n[web!] warning: low disk\n[web] ready\n"
        );
    }

    #[tokio::test]
    async fn test_truncated_stream_is_framing_error() {
        let mut bytes = stream();
        bytes.truncate(bytes.len() - 3);

        let mut copier = LogCopier::new(Vec::new());
        let err = copier.copy(&bytes[..]).await.unwrap_err();
        assert!(matches!(err, crate::Error::Stream(ref e) if e.is_framing()));
    }
}
