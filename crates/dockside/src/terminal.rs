//! Interactive terminal sessions over a hijacked engine connection.
//!
//! A session owns a terminal in raw mode and the two halves of a remote
//! connection. [`InteractiveSession::run`] copies remote output to the local
//! output and local input to the remote side on two spawned tasks, returns
//! as soon as either direction ends, and restores the terminal before
//! returning. Dropping the session restores it as well.

use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dockside_error::CommonError;
use nix::sys::termios::{self, SetArg, Termios};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;

use crate::error::{Error, Result};

/// Interval between terminal size polls in [`InteractiveSession::monitor_size`].
pub const SIZE_POLL_INTERVAL: Duration = Duration::from_millis(250);

const COPY_BUFFER_SIZE: usize = 4096;

/// Terminal size (width x height).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    /// Width in columns.
    pub cols: u16,
    /// Height in rows.
    pub rows: u16,
}

/// A terminal whose line discipline can be switched to raw mode and back.
pub trait RawTerminal: Send + 'static {
    /// Saves the current mode and switches to raw mode.
    fn make_raw(&mut self) -> io::Result<()>;

    /// Restores the mode saved by [`make_raw`](Self::make_raw). Does nothing
    /// if there is no saved mode.
    fn restore(&mut self) -> io::Result<()>;

    fn size(&self) -> io::Result<TerminalSize>;
}

/// [`RawTerminal`] backed by termios on a file descriptor.
pub struct TermiosTerminal<F> {
    fd: F,
    saved: Option<Termios>,
}

impl<F: AsFd> TermiosTerminal<F> {
    pub fn new(fd: F) -> Self {
        Self { fd, saved: None }
    }
}

impl TermiosTerminal<std::io::Stdin> {
    /// The process's standard input.
    pub fn stdin() -> Self {
        Self::new(std::io::stdin())
    }
}

impl<F> RawTerminal for TermiosTerminal<F>
where
    F: AsFd + Send + 'static,
{
    fn make_raw(&mut self) -> io::Result<()> {
        let original = termios::tcgetattr(&self.fd)?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&self.fd, SetArg::TCSANOW, &raw)?;
        self.saved = Some(original);
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        match self.saved.take() {
            Some(original) => Ok(termios::tcsetattr(&self.fd, SetArg::TCSANOW, &original)?),
            None => Ok(()),
        }
    }

    fn size(&self) -> io::Result<TerminalSize> {
        let mut ws = libc::winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: TIOCGWINSZ writes a winsize into the pointer; the fd is
        // borrowed from `self.fd` and stays open for the call.
        let rc = unsafe { libc::ioctl(self.fd.as_fd().as_raw_fd(), libc::TIOCGWINSZ, &mut ws) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(TerminalSize {
            cols: ws.ws_col,
            rows: ws.ws_row,
        })
    }
}

type LocalInput = Box<dyn AsyncRead + Send + Unpin>;
type LocalOutput = Box<dyn AsyncWrite + Send + Unpin>;

struct SessionIo<R, W> {
    remote_reader: R,
    remote_writer: W,
    local_in: LocalInput,
    local_out: LocalOutput,
}

/// A raw-mode terminal bridged to a remote connection.
pub struct InteractiveSession<T: RawTerminal, R, W> {
    terminal: Arc<Mutex<T>>,
    raw: bool,
    io: Option<SessionIo<R, W>>,
}

impl<T, R, W> InteractiveSession<T, R, W>
where
    T: RawTerminal,
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    /// Switches `terminal` to raw mode and takes ownership of the remote
    /// halves. On failure nothing is held and there is nothing to close.
    pub fn open(mut terminal: T, remote_reader: R, remote_writer: W) -> Result<Self> {
        terminal
            .make_raw()
            .map_err(|e| Error::terminal("raw mode", e))?;
        tracing::debug!("terminal switched to raw mode");

        Ok(Self {
            terminal: Arc::new(Mutex::new(terminal)),
            raw: true,
            io: Some(SessionIo {
                remote_reader,
                remote_writer,
                local_in: Box::new(tokio::io::stdin()),
                local_out: Box::new(tokio::io::stdout()),
            }),
        })
    }

    /// Replaces process stdin/stdout as the local side.
    pub fn with_local_io<I, O>(mut self, input: I, output: O) -> Self
    where
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Send + Unpin + 'static,
    {
        if let Some(io) = self.io.as_mut() {
            io.local_in = Box::new(input);
            io.local_out = Box::new(output);
        }
        self
    }

    /// Copies both directions until the first one finishes.
    ///
    /// The other direction's task is aborted, as are both if the returned
    /// future is dropped early; a read already parked on
    /// process stdin stays parked until the next byte or EOF. The terminal
    /// is restored before this returns. A copy error is reported in
    /// preference to a restore error.
    pub async fn run(mut self) -> Result<()> {
        let io = self
            .io
            .take()
            .ok_or_else(|| CommonError::invalid_state("session already ran"))?;

        // Both copies stop if this future is dropped before either finishes.
        let mut output =
            AbortOnDropHandle::new(tokio::spawn(pump(io.remote_reader, io.local_out, "output")));
        let mut input =
            AbortOnDropHandle::new(tokio::spawn(pump(io.local_in, io.remote_writer, "input")));

        let finished = tokio::select! {
            res = &mut output => {
                tracing::debug!("remote output finished");
                input.abort();
                res
            }
            res = &mut input => {
                tracing::debug!("local input finished");
                output.abort();
                res
            }
        };

        let copied = match finished {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::from(e)),
            Err(join) => Err(Error::from(io::Error::other(join))),
        };
        let restored = self.close();
        copied.and(restored)
    }
}

impl<T: RawTerminal, R, W> InteractiveSession<T, R, W> {
    /// Restores the terminal. Later calls do nothing.
    ///
    /// A failed restore is reported once and not retried.
    pub fn close(&mut self) -> Result<()> {
        if !self.raw {
            return Ok(());
        }
        self.raw = false;

        lock(&self.terminal)
            .restore()
            .map_err(|e| Error::terminal("restore", e))?;
        tracing::debug!("terminal restored");
        Ok(())
    }

    /// Current size of the local terminal.
    pub fn size(&self) -> Result<TerminalSize> {
        lock(&self.terminal)
            .size()
            .map_err(|e| Error::terminal("size query", e))
    }

    /// Polls the terminal size every [`SIZE_POLL_INTERVAL`] and sends each
    /// reading on the returned channel.
    ///
    /// The channel closes the first time a size query fails. Polling stops
    /// when the receiver is dropped.
    pub fn monitor_size(&self) -> mpsc::Receiver<TerminalSize> {
        let terminal = Arc::clone(&self.terminal);
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            loop {
                let size = lock(&terminal).size();
                match size {
                    Ok(size) => {
                        if tx.send(size).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("terminal size query failed: {}", e);
                        break;
                    }
                }
                tokio::time::sleep(SIZE_POLL_INTERVAL).await;
            }
        });

        rx
    }
}

impl<T: RawTerminal, R, W> Drop for InteractiveSession<T, R, W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("failed to restore terminal: {}", e);
        }
    }
}

fn lock<T>(terminal: &Mutex<T>) -> MutexGuard<'_, T> {
    terminal.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn pump<R, W>(mut from: R, mut to: W, direction: &'static str) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        let n = match from.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(direction, "read failed: {}", e);
                return Err(e);
            }
        };
        if let Err(e) = to.write_all(&buf[..n]).await {
            tracing::debug!(direction, "write failed: {}", e);
            return Err(e);
        }
        to.flush().await?;
        copied += n as u64;
    }

    tracing::debug!(direction, bytes = copied, "copy reached EOF");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    #[derive(Clone, Default)]
    struct MockTerminal {
        fail_raw: bool,
        fail_restore: bool,
        raw_calls: Arc<AtomicUsize>,
        restores: Arc<AtomicUsize>,
        size_queries_left: Option<Arc<AtomicUsize>>,
    }

    impl RawTerminal for MockTerminal {
        fn make_raw(&mut self) -> io::Result<()> {
            if self.fail_raw {
                return Err(io::Error::from_raw_os_error(libc::ENOTTY));
            }
            self.raw_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn restore(&mut self) -> io::Result<()> {
            self.restores.fetch_add(1, Ordering::SeqCst);
            if self.fail_restore {
                return Err(io::Error::from_raw_os_error(libc::EIO));
            }
            Ok(())
        }

        fn size(&self) -> io::Result<TerminalSize> {
            if let Some(left) = &self.size_queries_left {
                if left.load(Ordering::SeqCst) == 0 {
                    return Err(io::Error::from_raw_os_error(libc::EBADF));
                }
                left.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(TerminalSize { cols: 120, rows: 40 })
        }
    }

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        }
    }

    #[test]
    fn test_open_failure_holds_nothing() {
        let terminal = MockTerminal {
            fail_raw: true,
            ..Default::default()
        };
        let restores = terminal.restores.clone();

        let err = InteractiveSession::open(terminal, tokio::io::empty(), tokio::io::sink())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Terminal { op: "raw mode", .. }));
        assert_eq!(restores.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let terminal = MockTerminal::default();
        let restores = terminal.restores.clone();

        let mut session =
            InteractiveSession::open(terminal, tokio::io::empty(), tokio::io::sink()).unwrap();
        session.close().unwrap();
        session.close().unwrap();
        drop(session);

        assert_eq!(restores.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_restore_is_reported_once() {
        let terminal = MockTerminal {
            fail_restore: true,
            ..Default::default()
        };
        let restores = terminal.restores.clone();

        let mut session =
            InteractiveSession::open(terminal, tokio::io::empty(), tokio::io::sink()).unwrap();
        let err = session.close().unwrap_err();
        assert!(matches!(err, Error::Terminal { op: "restore", .. }));

        session.close().unwrap();
        drop(session);
        assert_eq!(restores.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_restores() {
        let terminal = MockTerminal::default();
        let restores = terminal.restores.clone();

        let session =
            InteractiveSession::open(terminal, tokio::io::empty(), tokio::io::sink()).unwrap();
        drop(session);

        assert_eq!(restores.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_returns_when_remote_output_ends() {
        let terminal = MockTerminal::default();
        let restores = terminal.restores.clone();

        // Local input never produces data or EOF while `_keyboard` is alive.
        let (local_in, _keyboard) = tokio::io::duplex(64);
        let (local_out, mut screen) = tokio::io::duplex(64);
        let (remote_writer, _remote_stdin) = tokio::io::duplex(64);

        let session = InteractiveSession::open(terminal, &b"container says hi"[..], remote_writer)
            .unwrap()
            .with_local_io(local_in, local_out);

        session.run().await.unwrap();
        assert_eq!(restores.load(Ordering::SeqCst), 1);

        let mut shown = String::new();
        screen.read_to_string(&mut shown).await.unwrap();
        assert_eq!(shown, "container says hi");
    }

    #[tokio::test]
    async fn test_run_forwards_local_input() {
        let terminal = MockTerminal::default();

        let (remote_reader, _remote_stdout) = tokio::io::duplex(64);
        let (remote_writer, mut remote_stdin) = tokio::io::duplex(64);

        let session = InteractiveSession::open(terminal, remote_reader, remote_writer)
            .unwrap()
            .with_local_io(&b"ls -la\r"[..], tokio::io::sink());

        session.run().await.unwrap();

        let mut forwarded = String::new();
        remote_stdin.read_to_string(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, "ls -la\r");
    }

    #[tokio::test]
    async fn test_run_error_still_restores() {
        let terminal = MockTerminal::default();
        let restores = terminal.restores.clone();
        let (local_in, _keyboard) = tokio::io::duplex(64);

        let session = InteractiveSession::open(terminal, BrokenReader, tokio::io::sink())
            .unwrap()
            .with_local_io(local_in, tokio::io::sink());

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, Error::Common(CommonError::Io(_))));
        assert_eq!(restores.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_copy_error_wins_over_restore_error() {
        let terminal = MockTerminal {
            fail_restore: true,
            ..Default::default()
        };
        let restores = terminal.restores.clone();
        let (local_in, _keyboard) = tokio::io::duplex(64);

        let session = InteractiveSession::open(terminal, BrokenReader, tokio::io::sink())
            .unwrap()
            .with_local_io(local_in, tokio::io::sink());

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, Error::Common(CommonError::Io(_))));
        assert_eq!(restores.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_stops_forwarding() {
        let terminal = MockTerminal::default();
        let restores = terminal.restores.clone();

        let (local_in, mut keyboard) = tokio::io::duplex(64);
        let (remote_reader, _remote_stdout) = tokio::io::duplex(64);
        let (remote_writer, mut remote_stdin) = tokio::io::duplex(64);

        let session = InteractiveSession::open(terminal, remote_reader, remote_writer)
            .unwrap()
            .with_local_io(local_in, tokio::io::sink());

        let run = tokio::time::timeout(Duration::from_millis(20), session.run()).await;
        assert!(run.is_err());
        assert_eq!(restores.load(Ordering::SeqCst), 1);

        // May fail if the aborted copy has already dropped its local reader.
        let _ = keyboard.write_all(b"after-close").await;
        drop(keyboard);

        // The aborted input copy drops its remote half without forwarding.
        let mut forwarded = String::new();
        remote_stdin.read_to_string(&mut forwarded).await.unwrap();
        assert!(forwarded.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_size_closes_on_query_failure() {
        let terminal = MockTerminal {
            size_queries_left: Some(Arc::new(AtomicUsize::new(2))),
            ..Default::default()
        };

        let session =
            InteractiveSession::open(terminal, tokio::io::empty(), tokio::io::sink()).unwrap();
        let mut sizes = session.monitor_size();

        let mut seen = Vec::new();
        while let Some(size) = sizes.recv().await {
            seen.push(size);
        }
        assert_eq!(seen, [TerminalSize { cols: 120, rows: 40 }; 2]);
        assert!(session.size().is_err());
    }
}
