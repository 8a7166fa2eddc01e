//! Stream plumbing for the Docker Engine API.
//!
//! The engine multiplexes container stdout and stderr onto a single byte
//! stream when no TTY is allocated, and reports long-running operations
//! (pull, push, build, stats) as back-to-back JSON values. This crate turns
//! both formats into something callers can consume directly:
//!
//! ```text
//!   engine body ──► FrameReader ──► demux ──┬──► stdout sink
//!                                           └──► stderr sink
//!
//!   engine body ──► JsonStream<T> ──► T, T, T, … (Ok(None) at clean EOF)
//! ```
//!
//! # Frame format
//!
//! ```text
//! ┌────────┬───────────┬──────────────────┬──────────────────┐
//! │ tag(1) │ zero(3)   │ length(4, BE)    │ payload(length)  │
//! └────────┴───────────┴──────────────────┴──────────────────┘
//! tag: 0 = stdin, 1 = stdout, 2 = stderr
//! ```
//!
//! Everything here runs on the caller's task except [`tee`], which spawns
//! one background task.

pub mod demux;
pub mod error;
pub mod frame;
pub mod json;
pub mod progress;
pub mod tee;

pub use demux::{demux, demux_shared, demux_shared_with_prefix, demux_with_prefix};
pub use error::{Error, Result};
pub use frame::{Frame, FrameReader, StreamTag, HEADER_LEN};
pub use json::JsonStream;
pub use progress::{drain_progress, ProgressEvent, ProgressStream};
pub use tee::{shared_writer, tee, SharedWriter};
