//! Multiplexed stream frames.
//!
//! Engine format: `[stream_type (1 byte)][padding (3 bytes)][size (4 bytes BE)][data]`.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Size of a frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Logical channel a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamTag {
    Stdin = 0,
    Stdout = 1,
    Stderr = 2,
}

impl StreamTag {
    /// Decodes a tag byte, returning `None` for tags the engine does not define.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }
}

/// A single demultiplexed chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw tag byte as read from the header.
    pub tag: u8,
    /// Frame payload, exactly as long as the header announced.
    pub payload: Bytes,
}

impl Frame {
    /// Returns the decoded channel, or `None` for an unknown tag.
    #[must_use]
    pub const fn stream(&self) -> Option<StreamTag> {
        StreamTag::from_byte(self.tag)
    }

    /// Encodes `payload` as a single frame on `tag`.
    ///
    /// # Panics
    ///
    /// Panics if the payload is longer than `u32::MAX` bytes.
    #[must_use]
    pub fn encode(tag: StreamTag, payload: &[u8]) -> Vec<u8> {
        let len = u32::try_from(payload.len()).expect("frame payload exceeds u32::MAX");
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.push(tag as u8);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }
}

/// Reads frames one at a time from a multiplexed source.
///
/// Holds at most one frame in memory.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    header: [u8; HEADER_LEN],
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wraps a multiplexed source.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            header: [0; HEADER_LEN],
        }
    }

    /// Returns the wrapped source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` when the source ends exactly at a frame boundary.
    /// Ending anywhere else is a framing error.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.inner.read(&mut self.header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(Error::ShortHeader { read: filled });
            }
            filled += n;
        }

        let tag = self.header[0];
        let expected = u32::from_be_bytes([
            self.header[4],
            self.header[5],
            self.header[6],
            self.header[7],
        ]) as usize;

        // Grows with the bytes actually received, not the declared length.
        let mut payload = Vec::new();
        let read = (&mut self.inner)
            .take(expected as u64)
            .read_to_end(&mut payload)
            .await?;
        if read < expected {
            return Err(Error::ShortPayload { expected, read });
        }

        Ok(Some(Frame {
            tag,
            payload: Bytes::from(payload),
        }))
    }
}
