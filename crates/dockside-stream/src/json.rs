//! Decoding a stream of back-to-back JSON values.
//!
//! The engine reports stats snapshots and pull/push/build progress as a
//! sequence of JSON objects written one after another on a single response
//! body, usually newline separated but not guaranteed to be. `JsonStream`
//! yields one complete value per call and distinguishes a clean end of
//! stream from a truncated trailing value.

use std::marker::PhantomData;

use futures::Stream;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Read size used when more input is needed.
const READ_CHUNK: usize = 8 * 1024;

/// Lazy, finite, non-restartable sequence of decoded records.
pub struct JsonStream<R, T> {
    reader: R,
    buf: Vec<u8>,
    eof: bool,
    done: bool,
    _record: PhantomData<fn() -> T>,
}

impl<R, T> JsonStream<R, T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    /// Wraps a source of concatenated JSON values.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            eof: false,
            done: false,
            _record: PhantomData,
        }
    }

    /// Decodes the next record.
    ///
    /// Returns `Ok(None)` once the source ends with no partial value pending.
    /// Malformed input, or a value cut off by end of stream, is
    /// [`Error::Decode`]. After an error or the end of the stream every
    /// further call returns `Ok(None)`.
    pub async fn next(&mut self) -> Result<Option<T>> {
        if self.done {
            return Ok(None);
        }

        loop {
            if !self.buf.is_empty() {
                let (outcome, consumed) = {
                    let mut values =
                        serde_json::Deserializer::from_slice(&self.buf).into_iter::<T>();
                    let outcome = values.next();
                    (outcome, values.byte_offset())
                };

                match outcome {
                    Some(Ok(value)) if self.eof || !may_continue(&self.buf, consumed) => {
                        self.buf.drain(..consumed);
                        return Ok(Some(value));
                    }
                    // A bare scalar ending at the buffer end may have more digits
                    // or letters in the next read.
                    Some(Ok(_)) => {}
                    // Value continues past what has been read so far.
                    Some(Err(err)) if err.is_eof() && !self.eof => {}
                    Some(Err(err)) => {
                        self.done = true;
                        return Err(Error::Decode(err));
                    }
                    // Only whitespace left.
                    None => self.buf.clear(),
                }
            }

            if self.eof {
                self.done = true;
                return Ok(None);
            }

            self.buf.reserve(READ_CHUNK);
            let n = match self.reader.read_buf(&mut self.buf).await {
                Ok(n) => n,
                Err(err) => {
                    self.done = true;
                    return Err(err.into());
                }
            };
            if n == 0 {
                self.eof = true;
            }
        }
    }

    /// Adapts the decoder into a [`Stream`] of records.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures::stream::unfold(self, |mut records| async move {
            match records.next().await {
                Ok(Some(value)) => Some((Ok(value), records)),
                Ok(None) => None,
                Err(err) => Some((Err(err), records)),
            }
        })
    }

    /// Returns the wrapped source.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Returns true if the value parsed from `buf[..consumed]` could still grow
/// with more input: it runs to the end of the buffer and is not closed by a
/// bracket, brace or quote.
fn may_continue(buf: &[u8], consumed: usize) -> bool {
    consumed == buf.len() && !matches!(buf.last(), Some(b'}' | b']' | b'"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde::Deserialize;
    use tokio::io::AsyncWriteExt;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        n: u32,
    }

    #[tokio::test]
    async fn test_decodes_newline_separated_values() {
        let input = b"{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n";
        let mut stream: JsonStream<_, Sample> = JsonStream::new(&input[..]);

        assert_eq!(stream.next().await.unwrap(), Some(Sample { n: 1 }));
        assert_eq!(stream.next().await.unwrap(), Some(Sample { n: 2 }));
        assert_eq!(stream.next().await.unwrap(), Some(Sample { n: 3 }));
        assert_eq!(stream.next().await.unwrap(), None);
        assert_eq!(stream.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decodes_unseparated_values() {
        let input = b"{\"n\":1}{\"n\":2}";
        let mut stream: JsonStream<_, Sample> = JsonStream::new(&input[..]);

        assert_eq!(stream.next().await.unwrap(), Some(Sample { n: 1 }));
        assert_eq!(stream.next().await.unwrap(), Some(Sample { n: 2 }));
        assert_eq!(stream.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_and_whitespace_sources_end_cleanly() {
        let mut empty: JsonStream<_, Sample> = JsonStream::new(&b""[..]);
        assert_eq!(empty.next().await.unwrap(), None);

        let mut blank: JsonStream<_, Sample> = JsonStream::new(&b" \n\r\n "[..]);
        assert_eq!(blank.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_trailing_value_is_error() {
        let input = b"{\"n\":1}\n{\"n\":";
        let mut stream: JsonStream<_, Sample> = JsonStream::new(&input[..]);

        assert_eq!(stream.next().await.unwrap(), Some(Sample { n: 1 }));
        let err = stream.next().await.unwrap_err();
        assert!(err.is_decode());
        assert_eq!(stream.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_value_is_error() {
        let input = b"{\"n\":oops}";
        let mut stream: JsonStream<_, Sample> = JsonStream::new(&input[..]);
        assert!(stream.next().await.unwrap_err().is_decode());
    }

    #[tokio::test]
    async fn test_value_split_across_reads() {
        let (mut tx, rx) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            tx.write_all(b"{\"n\":").await.unwrap();
            tokio::task::yield_now().await;
            tx.write_all(b"42}\n").await.unwrap();
        });

        let mut stream: JsonStream<_, Sample> = JsonStream::new(rx);
        assert_eq!(stream.next().await.unwrap(), Some(Sample { n: 42 }));

        writer.await.unwrap();
        assert_eq!(stream.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scalar_split_across_reads() {
        let (mut tx, rx) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            tx.write_all(b"12").await.unwrap();
            tokio::task::yield_now().await;
            tx.write_all(b"34\n56").await.unwrap();
        });

        let mut stream: JsonStream<_, u64> = JsonStream::new(rx);
        assert_eq!(stream.next().await.unwrap(), Some(1234));
        // Trailing scalar is complete once the source ends.
        assert_eq!(stream.next().await.unwrap(), Some(56));
        assert_eq!(stream.next().await.unwrap(), None);

        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_into_stream_stops_after_error() {
        let input = b"{\"n\":1}{\"n\":x}{\"n\":3}";
        let stream = JsonStream::<_, Sample>::new(&input[..]).into_stream();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Sample { n: 1 });
        assert!(items[1].is_err());
    }
}
