//! Progress records emitted by image pull, push, build and load.
//!
//! A progress stream can decode perfectly and still describe a failed
//! operation: the engine reports failures such as an unknown manifest as a
//! record with an `error` field. [`ProgressStream`] and [`drain_progress`]
//! turn such a record into [`Error::Operation`] so it ends the operation.

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::json::JsonStream;

/// One JSON progress record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Build output line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,

    /// Human-readable status, e.g. `Pull complete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Rendered progress bar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,

    /// Layer or image ID the record refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(
        default,
        rename = "progressDetail",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress_detail: Option<ProgressDetail>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux: Option<ProgressAux>,

    #[serde(
        default,
        rename = "errorDetail",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_detail: Option<ErrorDetail>,

    /// Failure message; present only when the operation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Byte counters for a layer transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

/// Auxiliary payload, e.g. the image ID produced by a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressAux {
    #[serde(default, rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Structured form of the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    /// Returns the failure carried by this record, if any.
    ///
    /// `error` wins over `errorDetail.message`; empty strings do not count.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        let detail = self
            .error_detail
            .as_ref()
            .and_then(|detail| detail.message.as_deref());

        self.error
            .as_deref()
            .filter(|msg| !msg.is_empty())
            .or_else(|| detail.filter(|msg| !msg.is_empty()))
    }

    /// Converts an error-carrying record into [`Error::Operation`].
    pub fn into_result(self) -> Result<Self> {
        match self.error_message() {
            Some(msg) => Err(Error::Operation(msg.to_string())),
            None => Ok(self),
        }
    }
}

/// Progress records where an embedded error ends the stream with an error.
pub struct ProgressStream<R> {
    records: JsonStream<R, ProgressEvent>,
}

impl<R> ProgressStream<R>
where
    R: AsyncRead + Unpin,
{
    /// Wraps a progress response body.
    pub fn new(reader: R) -> Self {
        Self {
            records: JsonStream::new(reader),
        }
    }

    /// Returns the next successful record, `Ok(None)` at clean end of stream.
    pub async fn next(&mut self) -> Result<Option<ProgressEvent>> {
        match self.records.next().await? {
            Some(event) => event.into_result().map(Some),
            None => Ok(None),
        }
    }
}

/// Consumes a whole progress stream, calling `on_event` for every record.
///
/// Returns the number of records seen. Stops at the first record carrying an
/// error and returns it as [`Error::Operation`].
pub async fn drain_progress<R, F>(source: R, mut on_event: F) -> Result<u64>
where
    R: AsyncRead + Unpin,
    F: FnMut(&ProgressEvent),
{
    let mut stream = ProgressStream::new(source);
    let mut seen = 0u64;
    while let Some(event) = stream.next().await? {
        on_event(&event);
        seen += 1;
    }
    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_precedence() {
        let event: ProgressEvent = serde_json::from_str(
            r#"{"errorDetail":{"message":"detail"},"error":"top-level"}"#,
        )
        .unwrap();
        assert_eq!(event.error_message(), Some("top-level"));

        let event: ProgressEvent =
            serde_json::from_str(r#"{"errorDetail":{"message":"detail"},"error":""}"#).unwrap();
        assert_eq!(event.error_message(), Some("detail"));

        let event: ProgressEvent = serde_json::from_str(r#"{"status":"Downloading"}"#).unwrap();
        assert_eq!(event.error_message(), None);
    }

    #[test]
    fn test_decodes_engine_fields() {
        let event: ProgressEvent = serde_json::from_str(
            r#"{"status":"Downloading","progressDetail":{"current":512,"total":2048},"progress":"[==>   ]","id":"a1b2c3"}"#,
        )
        .unwrap();

        assert_eq!(event.status.as_deref(), Some("Downloading"));
        assert_eq!(event.id.as_deref(), Some("a1b2c3"));
        let detail = event.progress_detail.unwrap();
        assert_eq!(detail.current, Some(512));
        assert_eq!(detail.total, Some(2048));
    }

    #[test]
    fn test_build_aux_id() {
        let event: ProgressEvent =
            serde_json::from_str(r#"{"aux":{"ID":"sha256:deadbeef"}}"#).unwrap();
        assert_eq!(
            event.aux.and_then(|aux| aux.id).as_deref(),
            Some("sha256:deadbeef")
        );
    }

    #[tokio::test]
    async fn test_drain_progress_counts_records() {
        let input = b"{\"status\":\"Pulling fs layer\",\"id\":\"1\"}\n{\"status\":\"Pull complete\",\"id\":\"1\"}\n";
        let mut statuses = Vec::new();

        let seen = drain_progress(&input[..], |event| {
            statuses.push(event.status.clone().unwrap_or_default());
        })
        .await
        .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(statuses, ["Pulling fs layer", "Pull complete"]);
    }

    #[tokio::test]
    async fn test_embedded_error_fails_operation() {
        let input = b"{\"status\":\"Pulling from library/nope\"}\n{\"errorDetail\":{\"message\":\"manifest unknown\"},\"error\":\"manifest unknown\"}\n{\"status\":\"never seen\"}\n";
        let mut seen = 0;

        let err = drain_progress(&input[..], |_| seen += 1).await.unwrap_err();

        assert!(err.is_operation());
        assert_eq!(err.to_string(), "operation failed: manifest unknown");
        assert_eq!(seen, 1);
    }
}
