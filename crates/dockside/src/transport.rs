//! HTTP transport to the engine's Unix socket.
//!
//! Every request opens its own connection: connect, HTTP/1.1 handshake,
//! drive the connection on a spawned task, send one request. Paths passed in
//! are unversioned (`/containers/json`); the API version prefix is added
//! here.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use dockside_error::CommonError;
use futures::stream::{BoxStream, StreamExt};
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper::upgrade::Upgraded;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::net::UnixStream;
use tokio_util::io::StreamReader;

use crate::config::client::{lower_version, ClientConfig};
use crate::error::{Error, Result};

/// Bidirectional stream left over after a `101 Switching Protocols`.
pub type Hijacked = TokioIo<Upgraded>;

/// URL query string builder.
///
/// Values are percent-encoded; keys are written as given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: &str) {
        self.0.push((key.to_string(), value.to_string()));
    }

    /// Pushes `key` only when a value is present.
    pub fn push_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.push(key, value);
        }
    }

    /// Pushes `key=1` when `flag` is set, nothing otherwise.
    pub fn push_flag(&mut self, key: &str, flag: bool) {
        if flag {
            self.push(key, "1");
        }
    }

    /// Pushes `key=1` or `key=0`.
    pub fn push_bool(&mut self, key: &str, value: bool) {
        self.push(key, if value { "1" } else { "0" });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends the query to `path`, adding `?` only when non-empty.
    pub fn to_path(&self, path: &str) -> String {
        if self.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{self}")
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", key, encode(value))?;
        }
        Ok(())
    }
}

fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Request body.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Json(Bytes),
    Raw {
        data: Bytes,
        content_type: &'static str,
    },
}

impl Payload {
    pub fn json<B: Serialize + ?Sized>(body: &B) -> Result<Self> {
        Ok(Self::Json(Bytes::from(serde_json::to_vec(body)?)))
    }

    /// A tar archive, as sent for build contexts and image loads.
    pub fn tar(data: impl Into<Bytes>) -> Self {
        Self::Raw {
            data: data.into(),
            content_type: "application/x-tar",
        }
    }

    fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Json(_) => Some("application/json"),
            Self::Raw { content_type, .. } => Some(*content_type),
        }
    }

    fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Json(data) | Self::Raw { data, .. } => data,
        }
    }
}

/// Streaming response body as an [`AsyncRead`].
pub struct BodyReader {
    inner: StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>,
}

impl BodyReader {
    fn new(body: Incoming) -> Self {
        let chunks = BodyStream::new(body)
            .filter_map(|frame| async move {
                match frame {
                    Ok(frame) => frame.into_data().ok().map(Ok),
                    Err(e) => Some(Err(io::Error::other(e))),
                }
            })
            .boxed();
        Self {
            inner: StreamReader::new(chunks),
        }
    }
}

impl AsyncRead for BodyReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReader").finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionBody {
    api_version: String,
}

/// Connection settings for the engine socket.
#[derive(Debug, Clone)]
pub struct Transport {
    socket_path: PathBuf,
    api_version: String,
}

impl Transport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            api_version: config.api_version.trim_start_matches('v').to_string(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Lowers the API version to what the engine supports.
    ///
    /// An engine that does not answer `/version` usefully leaves the
    /// configured version in place.
    pub async fn negotiate(&mut self) -> Result<()> {
        let response = self.send(Method::GET, "/version", Payload::Empty, &[], false).await?;
        let body = response.into_body().collect().await?.to_bytes();
        match serde_json::from_slice::<VersionBody>(&body) {
            Ok(version) => {
                let chosen = lower_version(&self.api_version, &version.api_version).to_string();
                tracing::debug!(
                    engine = %version.api_version,
                    chosen = %chosen,
                    "negotiated API version"
                );
                self.api_version = chosen;
            }
            Err(e) => {
                tracing::debug!("engine version unreadable, keeping {}: {}", self.api_version, e);
            }
        }
        Ok(())
    }

    /// Checks that the engine answers on the socket.
    pub async fn ping(&self) -> Result<()> {
        self.send(Method::GET, "/_ping", Payload::Empty, &[], false)
            .await
            .map(drop)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.request(Method::GET, path, Payload::Empty).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn post<T, B>(&self, path: &str, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let payload = match body {
            Some(body) => Payload::json(body)?,
            None => Payload::Empty,
        };
        let body = self.request(Method::POST, path, payload).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// POSTs and discards the response body.
    pub async fn post_empty<B>(&self, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let payload = match body {
            Some(body) => Payload::json(body)?,
            None => Payload::Empty,
        };
        self.request(Method::POST, path, payload).await.map(drop)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request(Method::DELETE, path, Payload::Empty).await.map(drop)
    }

    /// Sends a request and hands back the response body unread.
    pub async fn stream(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        headers: &[(&'static str, String)],
    ) -> Result<BodyReader> {
        let response = self
            .send(method, &self.versioned(path), payload, headers, false)
            .await?;
        Ok(BodyReader::new(response.into_body()))
    }

    /// Sends an upgrade request and returns the hijacked connection.
    pub async fn upgrade<B>(&self, path: &str, body: Option<&B>) -> Result<Hijacked>
    where
        B: Serialize + ?Sized,
    {
        let payload = match body {
            Some(body) => Payload::json(body)?,
            None => Payload::Empty,
        };
        let response = self
            .send(Method::POST, &self.versioned(path), payload, &[], true)
            .await?;

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(Error::api(
                response.status().as_u16(),
                "engine did not switch protocols",
            ));
        }

        let upgraded = hyper::upgrade::on(response).await?;
        Ok(TokioIo::new(upgraded))
    }

    fn versioned(&self, path: &str) -> String {
        format!("/v{}{}", self.api_version, path)
    }

    async fn request(&self, method: Method, path: &str, payload: Payload) -> Result<Bytes> {
        let response = self
            .send(method, &self.versioned(path), payload, &[], false)
            .await?;
        Ok(response.into_body().collect().await?.to_bytes())
    }

    async fn connect(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.socket_path).await.map_err(|e| {
            match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
                    CommonError::daemon_not_running(format!(
                        "cannot connect to {}: {}",
                        self.socket_path.display(),
                        e
                    ))
                    .into()
                }
                _ => Error::from(e),
            }
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        headers: &[(&'static str, String)],
        upgrade: bool,
    ) -> Result<Response<Incoming>> {
        let io = TokioIo::new(self.connect().await?);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        if upgrade {
            tokio::spawn(async move {
                if let Err(e) = conn.with_upgrades().await {
                    tracing::debug!("upgraded connection closed: {}", e);
                }
            });
        } else {
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::debug!("connection closed: {}", e);
                }
            });
        }

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(format!("http://localhost{path}"))
            .header("Host", "localhost");
        if let Some(content_type) = payload.content_type() {
            builder = builder.header("Content-Type", content_type);
        }
        if upgrade {
            builder = builder.header("Connection", "Upgrade").header("Upgrade", "tcp");
        }
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = builder.body(Full::new(payload.into_bytes()))?;

        tracing::trace!(%method, path, "engine request");
        let response = sender.send_request(request).await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::SWITCHING_PROTOCOLS {
            return Ok(response);
        }

        let body = response.into_body().collect().await?.to_bytes();
        let message = serde_json::from_slice::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());
        tracing::debug!(status = status.as_u16(), %message, "engine rejected request");
        Err(Error::api(status.as_u16(), message))
    }
}
