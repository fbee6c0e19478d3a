//! HTTP/1.1 response model and serializer.
//!
//! Handlers build a [`Response`] with the fluent API; the connection controller
//! decorates it in place (compression, `Connection: close`) and finally calls
//! [`Response::write_to`], which emits the whole message with one buffered write.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use rivulet::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("content-length: 15\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    reason: String,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Creates a response with the canonical reason phrase for `status`.
    pub fn new(status: StatusCode) -> Self {
        Self::with_reason(status.as_u16(), status.canonical_reason())
    }

    /// Creates a response with an arbitrary code and reason phrase.
    pub fn with_reason(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Sets a response header, replacing any previous value for the same name.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a header in place. Used by post-processing steps that receive a
    /// finished `Response` and must decorate it without consuming it.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Replaces the body in place.
    ///
    /// Does not touch `Content-Length`; callers that change the body length after
    /// a length was set are responsible for updating it.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Returns the numeric status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the reason phrase.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes.
    pub fn payload(&self) -> &Bytes {
        &self.body
    }

    /// Adds `Content-Length` when the body is non-empty and no length was set.
    ///
    /// An explicit value is never overridden.
    pub fn ensure_content_length(&mut self) {
        if !self.body.is_empty() && !self.headers.contains("content-length") {
            self.headers
                .insert("Content-Length", self.body.len().to_string());
        }
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// The status line always carries `HTTP/1.1`. `Content-Length` is added as by
    /// [`ensure_content_length`](Self::ensure_content_length); nothing else is
    /// injected.
    pub fn into_bytes(mut self) -> BytesMut {
        self.ensure_content_length();

        let estimated_size = 64 + self.reason.len() + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        let head = format!("HTTP/1.1 {} {}\r\n{}\r\n", self.status, self.reason, self.headers);
        buf.put(head.as_bytes());
        buf.put(self.body);

        buf
    }

    /// Writes the response to `writer` and flushes it.
    ///
    /// The full message is assembled in memory first, so a response is either
    /// handed to the transport whole or, on error, the connection is abandoned.
    pub async fn write_to<W>(self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let buf = self.into_bytes();
        writer.write_all(&buf).await?;
        writer.flush().await
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
