//! HTTP/1.1 request parsing from a buffered byte stream.
//!
//! The parser is line-oriented and lenient: header lines without a
//! colon are skipped instead of rejected, and trailing whitespace before the line
//! terminator is tolerated. Framing, however, is strict: a body is read only when
//! `Content-Length` is present, and then exactly that many bytes or nothing.

use std::io;
use std::str;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{Headers, Method};

/// Largest `Content-Length` the parser accepts (10 MiB).
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Longest single line (request line or header line) we will buffer.
const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Maximum number of header lines we support per request.
const MAX_HEADERS: usize = 64;

/// Errors that can occur while reading an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request line: {line:?}")]
    MalformedRequestLine { line: String },

    #[error("invalid Content-Length: {value:?}")]
    InvalidContentLength { value: String },

    #[error("request body of {length} bytes exceeds maximum allowed size of {max_bytes} bytes")]
    BodyTooLarge { length: u64, max_bytes: usize },

    #[error("line exceeds maximum length of {max_bytes} bytes")]
    LineTooLong { max_bytes: usize },

    #[error("more than {max} header lines")]
    TooManyHeaders { max: usize },

    /// The stream ended before a complete request was read.
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RequestError {
    /// `true` when the peer simply went away, as opposed to sending garbage.
    pub fn is_connection_closed(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// A fully parsed HTTP/1.1 request.
///
/// Produced by [`read_request`], or assembled directly with [`Request::new`] and
/// the builder methods when driving handlers without a socket.
///
/// # Examples
///
/// ```
/// use rivulet::http::{Method, Request};
///
/// let request = Request::new(Method::Post, "/files/notes.txt")
///     .with_header("Content-Type", "text/plain")
///     .with_body("hello");
///
/// assert_eq!(request.path(), "/files/notes.txt");
/// assert_eq!(request.header("content-type"), Some("text/plain"));
/// assert_eq!(&request.body()[..], b"hello");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    version: String,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Creates an `HTTP/1.1` request with no headers and an empty body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            version: "HTTP/1.1".to_owned(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Sets a header, replacing any previous value for the same name.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target exactly as it appeared on the request line.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the protocol version token, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Shorthand for `self.headers().get(name)`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }

    /// Returns `true` if the client asked for the connection to be closed after
    /// this exchange (`Connection: close`).
    pub fn wants_close(&self) -> bool {
        self.headers
            .get("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }
}

/// Reads one request from `reader`.
///
/// The reader must be positioned at the start of a request. On success it is
/// left positioned at the first byte after the body, ready for the next request
/// on a persistent connection.
///
/// # Errors
///
/// - [`RequestError::ConnectionClosed`] if the stream ends before a full request.
/// - [`RequestError::MalformedRequestLine`] if the first line is not three tokens.
/// - [`RequestError::InvalidContentLength`] / [`RequestError::BodyTooLarge`] for a
///   bad `Content-Length`. No body bytes are consumed in either case.
/// - [`RequestError::Io`] for any other read failure.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(256);

    read_line(reader, &mut line).await?;
    let (method, path, version) = parse_request_line(&line)?;

    let mut headers = Headers::new();
    let mut header_lines = 0;
    loop {
        read_line(reader, &mut line).await?;

        let text = str::from_utf8(&line).ok().map(str::trim);
        if text == Some("") {
            break;
        }

        header_lines += 1;
        if header_lines > MAX_HEADERS {
            return Err(RequestError::TooManyHeaders { max: MAX_HEADERS });
        }

        // Non-UTF-8 header lines are skipped, the same way colon-less ones are.
        let Some(text) = text else {
            continue;
        };
        if let Some((key, value)) = text.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                headers.insert(key, value.trim());
            }
        }
    }

    let body = match headers.get("content-length") {
        Some(raw) => {
            let length = parse_content_length(raw)?;
            read_body(reader, length).await?
        }
        None => Bytes::new(),
    };

    Ok(Request {
        method,
        path,
        version,
        headers,
        body,
    })
}

/// Reads a single `\n`-terminated line into `buf`, replacing its contents.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<(), RequestError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_LINE_LENGTH as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;

    if buf.last() == Some(&b'\n') {
        return Ok(());
    }
    if n > MAX_LINE_LENGTH {
        return Err(RequestError::LineTooLong {
            max_bytes: MAX_LINE_LENGTH,
        });
    }
    // EOF, either before any byte or in the middle of a line.
    Err(RequestError::ConnectionClosed)
}

fn parse_request_line(line: &[u8]) -> Result<(Method, String, String), RequestError> {
    let malformed = || RequestError::MalformedRequestLine {
        line: String::from_utf8_lossy(line).trim().to_owned(),
    };

    let text = str::from_utf8(line).map_err(|_| malformed())?;
    let mut parts = text.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version), None) => {
            let method = match method.parse::<Method>() {
                Ok(m) => m,
                Err(never) => match never {},
            };
            Ok((method, path.to_owned(), version.to_owned()))
        }
        _ => Err(malformed()),
    }
}

fn parse_content_length(raw: &str) -> Result<usize, RequestError> {
    let invalid = || RequestError::InvalidContentLength {
        value: raw.to_owned(),
    };

    let length: i64 = raw.parse().map_err(|_| invalid())?;
    let length = u64::try_from(length).map_err(|_| invalid())?;
    if length > MAX_BODY_SIZE as u64 {
        return Err(RequestError::BodyTooLarge {
            length,
            max_bytes: MAX_BODY_SIZE,
        });
    }
    // Bounded by MAX_BODY_SIZE above, so this cannot truncate.
    Ok(length as usize)
}

async fn read_body<R>(reader: &mut R, length: usize) -> Result<Bytes, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    if length == 0 {
        return Ok(Bytes::new());
    }

    let mut body = vec![0; length];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(Bytes::from(body)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(RequestError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncWriteExt, BufReader};

    use super::*;

    async fn parse(raw: &[u8]) -> Result<Request, RequestError> {
        let mut reader = raw;
        read_request(&mut reader).await
    }

    #[tokio::test]
    async fn parse_simple_get() {
        let req = parse(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), "HTTP/1.1");
        assert_eq!(req.header("host"), Some("localhost"));
        assert!(req.body().is_empty());
    }

    #[tokio::test]
    async fn request_line_tokens_are_kept_verbatim() {
        let req = parse(b"BREW /pot?x=1 HTCPCP/1.0\r\n\r\n").await.unwrap();
        assert_eq!(req.method().as_str(), "BREW");
        assert_eq!(req.path(), "/pot?x=1");
        assert_eq!(req.version(), "HTCPCP/1.0");
    }

    #[tokio::test]
    async fn trailing_whitespace_before_crlf_is_tolerated() {
        let req = parse(b"GET /a HTTP/1.1  \r\nHost: x \t\r\n\r\n").await.unwrap();
        assert_eq!(req.path(), "/a");
        assert_eq!(req.header("host"), Some("x"));
    }

    #[tokio::test]
    async fn two_token_request_line_is_malformed() {
        let err = parse(b"GET /\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, RequestError::MalformedRequestLine { .. }));
    }

    #[tokio::test]
    async fn four_token_request_line_is_malformed() {
        let err = parse(b"GET / HTTP/1.1 extra\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, RequestError::MalformedRequestLine { .. }));
    }

    #[tokio::test]
    async fn empty_stream_is_connection_closed() {
        let err = parse(b"").await.unwrap_err();
        assert!(matches!(err, RequestError::ConnectionClosed));
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn eof_inside_headers_is_connection_closed() {
        let err = parse(b"GET / HTTP/1.1\r\nHost: loc").await.unwrap_err();
        assert!(matches!(err, RequestError::ConnectionClosed));
    }

    #[tokio::test]
    async fn header_keys_normalized_and_last_duplicate_wins() {
        let raw = b"GET / HTTP/1.1\r\nX-Trace: one\r\nx-TRACE: two\r\nUser-Agent: curl\r\n\r\n";
        let req = parse(raw).await.unwrap();
        assert_eq!(req.header("x-trace"), Some("two"));
        assert_eq!(req.headers().len(), 2);
        assert!(req.headers().iter().all(|(k, _)| k == k.to_ascii_lowercase()));
    }

    #[tokio::test]
    async fn only_first_colon_separates() {
        let req = parse(b"GET / HTTP/1.1\r\nHost: localhost:4221\r\n\r\n").await.unwrap();
        assert_eq!(req.header("host"), Some("localhost:4221"));
    }

    #[tokio::test]
    async fn lines_without_colon_are_skipped() {
        let raw = b"GET / HTTP/1.1\r\nthis is not a header\r\nAccept: */*\r\n\r\n";
        let req = parse(raw).await.unwrap();
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("accept"), Some("*/*"));
    }

    #[tokio::test]
    async fn non_utf8_header_lines_are_skipped() {
        let raw = b"GET / HTTP/1.1\r\nX-Bad: \xff\xfe\r\nUser-Agent: curl/8.0\r\n\r\n";
        let req = parse(raw).await.unwrap();
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("x-bad"), None);
        assert_eq!(req.header("user-agent"), Some("curl/8.0"));
    }

    #[tokio::test]
    async fn non_utf8_header_lines_count_toward_the_cap() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for _ in 0..=MAX_HEADERS {
            raw.extend_from_slice(b"\xff\r\n");
        }
        raw.extend_from_slice(b"\r\n");
        let err = parse(&raw).await.unwrap_err();
        assert!(matches!(err, RequestError::TooManyHeaders { .. }));
    }

    #[tokio::test]
    async fn too_many_headers() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..=MAX_HEADERS {
            raw.extend_from_slice(format!("X-H{i}: v\r\n").as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        let err = parse(&raw).await.unwrap_err();
        assert!(matches!(err, RequestError::TooManyHeaders { .. }));
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_LINE_LENGTH + 10));
        raw.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        let err = parse(&raw).await.unwrap_err();
        assert!(matches!(err, RequestError::LineTooLong { .. }));
    }

    #[tokio::test]
    async fn content_length_body() {
        let raw = b"POST /files/a HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let req = parse(raw).await.unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&req.body()[..], b"hello");
    }

    #[tokio::test]
    async fn zero_content_length_reads_nothing() {
        let mut reader: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\nGET";
        let req = read_request(&mut reader).await.unwrap();
        assert!(req.body().is_empty());
        assert_eq!(reader, b"GET");
    }

    #[tokio::test]
    async fn body_is_not_read_without_content_length() {
        let mut reader: &[u8] = b"POST / HTTP/1.1\r\n\r\nleftover";
        let req = read_request(&mut reader).await.unwrap();
        assert!(req.body().is_empty());
        assert_eq!(reader, b"leftover");
    }

    #[tokio::test]
    async fn negative_content_length_is_invalid() {
        let mut reader: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\nbody";
        let err = read_request(&mut reader).await.unwrap_err();
        assert!(matches!(err, RequestError::InvalidContentLength { .. }));
        assert_eq!(reader, b"body");
    }

    #[tokio::test]
    async fn non_numeric_content_length_is_invalid() {
        let err = parse(b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, RequestError::InvalidContentLength { .. }));
    }

    #[tokio::test]
    async fn oversized_content_length_reads_no_body() {
        let raw = format!(
            "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\nbody",
            MAX_BODY_SIZE + 1
        );
        let mut reader = raw.as_bytes();
        let err = read_request(&mut reader).await.unwrap_err();
        assert!(matches!(err, RequestError::BodyTooLarge { .. }));
        assert_eq!(reader, b"body");
    }

    #[tokio::test]
    async fn body_at_cap_is_accepted() {
        let mut raw = format!("POST / HTTP/1.1\r\nContent-Length: {MAX_BODY_SIZE}\r\n\r\n").into_bytes();
        raw.resize(raw.len() + MAX_BODY_SIZE, b'z');
        let req = parse(&raw).await.unwrap();
        assert_eq!(req.body().len(), MAX_BODY_SIZE);
    }

    #[tokio::test]
    async fn short_body_is_connection_closed() {
        let err = parse(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await.unwrap_err();
        assert!(matches!(err, RequestError::ConnectionClosed));
    }

    #[tokio::test]
    async fn fragmented_body_is_reassembled() {
        let (client, server) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            let mut client = client;
            let chunks: [&[u8]; 4] = [
                b"POST /upload HTTP/1.1\r\nCont",
                b"ent-Length: 20\r\n\r\n1234567",
                b"890",
                b"1234567890",
            ];
            for chunk in chunks {
                client.write_all(chunk).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            client
        });

        let mut reader = BufReader::new(server);
        let req = read_request(&mut reader).await.unwrap();
        assert_eq!(&req.body()[..], b"12345678901234567890");
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn sequential_requests_share_a_reader() {
        let mut reader: &[u8] =
            b"GET /a HTTP/1.1\r\n\r\nPOST /b HTTP/1.1\r\nContent-Length: 2\r\n\r\nhiGET /c HTTP/1.1\r\n\r\n";
        let paths = [
            read_request(&mut reader).await.unwrap(),
            read_request(&mut reader).await.unwrap(),
            read_request(&mut reader).await.unwrap(),
        ]
        .map(|r| r.path().to_owned());
        assert_eq!(paths, ["/a", "/b", "/c"]);
    }

    #[test]
    fn wants_close_is_case_insensitive() {
        assert!(Request::new(Method::Get, "/").with_header("Connection", "Close").wants_close());
        assert!(!Request::new(Method::Get, "/").with_header("Connection", "keep-alive").wants_close());
        assert!(!Request::new(Method::Get, "/").wants_close());
    }
}
