//! Response compression driven by the client's `Accept-Encoding` list.
//!
//! Negotiation walks the client's tokens in the order they were sent and applies
//! the first supported encoding whose transform succeeds. A failing transform is
//! not an error: the next candidate is tried, and if none is left the response
//! goes out as the handler produced it.
//!
//! Adding a scheme means adding an [`Encoding`] variant, its token in
//! [`Encoding::from_token`], and its transform in [`Encoding::encode`].

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::http::{Request, Response};

/// A content coding the server can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
}

impl Encoding {
    /// Every encoding the server is able to apply.
    pub const SUPPORTED: &'static [Encoding] = &[Encoding::Gzip];

    /// Matches a bare coding token (no parameters), ASCII case-insensitively.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|e| e.as_str().eq_ignore_ascii_case(token))
    }

    /// The token written in `Content-Encoding`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
        }
    }

    /// Compresses `input` with this encoding.
    pub fn encode(self, input: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let buf = Vec::with_capacity(input.len() / 2 + 32);
                let mut encoder = GzEncoder::new(buf, Compression::default());
                encoder.write_all(input)?;
                encoder.finish()
            }
        }
    }
}

/// Splits an `Accept-Encoding` value into coding tokens, in client order.
///
/// Parameters are stripped (`gzip;q=0.8` yields `gzip`). Entries whose `q` is
/// zero are explicit refusals and are left out.
pub fn accepted_tokens(header: &str) -> impl Iterator<Item = &str> {
    header.split(',').filter_map(|item| {
        let mut parts = item.split(';');
        let token = parts.next()?.trim();
        if token.is_empty() {
            return None;
        }
        let refused = parts.any(|param| {
            param.trim().split_once('=').is_some_and(|(k, v)| {
                k.trim().eq_ignore_ascii_case("q") && is_zero_qvalue(v.trim())
            })
        });
        (!refused).then_some(token)
    })
}

fn is_zero_qvalue(value: &str) -> bool {
    value.parse::<f32>().is_ok_and(|q| q == 0.0)
}

/// Compresses `response` in place if `request` accepts a supported encoding.
///
/// Returns the encoding applied, or `None` when the response was left untouched
/// (no `Accept-Encoding`, nothing supported, every transform failed, or the
/// handler already chose a `Content-Encoding`). An empty body is compressed
/// like any other.
///
/// On success the body is replaced, `Content-Encoding` is set, and
/// `Content-Length` is set to the compressed length.
pub fn negotiate(request: &Request, response: &mut Response) -> Option<Encoding> {
    let accept = request.header("accept-encoding")?;
    if response.headers().contains("content-encoding") {
        return None;
    }

    for token in accepted_tokens(accept) {
        let Some(encoding) = Encoding::from_token(token) else {
            continue;
        };
        match encoding.encode(response.payload()) {
            Ok(compressed) => {
                response.set_header("Content-Length", compressed.len().to_string());
                response.set_header("Content-Encoding", encoding.as_str());
                response.set_body(compressed);
                return Some(encoding);
            }
            Err(e) => {
                debug!(
                    encoding = encoding.as_str(),
                    error = %e,
                    "compression failed, trying next encoding"
                );
            }
        }
    }

    None
}
