//! Serialized JSON payloads and per-request response encoding.
//!
//! A [`CachePayload`] is serialized once when it is created. Compressed
//! variants are produced on first demand and kept for the payload's lifetime,
//! which is the lifetime of the cache entry holding it.

use std::io::Write;
use std::sync::OnceLock;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use serde::Serialize;
use tracing::warn;

use super::config::CacheConfig;
use super::domain::CacheStatus;
use super::error::FetchError;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_LGWIN: u32 = 22;

/// Wire encoding of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Brotli,
    Gzip,
    Identity,
}

impl Encoding {
    /// Value for the `Content-Encoding` header, if any.
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Self::Brotli => Some("br"),
            Self::Gzip => Some("gzip"),
            Self::Identity => None,
        }
    }
}

/// Pick the preferred supported encoding from an `Accept-Encoding` value.
///
/// Brotli wins over gzip whenever both are acceptable; anything else means
/// identity. Codings listed with `q=0` are refused, and `*` accepts any coding
/// not listed explicitly.
pub fn negotiate(accept_encoding: Option<&str>) -> Encoding {
    let Some(value) = accept_encoding else {
        return Encoding::Identity;
    };

    let mut brotli = None;
    let mut gzip = None;
    let mut wildcard = None;

    for part in value.split(',') {
        let mut pieces = part.split(';');
        let coding = pieces.next().unwrap_or_default().trim().to_ascii_lowercase();
        let accepted = pieces
            .filter_map(|param| {
                let (name, weight) = param.split_once('=')?;
                name.trim()
                    .eq_ignore_ascii_case("q")
                    .then(|| weight.trim().parse::<f32>().unwrap_or(0.0))
            })
            .last()
            .is_none_or(|weight| weight > 0.0);

        match coding.as_str() {
            "br" => brotli = Some(accepted),
            "gzip" | "x-gzip" => gzip = Some(accepted),
            "*" => wildcard = Some(accepted),
            _ => {}
        }
    }

    let wildcard = wildcard.unwrap_or(false);
    if brotli.unwrap_or(wildcard) {
        Encoding::Brotli
    } else if gzip.unwrap_or(wildcard) {
        Encoding::Gzip
    } else {
        Encoding::Identity
    }
}

/// A JSON document serialized once, with lazily memoized compressed forms.
#[derive(Debug)]
pub struct CachePayload {
    text: Bytes,
    brotli: OnceLock<Option<Bytes>>,
    gzip: OnceLock<Option<Bytes>>,
}

impl CachePayload {
    /// Serialize `value` to JSON text.
    pub fn from_value<V: Serialize + ?Sized>(value: &V) -> Result<Self, FetchError> {
        serde_json::to_vec(value)
            .map(|text| Self::from_json_bytes(Bytes::from(text)))
            .map_err(|err| FetchError::serialize(err.to_string()))
    }

    /// Wrap text that is already valid JSON.
    pub fn from_json_bytes(text: Bytes) -> Self {
        Self {
            text,
            brotli: OnceLock::new(),
            gzip: OnceLock::new(),
        }
    }

    /// The `[]` document.
    pub fn empty_array() -> Self {
        Self::from_json_bytes(Bytes::from_static(b"[]"))
    }

    pub fn text(&self) -> &Bytes {
        &self.text
    }

    pub fn byte_size(&self) -> usize {
        self.text.len()
    }

    /// Body bytes for `encoding`, compressing on first use. Returns `None`
    /// when compression failed, in which case callers send identity.
    pub fn encoded(&self, encoding: Encoding) -> Option<Bytes> {
        match encoding {
            Encoding::Identity => Some(self.text.clone()),
            Encoding::Brotli => self
                .brotli
                .get_or_init(|| compress("br", &self.text, compress_brotli))
                .clone(),
            Encoding::Gzip => self
                .gzip
                .get_or_init(|| compress("gzip", &self.text, compress_gzip))
                .clone(),
        }
    }

    /// Whether a compressed variant for `encoding` has been computed.
    pub fn is_memoized(&self, encoding: Encoding) -> bool {
        match encoding {
            Encoding::Identity => true,
            Encoding::Brotli => self.brotli.get().is_some(),
            Encoding::Gzip => self.gzip.get().is_some(),
        }
    }
}

fn compress(
    label: &'static str,
    data: &[u8],
    run: fn(&[u8]) -> std::io::Result<Vec<u8>>,
) -> Option<Bytes> {
    match run(data) {
        Ok(bytes) => Some(Bytes::from(bytes)),
        Err(err) => {
            warn!(encoding = label, error = %err, "payload compression failed; sending identity");
            None
        }
    }
}

fn compress_brotli(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut writer = brotli::CompressorWriter::new(
        Vec::with_capacity(data.len() / 4),
        BROTLI_BUFFER_SIZE,
        BROTLI_QUALITY,
        BROTLI_LGWIN,
    );
    writer.write_all(data)?;
    Ok(writer.into_inner())
}

fn compress_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Turns payloads into HTTP responses, negotiating the body encoding.
#[derive(Debug, Clone, Copy)]
pub struct ResponseCodec {
    compression_threshold: usize,
}

impl ResponseCodec {
    pub fn new(compression_threshold_bytes: usize) -> Self {
        Self {
            compression_threshold: compression_threshold_bytes,
        }
    }

    /// Encoding to use for `payload` given the request headers. Payloads
    /// below the compression threshold are always sent as identity.
    pub fn choose(&self, request_headers: &HeaderMap, payload: &CachePayload) -> Encoding {
        if payload.byte_size() < self.compression_threshold {
            return Encoding::Identity;
        }
        let accept = request_headers
            .get(header::ACCEPT_ENCODING)
            .and_then(|value| value.to_str().ok());
        negotiate(accept)
    }

    /// Build a `200 OK` JSON response for `payload`.
    pub fn respond(
        &self,
        request_headers: &HeaderMap,
        payload: &CachePayload,
        status: Option<CacheStatus>,
    ) -> Response {
        let mut encoding = self.choose(request_headers, payload);
        let body = match payload.encoded(encoding) {
            Some(body) => body,
            None => {
                encoding = Encoding::Identity;
                payload.text().clone()
            }
        };

        let mut response = (StatusCode::OK, Body::from(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_CONTENT_TYPE),
        );
        append_vary(headers, "Accept-Encoding");
        if let Some(coding) = encoding.content_encoding() {
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(coding));
        }
        if let Some(status) = status {
            headers.insert(X_CACHE, HeaderValue::from_static(status.as_str()));
        }
        response
    }
}

impl From<&CacheConfig> for ResponseCodec {
    fn from(config: &CacheConfig) -> Self {
        Self::new(config.compression_threshold_bytes)
    }
}

/// Add `value` to the `Vary` header, keeping whatever is already there.
pub fn append_vary(headers: &mut HeaderMap, value: &str) {
    let existing: Vec<String> = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect();

    if existing
        .iter()
        .any(|entry| entry == "*" || entry.eq_ignore_ascii_case(value))
    {
        return;
    }

    let combined = if existing.is_empty() {
        value.to_string()
    } else {
        format!("{}, {value}", existing.join(", "))
    };
    if let Ok(header_value) = HeaderValue::from_str(&combined) {
        headers.insert(header::VARY, header_value);
    }
}
