//! Response metadata supplied by the host.
//!
//! The gateway only needs three facts about an intercepted response: where
//! the body starts, the MIME type the server stated, and the MIME type
//! inferred from the content. Hosts with their own HTTP model implement
//! [`ResponseMetadata`]; [`ResponseInfo`] covers raw responses and bare files.

use serde::Serialize;

/// What the gateway needs to know about a response.
pub trait ResponseMetadata: Send + Sync {
    /// Offset of the first body byte in the raw response.
    fn body_offset(&self) -> usize;

    /// MIME type declared by the server, if any.
    fn stated_mime_type(&self) -> Option<&str>;

    /// MIME type inferred from the body, if any.
    fn inferred_mime_type(&self) -> Option<&str>;
}

/// Owned response metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseInfo {
    /// Offset of the first body byte.
    pub body_offset: usize,
    /// Declared MIME type.
    pub stated_mime_type: Option<String>,
    /// Inferred MIME type.
    pub inferred_mime_type: Option<String>,
}

impl ResponseInfo {
    /// Metadata for content that is all body (no headers).
    pub fn body() -> Self {
        Self::default()
    }

    /// Set the declared MIME type.
    pub fn with_stated(mut self, mime: impl Into<String>) -> Self {
        self.stated_mime_type = Some(mime.into());
        self
    }

    /// Set the inferred MIME type.
    pub fn with_inferred(mut self, mime: impl Into<String>) -> Self {
        self.inferred_mime_type = Some(mime.into());
        self
    }

    /// Analyze a raw HTTP response.
    ///
    /// Headers end at the first blank line (`\r\n\r\n`, or `\n\n` for sloppy
    /// servers). Without a blank line the whole response is treated as
    /// headers and the body is empty. The stated type comes from
    /// `Content-Type` without parameters; the inferred type is sniffed from
    /// the first body bytes.
    pub fn from_http(raw: &[u8]) -> Self {
        let body_offset = header_end(raw).unwrap_or(raw.len());
        let headers = String::from_utf8_lossy(&raw[..body_offset]);

        let stated_mime_type = headers
            .lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
            .and_then(|(_, value)| normalize_mime(value));

        Self {
            body_offset,
            stated_mime_type,
            inferred_mime_type: sniff_mime_type(&raw[body_offset..]).map(str::to_string),
        }
    }
}

impl ResponseMetadata for ResponseInfo {
    fn body_offset(&self) -> usize {
        self.body_offset
    }

    fn stated_mime_type(&self) -> Option<&str> {
        self.stated_mime_type.as_deref()
    }

    fn inferred_mime_type(&self) -> Option<&str> {
        self.inferred_mime_type.as_deref()
    }
}

fn header_end(raw: &[u8]) -> Option<usize> {
    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(pos + 4);
    }
    raw.windows(2).position(|w| w == b"\n\n").map(|pos| pos + 2)
}

/// Strip parameters and case from a `Content-Type` value.
fn normalize_mime(value: &str) -> Option<String> {
    let essence = value.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}

/// Signatures checked against the start of a body.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"\x89PNG\r\n\x1A\n", "image/png"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
    (b"PK\x03\x04", "application/zip"),
    (b"BM", "image/bmp"),
];

/// Guess a MIME type from the first bytes of `body`.
pub fn sniff_mime_type(body: &[u8]) -> Option<&'static str> {
    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| body.starts_with(magic)) {
        return Some(*mime);
    }
    if body.len() >= 12 && &body[..4] == b"RIFF" && &body[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    let head = String::from_utf8_lossy(&body[..body.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        Some("text/html")
    } else if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        Some("image/svg+xml")
    } else if head.starts_with("<?xml") {
        Some("application/xml")
    } else if head.starts_with('{') || head.starts_with('[') {
        Some("application/json")
    } else {
        None
    }
}
