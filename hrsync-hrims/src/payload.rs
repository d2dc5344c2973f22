//! Base64 / data-URI payload decoding shared by every extraction strategy.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;

/// Decoded artifact content. `mime_type` is `None` when the payload itself
/// did not declare one; callers apply the artifact default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl Decoded {
    pub fn with_default_mime(self, default: &str) -> (Vec<u8>, String) {
        let mime = self.mime_type.unwrap_or_else(|| default.to_string());
        (self.bytes, mime)
    }
}

/// Split a `data:<mime>;base64,<payload>` URI into its mime type and payload.
///
/// Returns `None` when `text` is not a base64 data URI.
pub fn split_data_uri(text: &str) -> Option<(Option<String>, &str)> {
    let rest = text.trim_start().strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mut parts = header.split(';');
    let mime = parts
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_ascii_lowercase);
    if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return None;
    }
    Some((mime, payload))
}

/// Decode a base64 string, stripping a data-URI prefix first if present.
///
/// Whitespace inside the payload is ignored; padded and unpadded forms are
/// both accepted. Empty payloads decode to `None`.
pub fn decode(text: &str) -> Option<Decoded> {
    let (mime_type, payload) = match split_data_uri(text) {
        Some((mime, payload)) => (mime, payload),
        None => (None, text),
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    let bytes = STANDARD
        .decode(cleaned.as_bytes())
        .or_else(|_| STANDARD_NO_PAD.decode(cleaned.as_bytes()))
        .ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(Decoded { bytes, mime_type })
}

/// Normalise a `Content-Type` header value to its bare mime type.
pub fn bare_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}
