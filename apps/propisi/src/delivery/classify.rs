//! Response classifier: decides whether a 2xx body is really an artifact.
//!
//! Servers sometimes answer 200 with a short JSON or HTML error page. A body
//! is accepted only when its size and media type both look like a document
//! or an image; everything else is `Rejected` and treated as a failed
//! attempt, with whatever error text the body carried kept for diagnostics.

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

/// Longest diagnostic excerpt taken from a non-JSON body.
pub const DIAGNOSTIC_CHARS: usize = 200;

const PDF_MAGIC: &[u8] = b"%PDF-";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Pdf,
    /// Full `image/...` essence, lowercased.
    Image(String),
}

impl MediaType {
    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Image(essence) => essence,
        }
    }

    /// File extension used when saving, without the dot.
    pub fn extension(&self) -> &str {
        match self {
            MediaType::Pdf => "pdf",
            MediaType::Image(essence) => match essence.as_str() {
                "image/jpeg" | "image/jpg" => "jpg",
                "image/png" => "png",
                "image/gif" => "gif",
                "image/webp" => "webp",
                "image/bmp" => "bmp",
                "image/tiff" => "tiff",
                "image/svg+xml" => "svg",
                _ => "bin",
            },
        }
    }
}

/// Why a transport-level success was not accepted as an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload of {size} bytes is below the {min} byte minimum")]
    TooSmall {
        size: usize,
        min: usize,
        diagnostic: Option<String>,
    },

    #[error("content type '{content_type}' is not a document or image")]
    UnacceptedType {
        content_type: String,
        diagnostic: Option<String>,
    },

    #[error("declared application/pdf but body is not a PDF")]
    NotAPdf { diagnostic: Option<String> },

    #[error("payload has no content type and no recognizable signature")]
    Unrecognized { diagnostic: Option<String> },
}

impl PayloadError {
    /// Error text sniffed from the body, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            PayloadError::TooSmall { diagnostic, .. }
            | PayloadError::UnacceptedType { diagnostic, .. }
            | PayloadError::NotAPdf { diagnostic }
            | PayloadError::Unrecognized { diagnostic } => diagnostic.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Accepted { bytes: Bytes, media_type: MediaType },
    Rejected(PayloadError),
}

/// Classifies a successful transport response.
pub fn classify(content_type: Option<&str>, body: Bytes, min_bytes: usize) -> Classification {
    if body.len() < min_bytes {
        return Classification::Rejected(PayloadError::TooSmall {
            size: body.len(),
            min: min_bytes,
            diagnostic: diagnostic_text(&body),
        });
    }

    let essence = content_type
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

    let media_type = match essence {
        Some(ct) if ct == "application/pdf" => {
            if !body.starts_with(PDF_MAGIC) {
                return Classification::Rejected(PayloadError::NotAPdf {
                    diagnostic: diagnostic_text(&body),
                });
            }
            MediaType::Pdf
        }
        Some(ct) if ct.strip_prefix("image/").is_some_and(is_token) => MediaType::Image(ct),
        Some(ct) => {
            return Classification::Rejected(PayloadError::UnacceptedType {
                content_type: ct,
                diagnostic: diagnostic_text(&body),
            })
        }
        None => match sniff(&body) {
            Some(media_type) => media_type,
            None => {
                return Classification::Rejected(PayloadError::Unrecognized {
                    diagnostic: diagnostic_text(&body),
                })
            }
        },
    };

    Classification::Accepted {
        bytes: body,
        media_type,
    }
}

/// A single media-type subtype token, e.g. `png` or `svg+xml`.
fn is_token(subtype: &str) -> bool {
    !subtype.is_empty()
        && subtype
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$&^_.+-".contains(&b))
}

/// Media type from the leading magic bytes.
pub fn sniff(body: &[u8]) -> Option<MediaType> {
    if body.starts_with(PDF_MAGIC) {
        Some(MediaType::Pdf)
    } else if body.starts_with(PNG_MAGIC) {
        Some(MediaType::Image("image/png".to_string()))
    } else if body.starts_with(JPEG_MAGIC) {
        Some(MediaType::Image("image/jpeg".to_string()))
    } else {
        None
    }
}

/// Human-readable error text embedded in a body.
///
/// JSON bodies are searched for `detail`, `error`, `error.message` and
/// `message`; anything else yields its first 200 characters.
pub fn diagnostic_text(body: &[u8]) -> Option<String> {
    if body.starts_with(PDF_MAGIC) || body.starts_with(PNG_MAGIC) || body.starts_with(JPEG_MAGIC)
    {
        return None;
    }

    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        if let Some(text) = json_message(&json) {
            return Some(text);
        }
    }

    let text = String::from_utf8_lossy(body);
    let excerpt: String = text.trim().chars().take(DIAGNOSTIC_CHARS).collect();
    (!excerpt.is_empty()).then_some(excerpt)
}

fn json_message(json: &Value) -> Option<String> {
    let as_text = |value: &Value| match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    };

    if let Some(detail) = json.get("detail").and_then(as_text) {
        return Some(detail);
    }
    match json.get("error") {
        Some(Value::Object(inner)) => {
            if let Some(message) = inner.get("message").and_then(as_text) {
                return Some(message);
            }
        }
        Some(other) => {
            if let Some(text) = as_text(other) {
                return Some(text);
            }
        }
        None => {}
    }
    json.get("message").and_then(as_text)
}
