//! Font selection for worksheet text.
//!
//! A TrueType file (a handwriting font such as `propisi.ttf`) is embedded when
//! configured; otherwise the built-in `Helvetica-Oblique` is used with
//! WinAnsi encoding.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use ttf_parser::Face;

pub const BUILTIN_FONT: &str = "Helvetica-Oblique";

#[derive(Debug, Error)]
pub enum FontError {
    #[error("failed to read font file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid font file {path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// Parsed-once metadata plus the raw bytes of an embeddable TrueType font.
#[derive(Debug)]
pub struct TrueTypeFont {
    data: Vec<u8>,
    family: String,
}

impl TrueTypeFont {
    pub fn from_bytes(data: Vec<u8>, origin: &str) -> Result<Self, FontError> {
        let family = {
            let face = Face::parse(&data, 0).map_err(|e| FontError::Invalid {
                path: origin.to_string(),
                reason: e.to_string(),
            })?;
            face.names()
                .into_iter()
                .find(|name| name.name_id == ttf_parser::name_id::FAMILY)
                .and_then(|name| name.to_string())
                .unwrap_or_else(|| "PropisiFont".to_string())
        };
        Ok(Self { data, family })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// PostScript-safe base font name.
    pub fn base_font_name(&self) -> String {
        let name: String = self
            .family
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .take(63)
            .collect();
        if name.is_empty() {
            "PropisiFont".to_string()
        } else {
            name
        }
    }

    pub fn face(&self) -> Result<Face<'_>, FontError> {
        Face::parse(&self.data, 0).map_err(|e| FontError::Invalid {
            path: self.family.clone(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub enum FontSource {
    #[default]
    Builtin,
    TrueType(Arc<TrueTypeFont>),
}

impl FontSource {
    /// Loads and validates a TrueType font from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FontError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let data = std::fs::read(path).map_err(|source| FontError::Io {
            path: display.clone(),
            source,
        })?;
        Ok(FontSource::TrueType(Arc::new(TrueTypeFont::from_bytes(
            data, &display,
        )?)))
    }

    pub fn describe(&self) -> &str {
        match self {
            FontSource::Builtin => BUILTIN_FONT,
            FontSource::TrueType(font) => font.family(),
        }
    }
}

/// Encodes text for a WinAnsi-encoded base-14 font. Unmappable characters become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}
