//! Worksheet options: the validated record the form hands to the core.
//!
//! Every enum field is parsed from its wire name. Unknown values are a
//! `ValidationError`, never a silent default.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_TASK_CHARS: usize = 80;
pub const MAX_STUDENT_NAME_CHARS: usize = 25;
/// Number of input lines the preview endpoint renders.
pub const PREVIEW_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be at most {max} characters (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("{field} has unsupported value '{value}'")]
    UnknownValue { field: &'static str, value: String },
}

impl ValidationError {
    /// The wire field the error refers to, for field-level messages.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Missing { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::UnknownValue { field, .. } => *field,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Option enums
// ────────────────────────────────────────────────────────────────────────────

/// How raw input text maps onto practice rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    All,
    FirstLetter,
    OneLine,
}

/// Background ruling of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    #[serde(rename = "lines")]
    Lines,
    #[serde(rename = "lines_oblique")]
    ObliqueLines,
    #[serde(rename = "cells")]
    Cells,
}

/// Rendering treatment of ruling lines and glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrokeStyle {
    #[serde(rename = "black")]
    Black,
    #[serde(rename = "gray")]
    Gray,
    #[serde(rename = "punktir")]
    Dotted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Wire-name mapping shared by the option enums.
pub trait WireValue: Sized + Copy + 'static {
    const FIELD: &'static str;
    const VARIANTS: &'static [(&'static str, Self)];

    fn wire_name(self) -> &'static str
    where
        Self: PartialEq,
    {
        Self::VARIANTS
            .iter()
            .find(|(_, v)| *v == self)
            .map(|(name, _)| *name)
            .unwrap_or("")
    }

    fn parse_wire(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        Self::VARIANTS
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, v)| *v)
            .ok_or_else(|| ValidationError::UnknownValue {
                field: Self::FIELD,
                value: value.to_string(),
            })
    }
}

impl WireValue for FillMode {
    const FIELD: &'static str = "fill_type";
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("all", FillMode::All),
        ("first_letter", FillMode::FirstLetter),
        ("one_line", FillMode::OneLine),
    ];
}

impl WireValue for Layout {
    const FIELD: &'static str = "page_layout";
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("lines", Layout::Lines),
        ("lines_oblique", Layout::ObliqueLines),
        ("cells", Layout::Cells),
    ];
}

impl WireValue for StrokeStyle {
    const FIELD: &'static str = "font_type";
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("black", StrokeStyle::Black),
        ("gray", StrokeStyle::Gray),
        ("punktir", StrokeStyle::Dotted),
    ];
}

impl WireValue for Orientation {
    const FIELD: &'static str = "page_orientation";
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("portrait", Orientation::Portrait),
        ("landscape", Orientation::Landscape),
    ];
}

macro_rules! wire_from_str {
    ($($ty:ty),*) => {$(
        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty as WireValue>::parse_wire(s)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.wire_name())
            }
        }
    )*};
}

wire_from_str!(FillMode, Layout, StrokeStyle, Orientation);

// ────────────────────────────────────────────────────────────────────────────
// WorksheetOptions
// ────────────────────────────────────────────────────────────────────────────

/// Immutable description of one worksheet.
///
/// Build it through [`WorksheetOptions::new`] or [`WorksheetOptions::from_fields`];
/// both validate before returning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetOptions {
    pub task: String,
    pub student_name: Option<String>,
    /// Raw multi-line input. Blank lines are kept as empty rows.
    pub text: String,
    #[serde(rename = "fill_type")]
    pub fill_mode: FillMode,
    #[serde(rename = "page_layout")]
    pub layout: Layout,
    #[serde(rename = "font_type")]
    pub stroke_style: StrokeStyle,
    #[serde(rename = "page_orientation")]
    pub orientation: Orientation,
}

impl WorksheetOptions {
    pub fn new(
        task: impl Into<String>,
        text: impl Into<String>,
        fill_mode: FillMode,
        layout: Layout,
        stroke_style: StrokeStyle,
        orientation: Orientation,
    ) -> Result<Self, ValidationError> {
        let options = Self {
            task: task.into(),
            student_name: None,
            text: text.into(),
            fill_mode,
            layout,
            stroke_style,
            orientation,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_student_name(mut self, name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        self.student_name = if name.trim().is_empty() {
            None
        } else {
            Some(name)
        };
        self.validate()?;
        Ok(self)
    }

    /// Builds options from the flat multipart field set used on the wire.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let student_name = fields
            .get("student_name")
            .filter(|s| !s.trim().is_empty())
            .cloned();

        let options = Self {
            task: required(fields, "task")?.to_string(),
            student_name,
            text: fields.get("text").cloned().unwrap_or_default(),
            fill_mode: FillMode::parse_wire(required(fields, FillMode::FIELD)?)?,
            layout: Layout::parse_wire(required(fields, Layout::FIELD)?)?,
            stroke_style: StrokeStyle::parse_wire(required(fields, StrokeStyle::FIELD)?)?,
            orientation: Orientation::parse_wire(required(fields, Orientation::FIELD)?)?,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.task.trim().is_empty() {
            return Err(ValidationError::Missing { field: "task" });
        }
        check_length("task", &self.task, MAX_TASK_CHARS)?;
        if let Some(name) = &self.student_name {
            check_length("student_name", name, MAX_STUDENT_NAME_CHARS)?;
        }
        Ok(())
    }

    /// The seven multipart text fields, in wire order.
    pub fn to_form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("task", self.task.clone()),
            (FillMode::FIELD, self.fill_mode.to_string()),
            ("text", self.text.clone()),
            (Layout::FIELD, self.layout.to_string()),
            (StrokeStyle::FIELD, self.stroke_style.to_string()),
            (Orientation::FIELD, self.orientation.to_string()),
            (
                "student_name",
                self.student_name.clone().unwrap_or_default(),
            ),
        ]
    }

    /// Copy limited to the first few input lines, rendered by the preview endpoint.
    pub fn preview_excerpt(&self) -> Self {
        let text = self
            .text
            .lines()
            .take(PREVIEW_LINES)
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            text,
            ..self.clone()
        }
    }
}

fn required<'a>(
    fields: &'a HashMap<String, String>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    fields
        .get(field)
        .map(String::as_str)
        .ok_or(ValidationError::Missing { field })
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_fields() -> HashMap<String, String> {
        fields(&[
            ("task", "Прописи"),
            ("fill_type", "first_letter"),
            ("text", "abc\ndef"),
            ("page_layout", "lines_oblique"),
            ("font_type", "punktir"),
            ("page_orientation", "landscape"),
            ("student_name", ""),
        ])
    }

    #[test]
    fn test_from_fields_parses_every_wire_name() {
        let options = WorksheetOptions::from_fields(&valid_fields()).unwrap();
        assert_eq!(options.fill_mode, FillMode::FirstLetter);
        assert_eq!(options.layout, Layout::ObliqueLines);
        assert_eq!(options.stroke_style, StrokeStyle::Dotted);
        assert_eq!(options.orientation, Orientation::Landscape);
        assert_eq!(options.student_name, None, "blank name is treated as absent");
    }

    #[test]
    fn test_unknown_enum_value_is_rejected_not_defaulted() {
        let mut f = valid_fields();
        f.insert("page_layout".into(), "dots".into());
        let err = WorksheetOptions::from_fields(&f).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownValue {
                field: "page_layout",
                value: "dots".into()
            }
        );
        assert_eq!(err.field(), "page_layout");
    }

    #[test]
    fn test_missing_required_field() {
        let mut f = valid_fields();
        f.remove("fill_type");
        let err = WorksheetOptions::from_fields(&f).unwrap_err();
        assert_eq!(err, ValidationError::Missing { field: "fill_type" });
    }

    #[test]
    fn test_blank_task_is_rejected() {
        let mut f = valid_fields();
        f.insert("task".into(), "   ".into());
        assert!(matches!(
            WorksheetOptions::from_fields(&f),
            Err(ValidationError::Missing { field: "task" })
        ));
    }

    #[test]
    fn test_length_limits_count_characters_not_bytes() {
        // 80 Cyrillic characters are 160 bytes but still within the limit.
        let task = "ж".repeat(MAX_TASK_CHARS);
        let ok = WorksheetOptions::new(
            task,
            "",
            FillMode::All,
            Layout::Lines,
            StrokeStyle::Black,
            Orientation::Portrait,
        );
        assert!(ok.is_ok());

        let too_long = ok.unwrap().with_student_name("x".repeat(26));
        assert_eq!(
            too_long.unwrap_err(),
            ValidationError::TooLong {
                field: "student_name",
                max: 25,
                actual: 26
            }
        );
    }

    #[test]
    fn test_form_fields_round_trip_through_from_fields() {
        let options = WorksheetOptions::from_fields(&valid_fields())
            .unwrap()
            .with_student_name("Иванов Иван")
            .unwrap();
        let map: HashMap<String, String> = options
            .to_form_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(map.len(), 7);
        assert_eq!(map["font_type"], "punktir");
        assert_eq!(WorksheetOptions::from_fields(&map).unwrap(), options);
    }

    #[test]
    fn test_preview_excerpt_keeps_first_three_lines() {
        let mut options = WorksheetOptions::from_fields(&valid_fields()).unwrap();
        options.text = "a\n\nc\nd\ne".into();
        assert_eq!(options.preview_excerpt().text, "a\n\nc");
        assert_eq!(options.preview_excerpt().task, options.task);
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_value(Layout::ObliqueLines).unwrap();
        assert_eq!(json, "lines_oblique");
        let style: StrokeStyle = serde_json::from_value("punktir".into()).unwrap();
        assert_eq!(style, StrokeStyle::Dotted);
        assert_eq!("one_line".parse::<FillMode>().unwrap(), FillMode::OneLine);
    }
}
