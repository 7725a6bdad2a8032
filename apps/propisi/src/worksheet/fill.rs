//! Text-Fill Strategist: maps raw input lines onto ruling rows.
//!
//! # Fill modes
//! - `All`         → one row per input line, blank lines reserve an empty row
//! - `FirstLetter` → each non-blank line becomes its first letter repeated
//! - `OneLine`     → the first non-blank line repeated on every row
//!
//! More logical rows than the page holds is an `Overflow`, never a silent cut.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::worksheet::options::FillMode;

/// How many times `FirstLetter` repeats the letter on a row.
pub const FIRST_LETTER_REPEAT: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FillError {
    #[error("text needs {required} rows but the page holds {capacity}")]
    Overflow { required: usize, capacity: usize },
}

/// One row of practice text. An empty `content` reserves the row without drawing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub content: String,
    pub row_index: usize,
}

impl TextRun {
    pub fn is_blank(&self) -> bool {
        self.content.is_empty()
    }
}

/// Produces the ordered runs for `raw_text` under `mode`, at most `row_capacity` of them.
pub fn compute_runs(
    raw_text: &str,
    mode: FillMode,
    row_capacity: usize,
) -> Result<Vec<TextRun>, FillError> {
    let lines = logical_lines(raw_text);
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let contents: Vec<String> = match mode {
        FillMode::All => lines.iter().map(|line| line.to_string()).collect(),
        FillMode::FirstLetter => lines.iter().map(|line| repeat_first_letter(line)).collect(),
        FillMode::OneLine => {
            let Some(first) = lines.iter().find(|line| !line.trim().is_empty()) else {
                return Ok(Vec::new());
            };
            vec![first.to_string(); row_capacity]
        }
    };

    if contents.len() > row_capacity {
        return Err(FillError::Overflow {
            required: contents.len(),
            capacity: row_capacity,
        });
    }

    Ok(into_runs(contents))
}

/// Splits `raw_text` into runs across as many pages as needed, `row_capacity` rows each.
///
/// Row indices restart at zero on every page. `OneLine` always fits on one page.
pub fn paginate_runs(
    raw_text: &str,
    mode: FillMode,
    row_capacity: usize,
) -> Result<Vec<Vec<TextRun>>, FillError> {
    match compute_runs(raw_text, mode, row_capacity) {
        Ok(runs) => Ok(vec![runs]),
        Err(FillError::Overflow { required, .. }) if row_capacity == 0 => {
            Err(FillError::Overflow {
                required,
                capacity: 0,
            })
        }
        Err(FillError::Overflow { .. }) => {
            let all = compute_runs(raw_text, mode, usize::MAX)?;
            Ok(all
                .chunks(row_capacity)
                .map(|page| {
                    into_runs(page.iter().map(|run| run.content.clone()).collect())
                })
                .collect())
        }
    }
}

/// Input lines with trailing blank lines dropped; inner blank lines stay.
fn logical_lines(raw_text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = raw_text.lines().collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    lines
}

fn repeat_first_letter(line: &str) -> String {
    match line.trim_start().chars().next() {
        Some(letter) => vec![letter.to_string(); FIRST_LETTER_REPEAT].join(" "),
        None => String::new(),
    }
}

fn into_runs(contents: Vec<String>) -> Vec<TextRun> {
    contents
        .into_iter()
        .enumerate()
        .map(|(row_index, content)| {
            let content = if content.trim().is_empty() {
                String::new()
            } else {
                content
            };
            TextRun { content, row_index }
        })
        .collect()
}
