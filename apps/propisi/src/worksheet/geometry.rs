//! Geometry Engine: ruling primitives for a single worksheet page.
//!
//! Pure functions of the page metrics. Coordinates are page-relative points
//! with the origin at the top-left corner and y growing downward; the PDF
//! writer flips them when it serializes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::worksheet::options::{Layout, Orientation};

pub const A4_WIDTH_PT: f32 = 595.28;
pub const A4_HEIGHT_PT: f32 = 841.89;

/// Row pitch for `Lines` and `ObliqueLines` (two 14pt line heights).
pub const LINE_PITCH_PT: f32 = 28.0;
/// Cell edge for `Cells`.
pub const CELL_PITCH_PT: f32 = 25.0;
/// Horizontal distance between the starts of consecutive slant guides.
pub const OBLIQUE_SPACING_PT: f32 = 20.0;

const SIDE_MARGIN_PT: f32 = 28.0;
const BOTTOM_MARGIN_PT: f32 = 28.0;
/// Top margin leaves room for the task and student-name header.
const HEADER_MARGIN_PT: f32 = 72.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("degenerate page: {0}")]
    DegeneratePage(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Page metrics
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width: A4_WIDTH_PT,
        height: A4_HEIGHT_PT,
    };

    /// Puts the long edge vertical for `Portrait` and horizontal for `Landscape`.
    pub fn oriented(self, orientation: Orientation) -> PageSize {
        let (short, long) = if self.width <= self.height {
            (self.width, self.height)
        } else {
            (self.height, self.width)
        };
        match orientation {
            Orientation::Portrait => PageSize {
                width: short,
                height: long,
            },
            Orientation::Landscape => PageSize {
                width: long,
                height: short,
            },
        }
    }
}

/// Margins, page size and row pitch of one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    pub width: f32,
    pub height: f32,
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    /// Distance between consecutive ruling rows (and grid columns for cells).
    pub pitch: f32,
}

impl PageMetrics {
    /// Default metrics for a layout on the given page.
    pub fn for_layout(page: PageSize, layout: Layout) -> PageMetrics {
        let pitch = match layout {
            Layout::Lines | Layout::ObliqueLines => LINE_PITCH_PT,
            Layout::Cells => CELL_PITCH_PT,
        };
        PageMetrics {
            width: page.width,
            height: page.height,
            margin_top: HEADER_MARGIN_PT,
            margin_right: SIDE_MARGIN_PT,
            margin_bottom: BOTTOM_MARGIN_PT,
            margin_left: SIDE_MARGIN_PT,
            pitch,
        }
    }

    pub fn oriented(self, orientation: Orientation) -> PageMetrics {
        let page = PageSize {
            width: self.width,
            height: self.height,
        }
        .oriented(orientation);
        PageMetrics {
            width: page.width,
            height: page.height,
            ..self
        }
    }

    pub fn usable_width(&self) -> f32 {
        self.width - self.margin_left - self.margin_right
    }

    pub fn usable_height(&self) -> f32 {
        self.height - self.margin_top - self.margin_bottom
    }

    /// Complete ruling rows that fit between the top and bottom margins.
    pub fn row_count(&self) -> usize {
        (self.usable_height() / self.pitch).floor().max(0.0) as usize
    }

    /// Complete grid columns that fit between the side margins.
    pub fn column_count(&self) -> usize {
        (self.usable_width() / self.pitch).floor().max(0.0) as usize
    }

    pub fn ruled_left(&self) -> f32 {
        self.margin_left
    }

    pub fn ruled_right(&self) -> f32 {
        self.width - self.margin_right
    }

    pub fn ruled_top(&self) -> f32 {
        self.margin_top
    }

    /// y of the line closing the last complete row.
    pub fn ruled_bottom(&self) -> f32 {
        self.row_line_y(self.row_count())
    }

    /// y of the `k`-th horizontal line, counting from the top margin.
    pub fn row_line_y(&self, k: usize) -> f32 {
        self.margin_top + k as f32 * self.pitch
    }

    /// Baseline of a row: the line that closes it.
    pub fn baseline(&self, row: usize) -> f32 {
        self.row_line_y(row + 1)
    }

    fn check(&self) -> Result<(), GeometryError> {
        let values = [
            self.width,
            self.height,
            self.margin_top,
            self.margin_right,
            self.margin_bottom,
            self.margin_left,
            self.pitch,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::DegeneratePage(
                "page metrics must be finite".to_string(),
            ));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(GeometryError::DegeneratePage(format!(
                "page size {}x{} is not positive",
                self.width, self.height
            )));
        }
        if self.pitch <= 0.0 {
            return Err(GeometryError::DegeneratePage(format!(
                "pitch {} is not positive",
                self.pitch
            )));
        }
        if [
            self.margin_top,
            self.margin_right,
            self.margin_bottom,
            self.margin_left,
        ]
        .iter()
        .any(|m| *m < 0.0)
        {
            return Err(GeometryError::DegeneratePage(
                "margins must not be negative".to_string(),
            ));
        }
        if self.usable_width() <= 0.0 || self.usable_height() <= 0.0 {
            return Err(GeometryError::DegeneratePage(format!(
                "no usable area inside margins ({}x{})",
                self.usable_width(),
                self.usable_height()
            )));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ruling primitives
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RulingKind {
    HorizontalLine,
    VerticalLine,
    ObliqueSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RulingPrimitive {
    pub kind: RulingKind,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl RulingPrimitive {
    fn horizontal(y: f32, left: f32, right: f32) -> Self {
        Self {
            kind: RulingKind::HorizontalLine,
            x1: left,
            y1: y,
            x2: right,
            y2: y,
        }
    }

    fn vertical(x: f32, top: f32, bottom: f32) -> Self {
        Self {
            kind: RulingKind::VerticalLine,
            x1: x,
            y1: top,
            x2: x,
            y2: bottom,
        }
    }
}

/// Ruling for one page plus the metrics it was computed from.
///
/// Recomputed for every composition; never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPlan {
    pub metrics: PageMetrics,
    pub primitives: Vec<RulingPrimitive>,
}

impl LayoutPlan {
    /// Number of text rows the ruling provides.
    pub fn row_capacity(&self) -> usize {
        self.metrics.row_count()
    }
}

/// Computes the ruling for `layout` on a page oriented per `orientation`.
pub fn compute_ruling(
    layout: Layout,
    orientation: Orientation,
    metrics: &PageMetrics,
) -> Result<LayoutPlan, GeometryError> {
    metrics.check()?;
    let metrics = metrics.oriented(orientation);
    metrics.check()?;

    let primitives = match layout {
        Layout::Lines => horizontal_lines(&metrics),
        Layout::Cells => cell_grid(&metrics),
        Layout::ObliqueLines => oblique_lines(&metrics),
    };

    Ok(LayoutPlan {
        metrics,
        primitives,
    })
}

fn horizontal_lines(m: &PageMetrics) -> Vec<RulingPrimitive> {
    (0..=m.row_count())
        .map(|k| RulingPrimitive::horizontal(m.row_line_y(k), m.ruled_left(), m.ruled_right()))
        .collect()
}

/// All horizontals top to bottom, then all verticals left to right.
fn cell_grid(m: &PageMetrics) -> Vec<RulingPrimitive> {
    let rows = m.row_count();
    let cols = m.column_count();
    let left = m.ruled_left();
    let right = left + cols as f32 * m.pitch;
    let top = m.ruled_top();
    let bottom = m.ruled_bottom();

    let mut primitives = Vec::with_capacity(rows + cols + 2);
    primitives.extend((0..=rows).map(|k| RulingPrimitive::horizontal(m.row_line_y(k), left, right)));
    primitives.extend(
        (0..=cols).map(|c| RulingPrimitive::vertical(left + c as f32 * m.pitch, top, bottom)),
    );
    primitives
}

/// Each horizontal is followed by the slant guides of the band beneath it.
/// The last horizontal closes the ruled area and gets no guides.
fn oblique_lines(m: &PageMetrics) -> Vec<RulingPrimitive> {
    let rows = m.row_count();
    let run = 1.5 * m.pitch;
    let left = m.ruled_left();
    let right = m.ruled_right();

    let mut primitives = Vec::new();
    for k in 0..=rows {
        let y = m.row_line_y(k);
        primitives.push(RulingPrimitive::horizontal(y, left, right));
        if k == rows {
            break;
        }
        let band_bottom = m.row_line_y(k + 1);
        for j in 0.. {
            let x = left + j as f32 * OBLIQUE_SPACING_PT;
            if x + run > right + f32::EPSILON {
                break;
            }
            primitives.push(RulingPrimitive {
                kind: RulingKind::ObliqueSegment,
                x1: x,
                y1: band_bottom,
                x2: x + run,
                y2: y,
            });
        }
    }
    primitives
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4(layout: Layout) -> PageMetrics {
        PageMetrics::for_layout(PageSize::A4, layout)
    }

    fn count(plan: &LayoutPlan, kind: RulingKind) -> usize {
        plan.primitives.iter().filter(|p| p.kind == kind).count()
    }

    #[test]
    fn test_lines_span_top_to_bottom_margin_at_fixed_pitch() {
        let metrics = a4(Layout::Lines);
        let plan = compute_ruling(Layout::Lines, Orientation::Portrait, &metrics).unwrap();

        // (841.89 - 72 - 28) / 28 = 26.49 → 26 rows, 27 lines
        assert_eq!(plan.row_capacity(), 26);
        assert_eq!(plan.primitives.len(), 27);
        assert!(plan
            .primitives
            .iter()
            .all(|p| p.kind == RulingKind::HorizontalLine));

        let ys: Vec<f32> = plan.primitives.iter().map(|p| p.y1).collect();
        assert_eq!(ys[0], 72.0);
        for pair in ys.windows(2) {
            assert!((pair[1] - pair[0] - LINE_PITCH_PT).abs() < 1e-3);
        }
        assert!(*ys.last().unwrap() <= metrics.height - metrics.margin_bottom);
    }

    #[test]
    fn test_cells_horizontal_and_vertical_counts_follow_usable_area() {
        let metrics = a4(Layout::Cells);
        let plan = compute_ruling(Layout::Cells, Orientation::Portrait, &metrics).unwrap();
        let rows = plan.metrics.row_count();
        let cols = plan.metrics.column_count();

        assert_eq!(rows, 29); // 741.89 / 25
        assert_eq!(cols, 21); // 539.28 / 25
        assert_eq!(count(&plan, RulingKind::HorizontalLine), rows + 1);
        assert_eq!(count(&plan, RulingKind::VerticalLine), cols + 1);
    }

    #[test]
    fn test_cells_on_square_usable_area_emit_equal_counts() {
        let metrics = PageMetrics {
            width: 300.0,
            height: 300.0,
            margin_top: 25.0,
            margin_right: 25.0,
            margin_bottom: 25.0,
            margin_left: 25.0,
            pitch: 25.0,
        };
        let plan = compute_ruling(Layout::Cells, Orientation::Portrait, &metrics).unwrap();
        assert_eq!(
            count(&plan, RulingKind::HorizontalLine),
            count(&plan, RulingKind::VerticalLine)
        );
        assert_eq!(count(&plan, RulingKind::HorizontalLine), 11);
    }

    #[test]
    fn test_cells_are_emitted_horizontals_first() {
        let plan =
            compute_ruling(Layout::Cells, Orientation::Portrait, &a4(Layout::Cells)).unwrap();
        let first_vertical = plan
            .primitives
            .iter()
            .position(|p| p.kind == RulingKind::VerticalLine)
            .unwrap();
        assert!(plan.primitives[..first_vertical]
            .iter()
            .all(|p| p.kind == RulingKind::HorizontalLine));
        assert!(plan.primitives[first_vertical..]
            .iter()
            .all(|p| p.kind == RulingKind::VerticalLine));
    }

    #[test]
    fn test_oblique_segments_stay_inside_their_band() {
        let metrics = a4(Layout::ObliqueLines);
        let plan = compute_ruling(Layout::ObliqueLines, Orientation::Portrait, &metrics).unwrap();
        let m = plan.metrics;

        assert_eq!(count(&plan, RulingKind::HorizontalLine), m.row_count() + 1);
        assert!(count(&plan, RulingKind::ObliqueSegment) > 0);

        for seg in plan
            .primitives
            .iter()
            .filter(|p| p.kind == RulingKind::ObliqueSegment)
        {
            assert!((seg.x2 - seg.x1 - 1.5 * m.pitch).abs() < 1e-3);
            assert!((seg.y1 - seg.y2 - m.pitch).abs() < 1e-3);
            assert!(seg.x2 <= m.ruled_right() + 1e-3);
            assert!(seg.y1 <= m.ruled_bottom() + 1e-3, "no partial segment below the last line");
        }
    }

    #[test]
    fn test_oblique_interleaves_guides_after_each_horizontal() {
        let plan = compute_ruling(
            Layout::ObliqueLines,
            Orientation::Portrait,
            &a4(Layout::ObliqueLines),
        )
        .unwrap();
        assert_eq!(plan.primitives[0].kind, RulingKind::HorizontalLine);
        assert_eq!(plan.primitives[1].kind, RulingKind::ObliqueSegment);
        assert_eq!(
            plan.primitives.last().unwrap().kind,
            RulingKind::HorizontalLine,
            "closing line has no guides after it"
        );
    }

    #[test]
    fn test_landscape_swaps_page_axes() {
        let plan =
            compute_ruling(Layout::Lines, Orientation::Landscape, &a4(Layout::Lines)).unwrap();
        assert_eq!(plan.metrics.width, A4_HEIGHT_PT);
        assert_eq!(plan.metrics.height, A4_WIDTH_PT);
        // (595.28 - 100) / 28 = 17.69
        assert_eq!(plan.row_capacity(), 17);
    }

    #[test]
    fn test_degenerate_pages_fail() {
        let mut metrics = a4(Layout::Lines);
        metrics.pitch = 0.0;
        assert!(compute_ruling(Layout::Lines, Orientation::Portrait, &metrics).is_err());

        let mut metrics = a4(Layout::Lines);
        metrics.width = -1.0;
        assert!(compute_ruling(Layout::Lines, Orientation::Portrait, &metrics).is_err());

        let mut metrics = a4(Layout::Lines);
        metrics.margin_top = 900.0;
        assert!(matches!(
            compute_ruling(Layout::Lines, Orientation::Portrait, &metrics),
            Err(GeometryError::DegeneratePage(_))
        ));
    }

    #[test]
    fn test_ruling_is_deterministic() {
        let metrics = a4(Layout::ObliqueLines);
        let a = compute_ruling(Layout::ObliqueLines, Orientation::Landscape, &metrics).unwrap();
        let b = compute_ruling(Layout::ObliqueLines, Orientation::Landscape, &metrics).unwrap();
        assert_eq!(a, b);
    }
}
