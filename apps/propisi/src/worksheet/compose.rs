//! Page Composer: merges ruling, header and text runs into draw operations.
//!
//! Draw order on every page:
//! 1. ruling primitives (in the order the geometry engine emits them)
//! 2. the red notebook margin rule near the right edge
//! 3. header: task line, then the optional student name
//! 4. one text op per non-blank run (per glyph for `Cells`)
//!
//! `compose` is the single-page contract and reports overflow;
//! `compose_paginated` splits long text across pages instead.

use thiserror::Error;
use tracing::warn;

use crate::worksheet::fill::{compute_runs, paginate_runs, FillError, TextRun};
use crate::worksheet::font::FontSource;
use crate::worksheet::geometry::{
    compute_ruling, GeometryError, LayoutPlan, PageMetrics, PageSize, RulingKind,
    RulingPrimitive,
};
use crate::worksheet::options::{FillMode, Layout, StrokeStyle, ValidationError, WorksheetOptions};
use crate::worksheet::pdf::{write_pdf, PdfError};

const TASK_FONT_SIZE: f32 = 16.0;
const NAME_FONT_SIZE: f32 = 12.0;
/// Distance of the task baseline above the first ruling line.
const TASK_OFFSET: f32 = 40.0;
const NAME_OFFSET: f32 = 18.0;
/// Text sits this far above its row's baseline.
const TEXT_LIFT: f32 = 3.0;
const TEXT_INDENT: f32 = 6.0;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Fill(#[from] FillError),

    #[error("pdf serialization failed: {0}")]
    Pdf(#[from] PdfError),
}

// ────────────────────────────────────────────────────────────────────────────
// Draw model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::gray(0.0);
    pub const NEUTRAL_GRAY: Rgb = Rgb::gray(0.6);
    pub const LIGHT_GRAY: Rgb = Rgb::gray(0.8);
    pub const OUTLINE_GRAY: Rgb = Rgb::gray(0.35);
    pub const MARGIN_RED: Rgb = Rgb {
        r: 0.86,
        g: 0.2,
        b: 0.2,
    };

    pub const fn gray(level: f32) -> Rgb {
        Rgb {
            r: level,
            g: level,
            b: level,
        }
    }
}

/// Stroke settings for a ruling rule. `dash` is `[on, off]` in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pen {
    pub color: Rgb,
    pub width: f32,
    pub dash: Option<[f32; 2]>,
}

/// How glyphs are painted: solid fill, or a dashed outline for tracing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlyphPaint {
    Fill(Rgb),
    DashedOutline { color: Rgb, width: f32, dash: [f32; 2] },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Rule {
        primitive: RulingPrimitive,
        pen: Pen,
    },
    /// `(x, y)` is the text origin on the baseline, top-left page coordinates.
    Text {
        x: f32,
        y: f32,
        size: f32,
        content: String,
        paint: GlyphPaint,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub size: PageSize,
    pub ops: Vec<DrawOp>,
}

/// In-memory worksheet, ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub title: String,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn to_pdf(&self, font: &FontSource) -> Result<Vec<u8>, PdfError> {
        write_pdf(self, font)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PageComposer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PageComposer {
    font: FontSource,
}

impl PageComposer {
    pub fn new(font: FontSource) -> Self {
        Self { font }
    }

    pub fn font(&self) -> &FontSource {
        &self.font
    }

    /// One page. Text that needs more rows than the page holds is an error.
    pub fn compose(
        &self,
        options: &WorksheetOptions,
        page: PageSize,
    ) -> Result<Document, ComposeError> {
        options.validate()?;
        let plan = plan_for(options, page)?;
        let runs = compute_runs(&options.text, options.fill_mode, plan.row_capacity())?;
        Ok(Document {
            title: options.task.clone(),
            pages: vec![build_page(options, &plan, &runs)],
        })
    }

    /// As many pages as the text needs; the header is repeated on each one.
    pub fn compose_paginated(
        &self,
        options: &WorksheetOptions,
        page: PageSize,
    ) -> Result<Document, ComposeError> {
        options.validate()?;
        let plan = plan_for(options, page)?;
        let pages = paginate_runs(&options.text, options.fill_mode, plan.row_capacity())?
            .iter()
            .map(|runs| build_page(options, &plan, runs))
            .collect();
        Ok(Document {
            title: options.task.clone(),
            pages,
        })
    }

    /// Composes on A4 and serializes to PDF bytes.
    pub fn render_pdf(
        &self,
        options: &WorksheetOptions,
        paginate: bool,
    ) -> Result<Vec<u8>, ComposeError> {
        let document = if paginate {
            self.compose_paginated(options, PageSize::A4)?
        } else {
            self.compose(options, PageSize::A4)?
        };
        Ok(document.to_pdf(&self.font)?)
    }
}

fn plan_for(options: &WorksheetOptions, page: PageSize) -> Result<LayoutPlan, GeometryError> {
    let metrics = PageMetrics::for_layout(page, options.layout);
    compute_ruling(options.layout, options.orientation, &metrics)
}

fn build_page(options: &WorksheetOptions, plan: &LayoutPlan, runs: &[TextRun]) -> Page {
    let m = &plan.metrics;
    let mut ops = Vec::with_capacity(plan.primitives.len() + runs.len() + 3);

    ops.extend(plan.primitives.iter().map(|primitive| DrawOp::Rule {
        primitive: *primitive,
        pen: ruling_pen(options.stroke_style, primitive.kind),
    }));

    let margin_x = m.width - m.margin_right / 2.0;
    ops.push(DrawOp::Rule {
        primitive: RulingPrimitive {
            kind: RulingKind::VerticalLine,
            x1: margin_x,
            y1: 0.0,
            x2: margin_x,
            y2: m.height,
        },
        pen: Pen {
            color: Rgb::MARGIN_RED,
            width: 0.5,
            dash: None,
        },
    });

    ops.push(DrawOp::Text {
        x: m.margin_left,
        y: m.margin_top - TASK_OFFSET,
        size: TASK_FONT_SIZE,
        content: options.task.clone(),
        paint: GlyphPaint::Fill(Rgb::BLACK),
    });
    if let Some(name) = &options.student_name {
        ops.push(DrawOp::Text {
            x: m.margin_left,
            y: m.margin_top - NAME_OFFSET,
            size: NAME_FONT_SIZE,
            content: name.clone(),
            paint: GlyphPaint::Fill(Rgb::BLACK),
        });
    }

    if options.layout == Layout::Cells {
        let clipped = clipped_rows(options, m, runs);
        if clipped > 0 {
            warn!(
                rows = clipped,
                columns = m.column_count(),
                "rows wider than the grid, dropping trailing glyphs"
            );
        }
    }

    let paint = glyph_paint(options.stroke_style);
    for run in runs.iter().filter(|run| !run.is_blank()) {
        match options.layout {
            Layout::Lines | Layout::ObliqueLines => ops.push(DrawOp::Text {
                x: m.margin_left + TEXT_INDENT,
                y: m.baseline(run.row_index) - TEXT_LIFT,
                size: m.pitch * 0.75,
                content: run.content.clone(),
                paint,
            }),
            Layout::Cells => push_cell_glyphs(&mut ops, m, run, paint),
        }
    }

    Page {
        size: PageSize {
            width: m.width,
            height: m.height,
        },
        ops,
    }
}

/// Rows of user text that run past the last grid column.
///
/// Repeated first letters are a fill pattern cut to the grid width, so they
/// never count.
fn clipped_rows(options: &WorksheetOptions, m: &PageMetrics, runs: &[TextRun]) -> usize {
    if options.fill_mode == FillMode::FirstLetter {
        return 0;
    }
    let columns = m.column_count();
    runs.iter()
        .filter(|run| run.content.chars().count() > columns)
        .count()
}

/// One glyph centered in each cell of the row; spaces leave their cell empty.
fn push_cell_glyphs(ops: &mut Vec<DrawOp>, m: &PageMetrics, run: &TextRun, paint: GlyphPaint) {
    let size = m.pitch * 0.7;
    for (column, c) in run.content.chars().take(m.column_count()).enumerate() {
        if c.is_whitespace() {
            continue;
        }
        let center = m.ruled_left() + (column as f32 + 0.5) * m.pitch;
        ops.push(DrawOp::Text {
            x: center - size * 0.25,
            y: m.baseline(run.row_index) - m.pitch * 0.25,
            size,
            content: c.to_string(),
            paint,
        });
    }
}

fn ruling_pen(style: StrokeStyle, kind: RulingKind) -> Pen {
    let color = match style {
        StrokeStyle::Black => Rgb::BLACK,
        StrokeStyle::Gray | StrokeStyle::Dotted => Rgb::NEUTRAL_GRAY,
    };
    match kind {
        RulingKind::ObliqueSegment => Pen {
            color: if style == StrokeStyle::Black {
                color
            } else {
                Rgb::LIGHT_GRAY
            },
            width: 0.25,
            dash: (style == StrokeStyle::Dotted).then_some([1.5, 1.5]),
        },
        RulingKind::HorizontalLine | RulingKind::VerticalLine => Pen {
            color,
            width: if style == StrokeStyle::Black { 0.5 } else { 0.3 },
            dash: None,
        },
    }
}

fn glyph_paint(style: StrokeStyle) -> GlyphPaint {
    match style {
        StrokeStyle::Black => GlyphPaint::Fill(Rgb::BLACK),
        StrokeStyle::Gray => GlyphPaint::Fill(Rgb::NEUTRAL_GRAY),
        StrokeStyle::Dotted => GlyphPaint::DashedOutline {
            color: Rgb::OUTLINE_GRAY,
            width: 0.4,
            dash: [1.0, 1.2],
        },
    }
}
