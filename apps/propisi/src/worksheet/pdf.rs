//! PDF serialization of composed worksheets via `pdf-writer`.
//!
//! Output is a pure function of the document and font: no timestamps, no
//! random IDs, so identical input yields identical bytes.

use std::collections::BTreeMap;

use pdf_writer::types::{CidFontType, FontFlags, LineCapStyle, SystemInfo, TextRenderingMode};
use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, Str, TextStr};
use thiserror::Error;
use ttf_parser::Face;

use crate::worksheet::compose::{Document, DrawOp, GlyphPaint, Page, Pen};
use crate::worksheet::font::{encode_win_ansi, FontError, FontSource, TrueTypeFont, BUILTIN_FONT};

const FONT_RESOURCE: Name<'static> = Name(b"F1");

#[derive(Debug, Error)]
pub enum PdfError {
    #[error(transparent)]
    Font(#[from] FontError),

    #[error("document has no pages")]
    Empty,
}

/// Sequential object-id allocator.
struct Refs(i32);

impl Refs {
    fn next(&mut self) -> Ref {
        let id = Ref::new(self.0);
        self.0 += 1;
        id
    }
}

/// Serializes `document` to PDF bytes, drawing text with `font`.
pub fn write_pdf(document: &Document, font: &FontSource) -> Result<Vec<u8>, PdfError> {
    if document.pages.is_empty() {
        return Err(PdfError::Empty);
    }

    let mut pdf = Pdf::new();
    let mut refs = Refs(1);
    let catalog_id = refs.next();
    let page_tree_id = refs.next();
    let info_id = refs.next();
    let font_id = refs.next();

    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.document_info(info_id)
        .title(TextStr(&document.title))
        .producer(TextStr(concat!("propisi ", env!("CARGO_PKG_VERSION"))));

    let encoder = match font {
        FontSource::Builtin => {
            pdf.type1_font(font_id)
                .base_font(Name(BUILTIN_FONT.as_bytes()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            TextEncoder::WinAnsi
        }
        FontSource::TrueType(ttf) => {
            let face = ttf.face()?;
            let glyphs = used_glyphs(document, &face);
            embed_truetype(&mut pdf, &mut refs, font_id, ttf, &face, &glyphs);
            TextEncoder::Glyphs(glyphs)
        }
    };

    let mut page_ids = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        let page_id = refs.next();
        let content_id = refs.next();
        page_ids.push(page_id);

        let content = render_page(page, &encoder);
        pdf.stream(content_id, &content);

        let mut writer = pdf.page(page_id);
        writer
            .media_box(Rect::new(0.0, 0.0, page.size.width, page.size.height))
            .parent(page_tree_id)
            .contents(content_id);
        writer.resources().fonts().pair(FONT_RESOURCE, font_id);
        writer.finish();
    }

    let count = page_ids.len() as i32;
    pdf.pages(page_tree_id).kids(page_ids).count(count);

    Ok(pdf.finish())
}

// ────────────────────────────────────────────────────────────────────────────
// Content streams
// ────────────────────────────────────────────────────────────────────────────

enum TextEncoder {
    WinAnsi,
    /// Unicode scalar → glyph id for the embedded font (Identity-H, CID = GID).
    Glyphs(BTreeMap<char, u16>),
}

impl TextEncoder {
    fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoder::WinAnsi => encode_win_ansi(text),
            TextEncoder::Glyphs(map) => text
                .chars()
                .flat_map(|c| map.get(&c).copied().unwrap_or(0).to_be_bytes())
                .collect(),
        }
    }
}

fn render_page(page: &Page, encoder: &TextEncoder) -> Vec<u8> {
    let height = page.size.height;
    let mut content = Content::new();
    content.set_line_cap(LineCapStyle::ButtCap);

    for op in &page.ops {
        match op {
            DrawOp::Rule { primitive, pen } => {
                content.save_state();
                apply_pen(&mut content, pen);
                content.move_to(primitive.x1, height - primitive.y1);
                content.line_to(primitive.x2, height - primitive.y2);
                content.stroke();
                content.restore_state();
            }
            DrawOp::Text {
                x,
                y,
                size,
                content: text,
                paint,
            } => {
                content.save_state();
                match paint {
                    GlyphPaint::Fill(color) => {
                        content.set_fill_rgb(color.r, color.g, color.b);
                    }
                    GlyphPaint::DashedOutline { color, width, dash } => {
                        content.set_stroke_rgb(color.r, color.g, color.b);
                        content.set_line_width(*width);
                        content.set_dash_pattern(dash.iter().copied(), 0.0);
                    }
                }
                content.begin_text();
                if matches!(paint, GlyphPaint::DashedOutline { .. }) {
                    content.set_text_rendering_mode(TextRenderingMode::Stroke);
                }
                content.set_font(FONT_RESOURCE, *size);
                content.next_line(*x, height - *y);
                content.show(Str(&encoder.encode(text)));
                content.end_text();
                content.restore_state();
            }
        }
    }

    content.finish()
}

fn apply_pen(content: &mut Content, pen: &Pen) {
    content.set_stroke_rgb(pen.color.r, pen.color.g, pen.color.b);
    content.set_line_width(pen.width);
    if let Some(dash) = pen.dash {
        content.set_dash_pattern(dash, 0.0);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TrueType embedding
// ────────────────────────────────────────────────────────────────────────────

/// Glyph ids for every character drawn anywhere in the document.
fn used_glyphs(document: &Document, face: &Face<'_>) -> BTreeMap<char, u16> {
    let mut glyphs = BTreeMap::new();
    let texts = document.pages.iter().flat_map(|page| {
        page.ops.iter().filter_map(|op| match op {
            DrawOp::Text { content, .. } => Some(content.as_str()),
            DrawOp::Rule { .. } => None,
        })
    });
    for c in texts.flat_map(str::chars) {
        if let Some(gid) = face.glyph_index(c) {
            glyphs.insert(c, gid.0);
        }
    }
    glyphs
}

/// Writes the Type0 font, its CIDFontType2 descendant, descriptor, font file
/// and ToUnicode CMap. Only glyphs in `glyphs` get widths and CMap entries.
fn embed_truetype(
    pdf: &mut Pdf,
    refs: &mut Refs,
    font_id: Ref,
    ttf: &TrueTypeFont,
    face: &Face<'_>,
    glyphs: &BTreeMap<char, u16>,
) {
    let descriptor_id = refs.next();
    let cid_font_id = refs.next();
    let cid_to_gid_id = refs.next();
    let font_file_id = refs.next();
    let to_unicode_id = refs.next();

    let scale = 1000.0 / face.units_per_em() as f32;
    let base_font = ttf.base_font_name();
    let base_font = Name(base_font.as_bytes());

    // CID = GID, so the map is the identity up to the highest glyph used.
    let max_gid = glyphs.values().copied().max().unwrap_or(0);
    let cid_to_gid: Vec<u8> = (0..=max_gid).flat_map(u16::to_be_bytes).collect();
    pdf.stream(cid_to_gid_id, &cid_to_gid);

    let data = ttf.data();
    pdf.stream(font_file_id, data)
        .pair(Name(b"Length1"), data.len() as i32);

    pdf.stream(to_unicode_id, to_unicode_cmap(glyphs).as_bytes());

    let bbox = face.global_bounding_box();
    pdf.font_descriptor(descriptor_id)
        .name(base_font)
        .flags(FontFlags::SYMBOLIC)
        .bbox(Rect::new(
            bbox.x_min as f32 * scale,
            bbox.y_min as f32 * scale,
            bbox.x_max as f32 * scale,
            bbox.y_max as f32 * scale,
        ))
        .italic_angle(0.0)
        .ascent(face.ascender() as f32 * scale)
        .descent(face.descender() as f32 * scale)
        .cap_height(face.capital_height().unwrap_or(face.ascender()) as f32 * scale)
        .stem_v(80.0)
        .font_file2(font_file_id);

    let mut widths: BTreeMap<u16, f32> = BTreeMap::new();
    for gid in glyphs.values() {
        let advance = face
            .glyph_hor_advance(ttf_parser::GlyphId(*gid))
            .map(|adv| (adv as f32 * scale).round())
            .unwrap_or(500.0);
        widths.insert(*gid, advance);
    }

    {
        let mut cid_font = pdf.cid_font(cid_font_id);
        cid_font
            .subtype(CidFontType::Type2)
            .base_font(base_font)
            .system_info(SystemInfo {
                registry: Str(b"Adobe"),
                ordering: Str(b"Identity"),
                supplement: 0,
            })
            .font_descriptor(descriptor_id)
            .default_width(500.0)
            .cid_to_gid_map_stream(cid_to_gid_id);
        let mut writer = cid_font.widths();
        for (gid, width) in widths {
            writer.consecutive(gid, [width]);
        }
    }

    pdf.type0_font(font_id)
        .base_font(base_font)
        .encoding_predefined(Name(b"Identity-H"))
        .descendant_font(cid_font_id)
        .to_unicode(to_unicode_id);
}

fn to_unicode_cmap(glyphs: &BTreeMap<char, u16>) -> String {
    let mut pairs: Vec<(u16, char)> = glyphs.iter().map(|(c, gid)| (*gid, *c)).collect();
    pairs.sort_unstable();
    pairs.dedup_by_key(|(gid, _)| *gid);

    let mut sections = String::new();
    for chunk in pairs.chunks(100) {
        sections.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, c) in chunk {
            let mut units = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{u:04X}"))
                .collect();
            sections.push_str(&format!("<{gid:04X}> <{hex}>\n"));
        }
        sections.push_str("endbfchar\n");
    }

    format!(
        "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
{sections}endcmap
CMapName currentdict /CMap defineresource pop
end
end"
    )
}
