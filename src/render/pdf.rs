//! PDF encoding for terms documents.
//!
//! Text is set in DejaVu Sans, embedded as a composite (Type0) TrueType
//! font. Every distinct character gets its own CID, mapped to a glyph via
//! `CIDToGIDMap` and back to Unicode via a `ToUnicode` CMap, so the text
//! layer reproduces exactly what the user typed. Characters the font has
//! no glyph for still extract correctly; they are drawn as the font's
//! missing-glyph box.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use ttf_parser::{Face, GlyphId};

use crate::error::RenderError;

use super::terms::TermsDocument;

static FONT_DATA: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
const FONT_NAME: &str = "DejaVuSans";

/// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const TEXT_WIDTH: f64 = (PAGE_WIDTH - 2 * MARGIN) as f64;
const TITLE_SIZE: i64 = 16;
const BODY_SIZE: i64 = 12;
const LEADING: i64 = 18;
/// Stroke width used to embolden the title.
const TITLE_STROKE: f32 = 0.5;
/// ToUnicode `bfchar` blocks hold at most 100 entries.
const BFCHAR_BLOCK: usize = 100;

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Title(String),
    Body(String),
    Blank,
}

/// Glyph lookup and advance widths for the embedded font.
struct FontMetrics<'a> {
    face: Face<'a>,
    units_per_em: f64,
}

impl<'a> FontMetrics<'a> {
    fn load(data: &'a [u8]) -> Result<Self, RenderError> {
        let face = Face::parse(data, 0)
            .map_err(|e| RenderError::Pdf(format!("embedded font is unreadable: {e}")))?;
        let units_per_em = f64::from(face.units_per_em());
        Ok(Self { face, units_per_em })
    }

    fn glyph(&self, ch: char) -> GlyphId {
        self.face.glyph_index(ch).unwrap_or(GlyphId(0))
    }

    /// Advance of `ch` in thousandths of the font size.
    fn advance(&self, ch: char) -> i64 {
        let units = self.face.glyph_hor_advance(self.glyph(ch)).unwrap_or(0);
        self.scale(i64::from(units))
    }

    fn scale(&self, units: i64) -> i64 {
        (units as f64 * 1000.0 / self.units_per_em).round() as i64
    }

    /// Rendered width of `text` at `size` points.
    fn width(&self, text: &str, size: i64) -> f64 {
        let total: i64 = text.chars().map(|ch| self.advance(ch)).sum();
        total as f64 * size as f64 / 1000.0
    }
}

/// The document's characters, numbered from CID 1 in order of first use.
struct CharTable {
    cids: HashMap<char, u16>,
    chars: Vec<char>,
}

impl CharTable {
    fn collect<'l>(lines: impl IntoIterator<Item = &'l Line>) -> Result<Self, RenderError> {
        let mut table = Self {
            cids: HashMap::new(),
            chars: Vec::new(),
        };
        for line in lines {
            let (Line::Title(text) | Line::Body(text)) = line else {
                continue;
            };
            for ch in text.chars() {
                if table.cids.contains_key(&ch) {
                    continue;
                }
                let cid = u16::try_from(table.chars.len() + 1)
                    .map_err(|_| RenderError::Pdf("too many distinct characters".to_string()))?;
                table.cids.insert(ch, cid);
                table.chars.push(ch);
            }
        }
        Ok(table)
    }

    /// Two-byte big-endian CIDs for an `Identity-H` encoded font.
    fn encode(&self, text: &str) -> Vec<u8> {
        text.chars()
            .flat_map(|ch| self.cids.get(&ch).copied().unwrap_or(0).to_be_bytes())
            .collect()
    }
}

/// Encode the document as PDF bytes, adding pages as needed.
pub fn encode(doc: &TermsDocument) -> Result<Vec<u8>, RenderError> {
    let font = FontMetrics::load(FONT_DATA)?;
    let lines = layout(doc, &font);
    let table = CharTable::collect(&lines)?;
    let pages = paginate(lines);

    let mut pdf = Document::with_version("1.5");
    let pages_id = pdf.new_object_id();
    let font_id = add_font(&mut pdf, &font, &table);
    let resources_id = pdf.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in &pages {
        let content = page_content(page, &font, &table)
            .encode()
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let content_id = pdf.add_object(Stream::new(dictionary! {}, content));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    pdf.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    pdf.trailer.set("Root", catalog_id);
    pdf.compress();

    let mut bytes = Vec::new();
    pdf.save_to(&mut bytes)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(bytes)
}

/// Embed the font as Type0 / CIDFontType2 and return the Type0 font id.
fn add_font(pdf: &mut Document, font: &FontMetrics, table: &CharTable) -> ObjectId {
    let face = &font.face;
    let bbox = face.global_bounding_box();
    let ascent = font.scale(i64::from(face.ascender()));
    let descent = font.scale(i64::from(face.descender()));
    let cap_height = face
        .capital_height()
        .map(|h| font.scale(i64::from(h)))
        .unwrap_or(ascent);

    let font_file = pdf.add_object(Stream::new(
        dictionary! { "Length1" => FONT_DATA.len() as i64 },
        FONT_DATA.to_vec(),
    ));
    let descriptor = pdf.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => FONT_NAME,
        "Flags" => 32,
        "FontBBox" => vec![
            font.scale(i64::from(bbox.x_min)).into(),
            font.scale(i64::from(bbox.y_min)).into(),
            font.scale(i64::from(bbox.x_max)).into(),
            font.scale(i64::from(bbox.y_max)).into(),
        ],
        "ItalicAngle" => 0,
        "Ascent" => ascent,
        "Descent" => descent,
        "CapHeight" => cap_height,
        "StemV" => 80,
        "FontFile2" => font_file,
    });

    // CID 0 stays on .notdef.
    let mut gid_map = vec![0u8, 0u8];
    for &ch in &table.chars {
        gid_map.extend_from_slice(&font.glyph(ch).0.to_be_bytes());
    }
    let cid_to_gid = pdf.add_object(Stream::new(dictionary! {}, gid_map));

    let widths: Vec<Object> = table
        .chars
        .iter()
        .map(|&ch| font.advance(ch).into())
        .collect();

    let cid_font = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => FONT_NAME,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor,
        "DW" => 1000,
        "W" => vec![Object::Integer(1), Object::Array(widths)],
        "CIDToGIDMap" => cid_to_gid,
    });

    let to_unicode = pdf.add_object(Stream::new(
        dictionary! {},
        to_unicode_cmap(&table.chars).into_bytes(),
    ));

    pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => FONT_NAME,
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![cid_font.into()],
        "ToUnicode" => to_unicode,
    })
}

/// CMap mapping each CID (1-based index into `chars`) to its character.
fn to_unicode_cmap(chars: &[char]) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );

    for (block_index, block) in chars.chunks(BFCHAR_BLOCK).enumerate() {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (offset, &ch) in block.iter().enumerate() {
            let cid = block_index * BFCHAR_BLOCK + offset + 1;
            let mut units = [0u16; 2];
            let utf16: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|unit| format!("{unit:04X}"))
                .collect();
            cmap.push_str(&format!("<{cid:04X}> <{utf16}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}

fn layout(doc: &TermsDocument, font: &FontMetrics) -> Vec<Line> {
    let title_width = |s: &str| font.width(s, TITLE_SIZE);
    let body_width = |s: &str| font.width(s, BODY_SIZE);

    let mut lines: Vec<Line> = wrap(&doc.title, TEXT_WIDTH, &title_width)
        .into_iter()
        .map(Line::Title)
        .collect();

    for section in &doc.sections {
        lines.push(Line::Blank);
        let texts = section.heading.iter().chain(&section.lines);
        for text in texts {
            lines.extend(
                wrap(text, TEXT_WIDTH, &body_width)
                    .into_iter()
                    .map(Line::Body),
            );
        }
    }
    lines
}

fn paginate(lines: Vec<Line>) -> Vec<Vec<Line>> {
    let per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
    let mut pages: Vec<Vec<Line>> = Vec::new();
    let mut current = Vec::new();
    for line in lines {
        if current.len() == per_page {
            pages.push(std::mem::take(&mut current));
        }
        // No page starts with a blank line.
        if current.is_empty() && line == Line::Blank && !pages.is_empty() {
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() || pages.is_empty() {
        pages.push(current);
    }
    pages
}

fn page_content(lines: &[Line], font: &FontMetrics, table: &CharTable) -> Content {
    let mut operations = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        match line {
            Line::Blank => {}
            Line::Title(text) => {
                let x = centered_x(font.width(text, TITLE_SIZE));
                // Fill-and-stroke render mode stands in for a bold face.
                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new("w", vec![Object::Real(TITLE_STROKE)]));
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tr", vec![2.into()]));
                push_text(&mut operations, table, text, TITLE_SIZE, x, y);
                operations.push(Operation::new("ET", vec![]));
                operations.push(Operation::new("Q", vec![]));
            }
            Line::Body(text) => {
                operations.push(Operation::new("BT", vec![]));
                push_text(&mut operations, table, text, BODY_SIZE, MARGIN, y);
                operations.push(Operation::new("ET", vec![]));
            }
        }
        y -= LEADING;
    }

    Content { operations }
}

fn push_text(operations: &mut Vec<Operation>, table: &CharTable, text: &str, size: i64, x: i64, y: i64) {
    operations.push(Operation::new("Tf", vec!["F1".into(), size.into()]));
    operations.push(Operation::new("Td", vec![x.into(), y.into()]));
    operations.push(Operation::new(
        "Tj",
        vec![Object::String(table.encode(text), StringFormat::Hexadecimal)],
    ));
}

fn centered_x(width: f64) -> i64 {
    (((PAGE_WIDTH as f64 - width) / 2.0).round() as i64).max(MARGIN)
}

/// Greedy word wrap against a measured width. Words wider than the line
/// are hard-cut between characters.
fn wrap(text: &str, max_width: f64, measure: &dyn Fn(&str) -> f64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if measure(&candidate) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if measure(word) <= max_width {
            current = word.to_string();
            continue;
        }

        let mut piece = String::new();
        for ch in word.chars() {
            piece.push(ch);
            if piece.chars().count() > 1 && measure(&piece) > max_width {
                piece.pop();
                lines.push(std::mem::take(&mut piece));
                piece.push(ch);
            }
        }
        current = piece;
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
