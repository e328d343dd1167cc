use crate::error::ExtractionError;
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Page-tagged text of one PDF. `page_count` includes pages without text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub pages: Vec<PageText>,
    pub page_count: u32,
}

impl ExtractedText {
    /// Full document text with a page marker in front of every page.
    pub fn joined(&self) -> String {
        self.pages
            .iter()
            .map(|page| format!("[Page {}]\n{}", page.number, page.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
        let document = Document::load_mem(bytes)
            .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

        let page_numbers = document.get_pages();
        let page_count = page_numbers.len() as u32;

        let mut pages = Vec::new();
        for (page_no, page_id) in page_numbers {
            let text = page_text(&document, page_id)
                .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(ExtractionError::NoReadableText { page_count });
        }

        Ok(ExtractedText { pages, page_count })
    }
}

/// Vertical gap, in line heights, above which two lines belong to
/// different paragraphs.
const PARAGRAPH_GAP: f32 = 1.5;

/// Text-state tracking needed to place line and paragraph breaks.
struct TextCursor {
    y: f32,
    scale: f32,
    leading: f32,
    font_size: f32,
    last_line_y: Option<f32>,
}

impl TextCursor {
    fn new() -> Self {
        Self {
            y: 0.0,
            scale: 1.0,
            leading: 0.0,
            font_size: 0.0,
            last_line_y: None,
        }
    }

    fn begin_text(&mut self) {
        self.y = 0.0;
        self.scale = 1.0;
    }

    fn move_by(&mut self, ty: f32) {
        self.y += ty * self.scale;
    }

    fn next_line(&mut self) {
        self.y -= self.leading * self.scale;
    }

    fn line_height(&self) -> f32 {
        self.font_size.max(self.leading).max(1.0) * self.scale
    }

    /// Separator to emit before text shown at the current position.
    fn separator(&mut self) -> &'static str {
        let separator = match self.last_line_y {
            None => "",
            Some(previous) => {
                let gap = (previous - self.y).abs();
                if gap > PARAGRAPH_GAP * self.line_height() {
                    "\n\n"
                } else if gap > 0.01 {
                    "\n"
                } else {
                    ""
                }
            }
        };
        self.last_line_y = Some(self.y);
        separator
    }
}

fn number(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(|operand| operand.as_float().ok())
}

fn collect_text(text: &mut String, encoding: Option<&str>, operands: &[Object]) {
    for operand in operands {
        match operand {
            Object::String(bytes, _) => text.push_str(&Document::decode_text(encoding, bytes)),
            Object::Array(items) => {
                collect_text(text, encoding, items);
                text.push(' ');
            }
            Object::Integer(kerning) if *kerning < -100 => text.push(' '),
            _ => {}
        }
    }
}

/// Walks the page's content stream and decodes shown text. Lines are
/// separated by `\n`; a vertical jump larger than [`PARAGRAPH_GAP`] line
/// heights starts a new paragraph with a blank line.
fn page_text(document: &Document, page_id: ObjectId) -> lopdf::Result<String> {
    let encodings: BTreeMap<Vec<u8>, &str> = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect();
    let content = document.get_and_decode_page_content(page_id)?;

    let mut text = String::new();
    let mut cursor = TextCursor::new();
    let mut encoding = None;

    for operation in &content.operations {
        let operands = operation.operands.as_slice();
        match operation.operator.as_str() {
            "BT" => cursor.begin_text(),
            "Tf" => {
                encoding = operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| encodings.get(name).copied());
                cursor.font_size = number(operands, 1).unwrap_or(cursor.font_size).abs();
            }
            "TL" => cursor.leading = number(operands, 0).unwrap_or(cursor.leading),
            "Td" => cursor.move_by(number(operands, 1).unwrap_or(0.0)),
            "TD" => {
                let ty = number(operands, 1).unwrap_or(0.0);
                cursor.leading = -ty;
                cursor.move_by(ty);
            }
            "Tm" => {
                cursor.scale = number(operands, 3)
                    .map(f32::abs)
                    .filter(|d| *d > 0.0)
                    .unwrap_or(1.0);
                cursor.y = number(operands, 5).unwrap_or(0.0);
            }
            "T*" => cursor.next_line(),
            "Tj" | "TJ" => {
                text.push_str(cursor.separator());
                collect_text(&mut text, encoding, operands);
            }
            "'" => {
                cursor.next_line();
                text.push_str(cursor.separator());
                collect_text(&mut text, encoding, operands);
            }
            "\"" => {
                cursor.next_line();
                text.push_str(cursor.separator());
                collect_text(&mut text, encoding, operands.get(2..).unwrap_or(&[]));
            }
            _ => {}
        }
    }

    Ok(text)
}
