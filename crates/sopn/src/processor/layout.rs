//! Positioned text and ruling lines decoded from a page content stream.
//!
//! Only the operators needed to place text and straight lines are
//! interpreted. Glyph widths are estimated from the font size, which is
//! accurate enough to tell table columns apart.

use lopdf::content::{Content, Operation};
use lopdf::Object;

use crate::error::ExtractionError;

/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH_RATIO: f32 = 0.5;

/// TJ adjustments below this (in thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Path segments shorter than this are ignored as ruling lines.
const MIN_RULE_LENGTH: f32 = 2.0;

/// Maximum slope, in points, for a segment to count as horizontal/vertical.
const AXIS_TOLERANCE: f32 = 1.0;

/// A run of text drawn by one text-showing operator.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    /// Left edge in user space.
    pub x: f32,
    /// Baseline in user space (grows upwards).
    pub y: f32,
    pub width: f32,
    pub font_size: f32,
}

impl TextFragment {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Vertical middle of the glyphs, used to place text in grid cells.
    pub fn mid_y(&self) -> f32 {
        self.y + self.font_size * 0.3
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    Horizontal { y: f32, x0: f32, x1: f32 },
    Vertical { x: f32, y0: f32, y1: f32 },
}

#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub fragments: Vec<TextFragment>,
    pub rules: Vec<Rule>,
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

#[derive(Debug, Clone)]
struct TextState {
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
        }
    }
}

struct Interpreter {
    ctm: Matrix,
    stack: Vec<(Matrix, TextState)>,
    tm: Matrix,
    tlm: Matrix,
    text: TextState,
    path: Vec<((f32, f32), (f32, f32))>,
    current: Option<(f32, f32)>,
    subpath_start: Option<(f32, f32)>,
    layout: PageLayout,
}

impl Interpreter {
    fn new() -> Self {
        Self {
            ctm: IDENTITY,
            stack: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            text: TextState::default(),
            path: Vec::new(),
            current: None,
            subpath_start: None,
            layout: PageLayout::default(),
        }
    }

    fn run(&mut self, op: &Operation) {
        let nums = numbers(&op.operands);
        match op.operator.as_str() {
            "q" => self.stack.push((self.ctm, self.text.clone())),
            "Q" => {
                if let Some((ctm, text)) = self.stack.pop() {
                    self.ctm = ctm;
                    self.text = text;
                }
            }
            "cm" if nums.len() == 6 => {
                let m = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                self.ctm = multiply(&m, &self.ctm);
            }
            "BT" => {
                self.tm = IDENTITY;
                self.tlm = IDENTITY;
            }
            "Tf" => {
                if let Some(size) = op.operands.get(1).and_then(|o| o.as_float().ok()) {
                    self.text.font_size = size;
                }
            }
            "TL" if nums.len() == 1 => self.text.leading = nums[0],
            "Tc" if nums.len() == 1 => self.text.char_spacing = nums[0],
            "Tw" if nums.len() == 1 => self.text.word_spacing = nums[0],
            "Tz" if nums.len() == 1 => self.text.horizontal_scale = nums[0] / 100.0,
            "Td" if nums.len() == 2 => self.move_text(nums[0], nums[1]),
            "TD" if nums.len() == 2 => {
                self.text.leading = -nums[1];
                self.move_text(nums[0], nums[1]);
            }
            "Tm" if nums.len() == 6 => {
                self.tm = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                self.tlm = self.tm;
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(operand) = op.operands.first() {
                    self.show(operand);
                }
            }
            "TJ" => {
                if let Some(operand) = op.operands.first() {
                    self.show(operand);
                }
            }
            "'" => {
                self.next_line();
                if let Some(operand) = op.operands.first() {
                    self.show(operand);
                }
            }
            "\"" => {
                if nums.len() >= 2 {
                    self.text.word_spacing = nums[0];
                    self.text.char_spacing = nums[1];
                }
                self.next_line();
                if let Some(operand) = op.operands.get(2) {
                    self.show(operand);
                }
            }
            "m" if nums.len() == 2 => {
                let p = apply(&self.ctm, nums[0], nums[1]);
                self.current = Some(p);
                self.subpath_start = Some(p);
            }
            "l" if nums.len() == 2 => {
                let p = apply(&self.ctm, nums[0], nums[1]);
                if let Some(from) = self.current {
                    self.path.push((from, p));
                }
                self.current = Some(p);
            }
            "c" if nums.len() == 6 => self.current = Some(apply(&self.ctm, nums[4], nums[5])),
            "v" | "y" if nums.len() == 4 => {
                self.current = Some(apply(&self.ctm, nums[2], nums[3]))
            }
            "h" => {
                if let (Some(from), Some(start)) = (self.current, self.subpath_start) {
                    self.path.push((from, start));
                    self.current = Some(start);
                }
            }
            "re" if nums.len() == 4 => {
                let (x, y, w, h) = (nums[0], nums[1], nums[2], nums[3]);
                let corners = [
                    apply(&self.ctm, x, y),
                    apply(&self.ctm, x + w, y),
                    apply(&self.ctm, x + w, y + h),
                    apply(&self.ctm, x, y + h),
                ];
                for i in 0..4 {
                    self.path.push((corners[i], corners[(i + 1) % 4]));
                }
                self.current = Some(corners[0]);
                self.subpath_start = Some(corners[0]);
            }
            "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => self.paint(),
            "n" => self.clear_path(),
            _ => {}
        }
    }

    fn move_text(&mut self, tx: f32, ty: f32) {
        self.tlm = multiply(&translate(tx, ty), &self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_text(0.0, -self.text.leading);
    }

    fn advance(&self, text: &str) -> f32 {
        let chars = text.chars().count() as f32;
        let spaces = text.chars().filter(|c| *c == ' ').count() as f32;
        (chars * self.text.font_size * GLYPH_WIDTH_RATIO
            + chars * self.text.char_spacing
            + spaces * self.text.word_spacing)
            * self.text.horizontal_scale
    }

    fn show(&mut self, operand: &Object) {
        let render = multiply(&self.tm, &self.ctm);
        let (x, y) = (render[4], render[5]);
        let scale_x = (render[0] * render[0] + render[1] * render[1]).sqrt();
        let scale_y = (render[2] * render[2] + render[3] * render[3]).sqrt();

        let mut text = String::new();
        let mut advance = 0.0f32;

        match operand {
            Object::Array(items) => {
                for item in items {
                    match item {
                        Object::String(bytes, _) => {
                            let piece = decode_string(bytes);
                            advance += self.advance(&piece);
                            text.push_str(&piece);
                        }
                        other => {
                            if let Ok(adjust) = other.as_float() {
                                advance -= adjust / 1000.0
                                    * self.text.font_size
                                    * self.text.horizontal_scale;
                                if adjust < TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                                    text.push(' ');
                                }
                            }
                        }
                    }
                }
            }
            Object::String(bytes, _) => {
                text = decode_string(bytes);
                advance = self.advance(&text);
            }
            _ => return,
        }

        self.tm = multiply(&translate(advance, 0.0), &self.tm);

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        self.layout.fragments.push(TextFragment {
            text: trimmed.to_string(),
            x,
            y,
            width: advance * scale_x,
            font_size: self.text.font_size * scale_y,
        });
    }

    fn paint(&mut self) {
        for &((x0, y0), (x1, y1)) in &self.path {
            let dx = (x1 - x0).abs();
            let dy = (y1 - y0).abs();
            if dy <= AXIS_TOLERANCE && dx >= MIN_RULE_LENGTH {
                self.layout.rules.push(Rule::Horizontal {
                    y: (y0 + y1) / 2.0,
                    x0: x0.min(x1),
                    x1: x0.max(x1),
                });
            } else if dx <= AXIS_TOLERANCE && dy >= MIN_RULE_LENGTH {
                self.layout.rules.push(Rule::Vertical {
                    x: (x0 + x1) / 2.0,
                    y0: y0.min(y1),
                    y1: y0.max(y1),
                });
            }
        }
        self.clear_path();
    }

    fn clear_path(&mut self) {
        self.path.clear();
        self.current = None;
        self.subpath_start = None;
    }
}

fn numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(|o| o.as_float().ok()).collect()
}

/// Decodes a PDF string operand: UTF-16BE with BOM, UTF-8, then Latin-1.
pub fn decode_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter(|chunk| chunk.len() == 2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&units) {
            return s;
        }
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes
        .iter()
        .map(|&b| match b {
            0x92 => '\'',
            0x96 => '\u{2013}',
            0x97 => '\u{2014}',
            b => b as char,
        })
        .collect()
}

impl PageLayout {
    /// Interprets a decompressed content stream.
    pub fn decode(content: &[u8]) -> Result<Self, ExtractionError> {
        let content =
            Content::decode(content).map_err(|e| ExtractionError::MalformedPdf(e.to_string()))?;
        let mut interpreter = Interpreter::new();
        for op in &content.operations {
            interpreter.run(op);
        }
        Ok(interpreter.layout)
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Reading-order text: top to bottom, left to right, one line per
    /// baseline.
    pub fn text(&self) -> String {
        group_lines(&self.fragments)
            .iter()
            .map(|line| {
                line.iter()
                    .map(|f| f.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Groups fragments sharing a baseline, top line first, each line sorted
/// left to right.
pub fn group_lines(fragments: &[TextFragment]) -> Vec<Vec<&TextFragment>> {
    let mut sorted: Vec<&TextFragment> = fragments.iter().collect();
    sorted.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Vec<&TextFragment>> = Vec::new();
    for fragment in sorted {
        let tolerance = (fragment.font_size * 0.3).max(1.0);
        match lines.last_mut() {
            Some(line) if (line[0].y - fragment.y).abs() <= tolerance => line.push(fragment),
            _ => lines.push(vec![fragment]),
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    lines
}
