//! Drawing seam between the face renderer and a concrete surface.
//!
//! The renderer only talks to [`Canvas`]; `vello_canvas` backs it with a
//! vello scene and [`RecordingCanvas`] captures draw calls for inspection.

use crate::icons::Bitmap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Colour, size and edge treatment for text and strokes.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPaint {
    pub color: Rgba,
    pub size: f64,
    pub anti_alias: bool,
}

impl TextPaint {
    pub fn new(color: Rgba, size: f64) -> Self {
        Self {
            color,
            size,
            anti_alias: true,
        }
    }
}

pub trait Canvas {
    /// Fill the whole surface.
    fn clear(&mut self, color: Rgba);

    /// Draw `text` with its left edge at `x` and baseline at `baseline`.
    fn draw_text(&mut self, text: &str, x: f64, baseline: f64, paint: &TextPaint);

    /// Advance width of `text` in `paint`.
    fn measure_text(&self, text: &str, paint: &TextPaint) -> f64;

    fn draw_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, paint: &TextPaint);

    /// Blit a bitmap with its top-left corner at `(x, y)`, unscaled.
    fn draw_bitmap(&mut self, bitmap: &Bitmap, x: f64, y: f64);
}

// ---------------------------------------------------------------------------
// RecordingCanvas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear(Rgba),
    Text {
        text: String,
        x: f64,
        baseline: f64,
        paint: TextPaint,
    },
    Line {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        anti_alias: bool,
    },
    Bitmap {
        width: u32,
        height: u32,
        x: f64,
        y: f64,
    },
}

/// Canvas that records every call. Text is measured as a fixed fraction of
/// the paint size per character so layouts are predictable.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    pub ops: Vec<DrawOp>,
}

impl RecordingCanvas {
    pub const ADVANCE_PER_SIZE: f64 = 0.5;

    pub fn new() -> Self {
        Self::default()
    }

    /// All text draws, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn text_op(&self, needle: &str) -> Option<&DrawOp> {
        self.ops
            .iter()
            .find(|op| matches!(op, DrawOp::Text { text, .. } if text == needle))
    }

    pub fn background(&self) -> Option<Rgba> {
        self.ops.iter().find_map(|op| match op {
            DrawOp::Clear(c) => Some(*c),
            _ => None,
        })
    }

    pub fn bitmap_ops(&self) -> Vec<&DrawOp> {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Bitmap { .. }))
            .collect()
    }
}

impl Canvas for RecordingCanvas {
    fn clear(&mut self, color: Rgba) {
        self.ops.push(DrawOp::Clear(color));
    }

    fn draw_text(&mut self, text: &str, x: f64, baseline: f64, paint: &TextPaint) {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            x,
            baseline,
            paint: paint.clone(),
        });
    }

    fn measure_text(&self, text: &str, paint: &TextPaint) -> f64 {
        text.chars().count() as f64 * paint.size * Self::ADVANCE_PER_SIZE
    }

    fn draw_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, paint: &TextPaint) {
        self.ops.push(DrawOp::Line {
            x0,
            y0,
            x1,
            y1,
            anti_alias: paint.anti_alias,
        });
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, x: f64, y: f64) {
        self.ops.push(DrawOp::Bitmap {
            width: bitmap.width(),
            height: bitmap.height(),
            x,
            y,
        });
    }
}
