//! [`Canvas`] on a vello scene.
//!
//! Text uses a system font through skrifa when one is available, and a 5x7
//! bitmap font otherwise. With anti-aliasing off, positions snap to whole
//! pixels and glyph outlines are hinted.

use vello::kurbo::{Affine, Line, Rect, Stroke};
use vello::peniko::{
    Blob, Color, Fill, FontData, ImageAlphaType, ImageBrush, ImageData, ImageFormat,
};
use vello::{Glyph, Scene};

use crate::canvas::{Canvas, Rgba, TextPaint};
use crate::icons::Bitmap;

const CHAR_W: f64 = 5.0;
const CHAR_H: f64 = 7.0;
const CHAR_GAP: f64 = 1.0;
/// Bitmap-font cell height as a fraction of the font size.
const CELL_SCALE: f64 = 0.7;

pub struct VelloCanvas<'a> {
    scene: &'a mut Scene,
    font: Option<&'a FontData>,
    width: f64,
    height: f64,
}

impl<'a> VelloCanvas<'a> {
    pub fn new(scene: &'a mut Scene, font: Option<&'a FontData>, width: f64, height: f64) -> Self {
        Self {
            scene,
            font,
            width,
            height,
        }
    }
}

fn color(c: Rgba) -> Color {
    Color::new(c.to_array())
}

fn snap(v: f64, anti_alias: bool) -> f64 {
    if anti_alias { v } else { v.round() }
}

impl Canvas for VelloCanvas<'_> {
    fn clear(&mut self, c: Rgba) {
        let rect = Rect::new(0.0, 0.0, self.width, self.height);
        self.scene
            .fill(Fill::NonZero, Affine::IDENTITY, color(c), None, &rect);
    }

    fn draw_text(&mut self, text: &str, x: f64, baseline: f64, paint: &TextPaint) {
        let x = snap(x, paint.anti_alias);
        let baseline = snap(baseline, paint.anti_alias);
        let brush = color(paint.color);

        if let Some(font) = self.font {
            let glyphs = layout_line(text, font, paint.size as f32, x, baseline, paint.anti_alias);
            if !glyphs.is_empty() {
                self.scene
                    .draw_glyphs(font)
                    .font_size(paint.size as f32)
                    .hint(!paint.anti_alias)
                    .brush(&brush)
                    .draw(Fill::NonZero, glyphs.into_iter());
            }
            return;
        }

        let (cw, ch, gap) = cell_metrics(paint.size);
        for (i, c) in text.chars().enumerate() {
            if c == ' ' {
                continue;
            }
            let cx = snap(x + i as f64 * (cw + gap), paint.anti_alias);
            draw_bitmap_char(self.scene, cx, baseline - ch, cw, ch, c, brush);
        }
    }

    fn measure_text(&self, text: &str, paint: &TextPaint) -> f64 {
        match self.font {
            Some(font) => measure_line(text, font, paint.size as f32),
            None => {
                let (cw, _, gap) = cell_metrics(paint.size);
                text.chars().count() as f64 * (cw + gap)
            }
        }
    }

    fn draw_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, paint: &TextPaint) {
        let (width, offset) = if paint.anti_alias { (1.5, 0.0) } else { (1.0, 0.5) };
        let line = Line::new(
            (snap(x0, paint.anti_alias), snap(y0, paint.anti_alias) + offset),
            (snap(x1, paint.anti_alias), snap(y1, paint.anti_alias) + offset),
        );
        self.scene.stroke(
            &Stroke::new(width),
            Affine::IDENTITY,
            color(paint.color),
            None,
            &line,
        );
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, x: f64, y: f64) {
        let brush = ImageBrush::new(image_data(bitmap));
        self.scene
            .draw_image(&brush, Affine::translate((x.round(), y.round())));
    }
}

/// Bitmaps are already at their final size, so they blit 1:1.
fn image_data(bitmap: &Bitmap) -> ImageData {
    ImageData {
        data: Blob::from(bitmap.premultiplied_rgba().to_vec()),
        format: ImageFormat::Rgba8,
        alpha_type: ImageAlphaType::AlphaPremultiplied,
        width: bitmap.width(),
        height: bitmap.height(),
    }
}

// ---------------------------------------------------------------------------
// Font text
// ---------------------------------------------------------------------------

/// Position the glyphs of a single line starting at `(x, baseline)`.
fn layout_line(
    text: &str,
    font_data: &FontData,
    font_size: f32,
    x: f64,
    baseline: f64,
    anti_alias: bool,
) -> Vec<Glyph> {
    let Ok(font_ref) = skrifa::FontRef::from_index(font_data.data.as_ref(), font_data.index) else {
        return vec![];
    };

    use skrifa::MetadataProvider;
    let charmap = font_ref.charmap();
    let glyph_metrics = font_ref.glyph_metrics(
        skrifa::instance::Size::new(font_size),
        skrifa::instance::LocationRef::default(),
    );

    let mut glyphs = Vec::with_capacity(text.len());
    let mut pen = x;
    for ch in text.chars() {
        let gid = charmap.map(ch).unwrap_or_default();
        glyphs.push(Glyph {
            id: gid.to_u32(),
            x: snap(pen, anti_alias) as f32,
            y: baseline as f32,
        });
        pen += glyph_metrics
            .advance_width(gid)
            .unwrap_or(font_size * 0.5) as f64;
    }
    glyphs
}

fn measure_line(text: &str, font_data: &FontData, font_size: f32) -> f64 {
    let Ok(font_ref) = skrifa::FontRef::from_index(font_data.data.as_ref(), font_data.index) else {
        return 0.0;
    };

    use skrifa::MetadataProvider;
    let charmap = font_ref.charmap();
    let glyph_metrics = font_ref.glyph_metrics(
        skrifa::instance::Size::new(font_size),
        skrifa::instance::LocationRef::default(),
    );
    text.chars()
        .map(|ch| {
            let gid = charmap.map(ch).unwrap_or_default();
            glyph_metrics
                .advance_width(gid)
                .unwrap_or(font_size * 0.5) as f64
        })
        .sum()
}

/// Try the face's font stack in the usual macOS and Linux font directories.
pub fn load_face_font() -> Option<FontData> {
    let dirs = [
        "/System/Library/Fonts/",
        "/System/Library/Fonts/Supplemental/",
        "/Library/Fonts/",
        "/usr/share/fonts/truetype/dejavu/",
        "/usr/share/fonts/truetype/roboto/",
        "/usr/share/fonts/truetype/",
        "/usr/share/fonts/opentype/",
    ];
    let names = [
        "Roboto-Light",
        "Roboto-Regular",
        "Helvetica",
        "Arial",
        "DejaVuSans",
        "LiberationSans-Regular",
    ];
    let extensions = ["ttf", "otf", "ttc"];

    for name in names {
        for dir in dirs {
            for ext in extensions {
                let path = format!("{dir}{name}.{ext}");
                if let Ok(data) = std::fs::read(&path) {
                    return Some(FontData::new(data.into(), 0));
                }
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Bitmap font fallback
// ---------------------------------------------------------------------------

fn cell_metrics(size: f64) -> (f64, f64, f64) {
    let scale = size * CELL_SCALE / CHAR_H;
    (CHAR_W * scale, CHAR_H * scale, CHAR_GAP * scale)
}

fn draw_bitmap_char(scene: &mut Scene, x: f64, y: f64, w: f64, h: f64, ch: char, brush: Color) {
    let rows = char_rows(ch);
    let pixel_w = w / CHAR_W;
    let pixel_h = h / CHAR_H;

    for (row, &bits) in rows.iter().enumerate() {
        for col in 0..5 {
            if (bits >> (4 - col)) & 1 == 1 {
                let px = x + col as f64 * pixel_w;
                let py = y + row as f64 * pixel_h;
                let rect = Rect::new(px, py, px + pixel_w, py + pixel_h);
                scene.fill(Fill::NonZero, Affine::IDENTITY, brush, None, &rect);
            }
        }
    }
}

/// 5x7 rows for the characters a face can show, MSB leftmost. Dates are
/// uppercase so lowercase letters are folded.
fn char_rows(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01110],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01110, 0b10001, 0b10000, 0b01110, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ',' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00110, 0b00100, 0b01000],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '°' => [0b01100, 0b10010, 0b10010, 0b01100, 0b00000, 0b00000, 0b00000],
        _ => [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
