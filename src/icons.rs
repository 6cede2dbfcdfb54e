//! Condition icons.
//!
//! Icon artwork is an opaque lookup: the engine asks an [`IconSource`] for the
//! bitmap of a [`ConditionIcon`] and pre-scales it to the layout's icon size
//! once, when the update arrives, so frames only blit.

use std::fmt;

use tiny_skia::{
    FillRule, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Transform,
};

use crate::weather::ConditionIcon;

/// Premultiplied RGBA8 raster backed by a `tiny_skia::Pixmap`.
#[derive(Clone)]
pub struct Bitmap {
    pixmap: Pixmap,
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmap({}x{})", self.width(), self.height())
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self.pixmap.data() == other.pixmap.data()
    }
}

impl Eq for Bitmap {}

impl Bitmap {
    /// A fully transparent bitmap; `None` for a zero dimension.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Pixmap::new(width, height).map(Self::from_pixmap)
    }

    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self { pixmap }
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Straight-alpha RGBA at `(x, y)`, or `None` outside the bitmap.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        // Pixmap::pixel only checks the flat index.
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    /// Raw premultiplied RGBA8 rows, ready for upload.
    pub fn premultiplied_rgba(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Resample to `width` × `height`; `None` for a zero dimension.
    pub fn scaled(&self, width: u32, height: u32) -> Option<Bitmap> {
        let mut out = Pixmap::new(width, height)?;
        let sx = width as f32 / self.width() as f32;
        let sy = height as f32 / self.height() as f32;
        let paint = PixmapPaint {
            quality: FilterQuality::Bicubic,
            ..PixmapPaint::default()
        };
        out.draw_pixmap(
            0,
            0,
            self.pixmap.as_ref(),
            &paint,
            Transform::from_scale(sx, sy),
            None,
        );
        Some(Self::from_pixmap(out))
    }
}

/// Lookup of icon artwork.
pub trait IconSource: Send + Sync {
    fn bitmap(&self, icon: ConditionIcon) -> Option<Bitmap>;
}

// ---------------------------------------------------------------------------
// Built-in artwork
// ---------------------------------------------------------------------------

const SUN: [u8; 4] = [255, 202, 40, 255];
const CLOUD: [u8; 4] = [224, 224, 224, 255];
const DARK_CLOUD: [u8; 4] = [144, 164, 174, 255];
const DROP: [u8; 4] = [79, 195, 247, 255];
const FLAKE: [u8; 4] = [255, 255, 255, 255];
const BOLT: [u8; 4] = [255, 235, 59, 255];

/// Icons drawn from simple shapes at `size` × `size`.
#[derive(Debug, Clone, Copy)]
pub struct ProceduralIcons {
    size: u32,
}

impl Default for ProceduralIcons {
    fn default() -> Self {
        Self { size: 96 }
    }
}

impl ProceduralIcons {
    pub fn new(size: u32) -> Self {
        Self { size: size.max(8) }
    }
}

impl IconSource for ProceduralIcons {
    fn bitmap(&self, icon: ConditionIcon) -> Option<Bitmap> {
        let s = self.size as f32;
        let mut pixmap = Pixmap::new(self.size, self.size)?;
        let pm = &mut pixmap;
        match icon {
            ConditionIcon::Clear => {
                fill_disc(pm, s * 0.5, s * 0.5, s * 0.3, SUN);
            }
            ConditionIcon::Storm => {
                fill_cloud(pm, s, DARK_CLOUD);
                fill_polygon(
                    pm,
                    &[
                        (s * 0.55, s * 0.6),
                        (s * 0.38, s * 0.85),
                        (s * 0.5, s * 0.85),
                    ],
                    BOLT,
                );
                fill_polygon(
                    pm,
                    &[
                        (s * 0.5, s * 0.78),
                        (s * 0.62, s * 0.78),
                        (s * 0.42, s * 0.98),
                    ],
                    BOLT,
                );
            }
            ConditionIcon::LightRain => {
                fill_cloud(pm, s, CLOUD);
                for i in 0..2 {
                    let x = s * (0.38 + 0.24 * i as f32);
                    fill_rect(pm, x, s * 0.68, s * 0.04, s * 0.14, DROP);
                }
            }
            ConditionIcon::Rain => {
                fill_cloud(pm, s, DARK_CLOUD);
                for i in 0..4 {
                    let x = s * (0.26 + 0.16 * i as f32);
                    fill_rect(pm, x, s * 0.66, s * 0.05, s * 0.24, DROP);
                }
            }
            ConditionIcon::Snow => {
                fill_cloud(pm, s, CLOUD);
                for i in 0..3 {
                    let x = s * (0.3 + 0.2 * i as f32);
                    fill_disc(pm, x, s * 0.76, s * 0.05, FLAKE);
                    fill_disc(pm, x + s * 0.1, s * 0.9, s * 0.05, FLAKE);
                }
            }
        }
        Some(Bitmap::from_pixmap(pixmap))
    }
}

fn solid(color: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

fn fill_cloud(pixmap: &mut Pixmap, s: f32, color: [u8; 4]) {
    fill_disc(pixmap, s * 0.35, s * 0.45, s * 0.16, color);
    fill_disc(pixmap, s * 0.55, s * 0.38, s * 0.2, color);
    fill_disc(pixmap, s * 0.72, s * 0.48, s * 0.13, color);
    fill_rect(pixmap, s * 0.35, s * 0.45, s * 0.37, s * 0.16, color);
}

fn fill_disc(pixmap: &mut Pixmap, cx: f32, cy: f32, r: f32, color: [u8; 4]) {
    if let Some(path) = PathBuilder::from_circle(cx, cy, r) {
        pixmap.fill_path(
            &path,
            &solid(color),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}

fn fill_rect(pixmap: &mut Pixmap, x: f32, y: f32, w: f32, h: f32, color: [u8; 4]) {
    if let Some(rect) = Rect::from_xywh(x, y, w, h) {
        pixmap.fill_rect(rect, &solid(color), Transform::identity(), None);
    }
}

fn fill_polygon(pixmap: &mut Pixmap, points: &[(f32, f32)], color: [u8; 4]) {
    let Some((&(x0, y0), rest)) = points.split_first() else {
        return;
    };
    let mut pb = PathBuilder::new();
    pb.move_to(x0, y0);
    for &(x, y) in rest {
        pb.line_to(x, y);
    }
    pb.close();
    if let Some(path) = pb.finish() {
        pixmap.fill_path(
            &path,
            &solid(color),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(bmp: &Bitmap) -> usize {
        bmp.pixmap.pixels().iter().filter(|p| p.alpha() > 0).count()
    }

    #[test]
    fn scaled_has_requested_dimensions() {
        let src = ProceduralIcons::new(64)
            .bitmap(ConditionIcon::Rain)
            .expect("rain icon");
        let dst = src.scaled(40, 40).expect("scaled");
        assert_eq!((dst.width(), dst.height()), (40, 40));
        assert!(covered(&dst) > 0);
        assert!(src.scaled(0, 40).is_none());
    }

    #[test]
    fn scaling_a_solid_bitmap_keeps_its_colour() {
        let mut pixmap = Pixmap::new(4, 4).expect("pixmap");
        pixmap.fill(tiny_skia::Color::from_rgba8(10, 20, 30, 255));
        let dst = Bitmap::from_pixmap(pixmap).scaled(8, 8).expect("scaled");
        let [r, g, b, a] = dst.pixel(4, 4).expect("centre");
        assert_eq!(a, 255);
        assert!(r.abs_diff(10) <= 1 && g.abs_diff(20) <= 1 && b.abs_diff(30) <= 1);
    }

    #[test]
    fn every_condition_has_artwork() {
        let icons = ProceduralIcons::default();
        for icon in [
            ConditionIcon::Storm,
            ConditionIcon::LightRain,
            ConditionIcon::Rain,
            ConditionIcon::Snow,
            ConditionIcon::Clear,
        ] {
            let bmp = icons.bitmap(icon).expect("artwork");
            assert_eq!(bmp.width(), 96);
            assert!(covered(&bmp) > 0, "{icon:?} is blank");
        }
    }

    #[test]
    fn clear_icon_centre_is_sun_coloured() {
        let bmp = ProceduralIcons::new(32)
            .bitmap(ConditionIcon::Clear)
            .expect("clear icon");
        assert_eq!(bmp.pixel(16, 16), Some(SUN));
        assert_eq!(bmp.pixel(0, 0).map(|p| p[3]), Some(0));
    }

    #[test]
    fn disc_edges_are_anti_aliased() {
        let bmp = ProceduralIcons::new(64)
            .bitmap(ConditionIcon::Clear)
            .expect("clear icon");
        let partial = bmp
            .pixmap
            .pixels()
            .iter()
            .filter(|p| p.alpha() > 0 && p.alpha() < 255)
            .count();
        assert!(partial > 0);
    }

    #[test]
    fn pixel_outside_the_bitmap_is_none() {
        let bmp = Bitmap::new(4, 3).expect("bitmap");
        assert_eq!(bmp.pixel(3, 2), Some([0, 0, 0, 0]));
        assert_eq!(bmp.pixel(4, 0), None);
        assert_eq!(bmp.pixel(0, 3), None);
        assert_eq!(bmp.pixel(u32::MAX, u32::MAX), None);
        assert!(Bitmap::new(0, 3).is_none());
    }
}
