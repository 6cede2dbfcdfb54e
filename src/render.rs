//! The redraw procedure.
//!
//! `draw_face` is a pure function of the display state, the resolved style
//! and the local time. It never fails; missing data draws as empty text and a
//! missing icon is skipped.

use chrono::{NaiveDateTime, Timelike};

use crate::canvas::{Canvas, Rgba, TextPaint};
use crate::config::{FaceConfig, LayoutMetrics, SurfaceShape};
use crate::state::DisplayState;

/// Drawable area in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center_x(&self) -> f64 {
        self.width / 2.0
    }
}

// ---------------------------------------------------------------------------
// Style
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FacePaints {
    pub time: TextPaint,
    pub date: TextPaint,
    pub temp_high: TextPaint,
    pub temp_low: TextPaint,
}

impl FacePaints {
    pub fn set_anti_alias(&mut self, anti_alias: bool) {
        for paint in [
            &mut self.time,
            &mut self.date,
            &mut self.temp_high,
            &mut self.temp_low,
        ] {
            paint.anti_alias = anti_alias;
        }
    }
}

/// Layout metrics and paints resolved for one surface shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceStyle {
    pub shape: SurfaceShape,
    pub layout: LayoutMetrics,
    pub paints: FacePaints,
    pub background: Rgba,
    pub background_alt: Rgba,
}

impl FaceStyle {
    pub fn resolve(config: &FaceConfig, shape: SurfaceShape) -> Self {
        let layout = config.layout_for(shape).clone();
        let primary = config.colors.primary_text.to_rgba();
        let secondary = config.colors.secondary_text.to_rgba();
        let paints = FacePaints {
            time: TextPaint::new(primary, layout.time_text_size),
            date: TextPaint::new(secondary, layout.date_text_size),
            temp_high: TextPaint::new(primary, layout.temp_text_size),
            temp_low: TextPaint::new(secondary, layout.temp_text_size),
        };
        Self {
            shape,
            layout,
            paints,
            background: config.colors.background.to_rgba(),
            background_alt: config.colors.background_alt.to_rgba(),
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// `H:MM`, 24-hour, hour unpadded.
pub fn format_time(now: &NaiveDateTime) -> String {
    format!("{}:{:02}", now.hour(), now.minute())
}

/// `EEE, MMM d yyyy`, uppercased: `FRI, OCT 16 2026`.
pub fn format_date(now: &NaiveDateTime) -> String {
    now.format("%a, %b %-d %Y").to_string().to_uppercase()
}

// ---------------------------------------------------------------------------
// draw_face
// ---------------------------------------------------------------------------

pub fn draw_face(
    canvas: &mut dyn Canvas,
    bounds: Bounds,
    state: &DisplayState,
    style: &FaceStyle,
    now: NaiveDateTime,
) {
    let layout = &style.layout;
    let paints = &style.paints;
    let cx = bounds.center_x();

    let background = if state.ambient {
        Rgba::BLACK
    } else if state.tap_toggle {
        style.background_alt
    } else {
        style.background
    };
    canvas.clear(background);

    let time = format_time(&now);
    let time_w = canvas.measure_text(&time, &paints.time);
    canvas.draw_text(&time, cx - time_w / 2.0, layout.time_y_offset, &paints.time);

    let date = format_date(&now);
    let date_w = canvas.measure_text(&date, &paints.date);
    canvas.draw_text(&date, cx - date_w / 2.0, layout.date_y_offset, &paints.date);

    canvas.draw_line(
        cx - layout.divider_half_length,
        layout.divider_y_offset,
        cx + layout.divider_half_length,
        layout.divider_y_offset,
        &paints.time,
    );

    let high = state.high_temp().unwrap_or("");
    let low = state.low_temp().unwrap_or("");
    let high_w = canvas.measure_text(high, &paints.temp_high);
    let low_w = canvas.measure_text(low, &paints.temp_low);
    let temp_y = layout.temp_y_offset;

    if state.ambient {
        let left = cx - (high_w + low_w) / 2.0;
        canvas.draw_text(high, left, temp_y, &paints.temp_high);
        canvas.draw_text(low, left + high_w, temp_y, &paints.temp_low);
        return;
    }

    let icon_size = f64::from(layout.icon_size);
    let block_w = high_w + low_w + icon_size + layout.icon_spacing;
    let left = cx - block_w / 2.0;
    if let Some(icon) = &state.icon {
        let top = temp_y - paints.temp_high.size / 2.0 - icon_size / 2.0;
        canvas.draw_bitmap(&icon.bitmap, left, top);
    }
    let high_x = left + icon_size + layout.icon_spacing;
    canvas.draw_text(high, high_x, temp_y, &paints.temp_high);
    canvas.draw_text(low, high_x + high_w, temp_y, &paints.temp_low);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
