//! Face configuration: layout metrics and colours.
//!
//! Every positional constant the renderer needs lives in `LayoutMetrics`,
//! once for round screens and once for rectangular ones. The whole
//! `FaceConfig` serializes to/from TOML; missing values fall back to the
//! compiled defaults.

use serde::de::Error as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::canvas::Rgba;

/// Screen shape reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceShape {
    Round,
    #[default]
    Rectangular,
}

// ---------------------------------------------------------------------------
// FaceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    #[serde(deserialize_with = "round_metrics")]
    pub round: LayoutMetrics,
    #[serde(deserialize_with = "rectangular_metrics")]
    pub rectangular: LayoutMetrics,
    pub colors: ColorTokens,
}

/// Pixel positions and sizes for one screen shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutMetrics {
    /// Baselines.
    pub time_y_offset: f64,
    pub date_y_offset: f64,
    pub divider_y_offset: f64,
    pub temp_y_offset: f64,
    /// The divider spans `center ± divider_half_length`.
    pub divider_half_length: f64,
    pub icon_size: u32,
    /// Gap between the icon and the temperature pair.
    pub icon_spacing: f64,
    pub time_text_size: f64,
    pub date_text_size: f64,
    pub temp_text_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorTokens {
    #[serde(deserialize_with = "background_color")]
    pub background: ColorToken,
    /// Background after an odd number of taps.
    #[serde(deserialize_with = "background_alt_color")]
    pub background_alt: ColorToken,
    #[serde(deserialize_with = "primary_text_color")]
    pub primary_text: ColorToken,
    #[serde(deserialize_with = "secondary_text_color")]
    pub secondary_text: ColorToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorToken {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            round: LayoutMetrics::round(),
            rectangular: LayoutMetrics::rectangular(),
            colors: ColorTokens::default(),
        }
    }
}

impl LayoutMetrics {
    pub fn rectangular() -> Self {
        Self {
            time_y_offset: 100.0,
            date_y_offset: 130.0,
            divider_y_offset: 155.0,
            temp_y_offset: 195.0,
            divider_half_length: 30.0,
            icon_size: 40,
            icon_spacing: 10.0,
            time_text_size: 48.0,
            date_text_size: 18.0,
            temp_text_size: 28.0,
        }
    }

    pub fn round() -> Self {
        Self {
            time_y_offset: 110.0,
            date_y_offset: 140.0,
            divider_y_offset: 165.0,
            temp_y_offset: 205.0,
            divider_half_length: 30.0,
            icon_size: 48,
            icon_spacing: 10.0,
            time_text_size: 54.0,
            date_text_size: 20.0,
            temp_text_size: 32.0,
        }
    }
}

impl Default for ColorTokens {
    fn default() -> Self {
        Self {
            background: ColorToken::rgb8(3, 169, 244),
            background_alt: ColorToken::rgb8(2, 119, 189),
            primary_text: ColorToken::rgb8(255, 255, 255),
            secondary_text: ColorToken::rgb8(179, 229, 252),
        }
    }
}

impl Default for ColorToken {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 1.0,
            b: 1.0,
        }
    }
}

// A partial table only overrides the keys it names; the rest come from that
// table's own defaults (per shape for metrics, per token for colours).
fn round_metrics<'de, D: Deserializer<'de>>(d: D) -> Result<LayoutMetrics, D::Error> {
    overlay(LayoutMetrics::round(), d)
}

fn rectangular_metrics<'de, D: Deserializer<'de>>(d: D) -> Result<LayoutMetrics, D::Error> {
    overlay(LayoutMetrics::rectangular(), d)
}

fn background_color<'de, D: Deserializer<'de>>(d: D) -> Result<ColorToken, D::Error> {
    overlay(ColorTokens::default().background, d)
}

fn background_alt_color<'de, D: Deserializer<'de>>(d: D) -> Result<ColorToken, D::Error> {
    overlay(ColorTokens::default().background_alt, d)
}

fn primary_text_color<'de, D: Deserializer<'de>>(d: D) -> Result<ColorToken, D::Error> {
    overlay(ColorTokens::default().primary_text, d)
}

fn secondary_text_color<'de, D: Deserializer<'de>>(d: D) -> Result<ColorToken, D::Error> {
    overlay(ColorTokens::default().secondary_text, d)
}

fn overlay<'de, D, T>(base: T, d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Serialize + DeserializeOwned,
{
    let overrides = toml::Table::deserialize(d)?;
    let mut merged = toml::Value::try_from(base).map_err(D::Error::custom)?;
    if let Some(table) = merged.as_table_mut() {
        table.extend(overrides);
    }
    merged.try_into().map_err(D::Error::custom)
}

// ---------------------------------------------------------------------------
// Helper methods
// ---------------------------------------------------------------------------

impl ColorToken {
    pub fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: f32::from(r) / 255.0,
            g: f32::from(g) / 255.0,
            b: f32::from(b) / 255.0,
        }
    }

    pub fn to_rgba(self) -> Rgba {
        Rgba::new(self.r, self.g, self.b, 1.0)
    }
}

impl FaceConfig {
    pub fn layout_for(&self, shape: SurfaceShape) -> &LayoutMetrics {
        match shape {
            SurfaceShape::Round => &self.round,
            SurfaceShape::Rectangular => &self.rectangular,
        }
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialize from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_select_their_own_metrics() {
        let config = FaceConfig::default();
        assert_eq!(config.layout_for(SurfaceShape::Round).icon_size, 48);
        assert_eq!(config.layout_for(SurfaceShape::Rectangular).icon_size, 40);
        assert!(
            (config.layout_for(SurfaceShape::Round).time_text_size - 54.0).abs() < f64::EPSILON
        );
    }

    #[test]
    fn config_toml_roundtrip() {
        let original = FaceConfig::default();
        let parsed = FaceConfig::from_toml(&original.to_toml()).expect("roundtrip parse failed");
        assert_eq!(parsed, original);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let partial = r#"
[round]
icon_size = 64

[colors.background]
r = 0.0
g = 0.0
b = 0.5
"#;
        let config = FaceConfig::from_toml(partial).expect("partial parse failed");
        assert_eq!(config.round.icon_size, 64);
        assert!((config.round.temp_y_offset - 205.0).abs() < f64::EPSILON);
        assert_eq!(config.rectangular, LayoutMetrics::rectangular());
        assert!((config.colors.background.b - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.colors.primary_text, ColorToken::rgb8(255, 255, 255));
    }

    #[test]
    fn partial_colour_keeps_its_own_default_channels() {
        let partial = r#"
[rectangular]
icon_size = 36

[colors.background]
b = 0.5

[colors.secondary_text]
r = 1
"#;
        let config = FaceConfig::from_toml(partial).expect("partial colours parse");
        let defaults = ColorTokens::default();
        assert_eq!(config.rectangular.icon_size, 36);
        assert!((config.colors.background.b - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.colors.background.r, defaults.background.r);
        assert_eq!(config.colors.background.g, defaults.background.g);
        assert!((config.colors.secondary_text.r - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.colors.secondary_text.g, defaults.secondary_text.g);
        assert_eq!(config.colors.background_alt, defaults.background_alt);
        assert_eq!(config.colors.primary_text, defaults.primary_text);
    }

    #[test]
    fn colour_with_a_non_number_is_rejected() {
        assert!(FaceConfig::from_toml("[colors.background]\nr = \"red\"\n").is_err());
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(FaceConfig::from_toml("this is not [[ valid toml").is_err());
    }
}
