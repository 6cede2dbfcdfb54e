//! Display state shared between the sync bridge and the renderer.
//!
//! Owned by the engine and mutated only on the surface thread. Nothing here
//! outlives the display session.

use crate::icons::{Bitmap, IconSource};
use crate::weather::{ConditionIcon, WeatherUpdate, format_temperature};

/// High and low temperature strings; they only ever travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Temperatures {
    pub high: String,
    pub low: String,
}

/// A condition icon already scaled to the render size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedIcon {
    pub kind: ConditionIcon,
    pub bitmap: Bitmap,
}

/// Everything derived from one weather update, applied in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherSnapshot {
    pub temperatures: Temperatures,
    pub icon: Option<RenderedIcon>,
}

impl WeatherSnapshot {
    pub fn derive(update: &WeatherUpdate, icons: &dyn IconSource, icon_size: u32) -> Self {
        let icon = update.icon().and_then(|kind| {
            icons
                .bitmap(kind)
                .and_then(|bmp| bmp.scaled(icon_size, icon_size))
                .map(|bitmap| RenderedIcon { kind, bitmap })
        });
        Self {
            temperatures: Temperatures {
                high: format_temperature(update.high),
                low: format_temperature(update.low),
            },
            icon,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    /// `None` until the first update arrives.
    pub temperatures: Option<Temperatures>,
    pub icon: Option<RenderedIcon>,
    pub ambient: bool,
    /// Set once by capability negotiation.
    pub low_bit_ambient: bool,
    /// Flips on every completed tap; selects the background colour.
    pub tap_toggle: bool,
}

impl DisplayState {
    pub fn apply_weather(&mut self, snapshot: WeatherSnapshot) {
        self.temperatures = Some(snapshot.temperatures);
        self.icon = snapshot.icon;
    }

    pub fn high_temp(&self) -> Option<&str> {
        self.temperatures.as_ref().map(|t| t.high.as_str())
    }

    pub fn low_temp(&self) -> Option<&str> {
        self.temperatures.as_ref().map(|t| t.low.as_str())
    }

    pub fn icon_kind(&self) -> Option<ConditionIcon> {
        self.icon.as_ref().map(|i| i.kind)
    }

    /// Low-bit displays drop anti-aliasing while ambient.
    pub fn anti_alias(&self) -> bool {
        !(self.low_bit_ambient && self.ambient)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icons::ProceduralIcons;

    fn update(high: i32, low: i32, code: i32) -> WeatherUpdate {
        WeatherUpdate {
            high,
            low,
            condition_code: code,
        }
    }

    #[test]
    fn snapshot_scales_icon_to_render_size() {
        let snap = WeatherSnapshot::derive(&update(75, 58, 802), &ProceduralIcons::default(), 40);
        let icon = snap.icon.expect("clear icon");
        assert_eq!(icon.kind, ConditionIcon::Clear);
        assert_eq!((icon.bitmap.width(), icon.bitmap.height()), (40, 40));
        assert_eq!(snap.temperatures.high, "75°");
        assert_eq!(snap.temperatures.low, "58°");
    }

    #[test]
    fn unknown_code_clears_previous_icon_but_keeps_temperatures_paired() {
        let icons = ProceduralIcons::default();
        let mut state = DisplayState::default();
        state.apply_weather(WeatherSnapshot::derive(&update(75, 58, 802), &icons, 32));
        state.apply_weather(WeatherSnapshot::derive(&update(60, 41, 951), &icons, 32));
        assert_eq!(state.high_temp(), Some("60°"));
        assert_eq!(state.low_temp(), Some("41°"));
        assert_eq!(state.icon_kind(), None);
    }

    #[test]
    fn applying_the_same_update_twice_is_idempotent() {
        let icons = ProceduralIcons::default();
        let mut state = DisplayState::default();
        state.apply_weather(WeatherSnapshot::derive(&update(75, 58, 501), &icons, 32));
        let once = state.clone();
        state.apply_weather(WeatherSnapshot::derive(&update(75, 58, 501), &icons, 32));
        assert_eq!(state, once);
    }

    #[test]
    fn anti_alias_only_drops_for_low_bit_ambient() {
        let mut state = DisplayState::default();
        for (low_bit, ambient, expected) in [
            (false, false, true),
            (false, true, true),
            (true, false, true),
            (true, true, false),
        ] {
            state.low_bit_ambient = low_bit;
            state.ambient = ambient;
            assert_eq!(state.anti_alias(), expected, "low_bit={low_bit} ambient={ambient}");
        }
    }
}
