//! Weather payloads and the condition-code icon table.

use uuid::Uuid;

use crate::error::DecodeError;
use crate::protocol::{DataMap, HIGH_KEY, LOW_KEY, UUID_KEY, WEATHER_ID_KEY};

pub const DEGREE_SUFFIX: &str = "°";

/// Presentation icon for a weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionIcon {
    Storm,
    LightRain,
    Rain,
    Snow,
    Clear,
}

/// Map a condition code to its icon. Ranges are inclusive; anything outside
/// them has no icon.
pub fn icon_for_condition(code: i32) -> Option<ConditionIcon> {
    match code {
        200..=232 => Some(ConditionIcon::Storm),
        300..=321 => Some(ConditionIcon::LightRain),
        500..=521 => Some(ConditionIcon::Rain),
        600..=621 => Some(ConditionIcon::Snow),
        800..=821 => Some(ConditionIcon::Clear),
        _ => None,
    }
}

pub fn format_temperature(value: i32) -> String {
    format!("{value}{DEGREE_SUFFIX}")
}

/// A weather snapshot pushed by the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherUpdate {
    pub high: i32,
    pub low: i32,
    pub condition_code: i32,
}

impl WeatherUpdate {
    /// Decode from a data map; all three keys are required.
    pub fn decode(data: &DataMap) -> Result<Self, DecodeError> {
        Ok(Self {
            high: data.get_i32(HIGH_KEY)?,
            low: data.get_i32(LOW_KEY)?,
            condition_code: data.get_i32(WEATHER_ID_KEY)?,
        })
    }

    pub fn to_data_map(&self) -> DataMap {
        let mut map = DataMap::new();
        map.put_int(HIGH_KEY, i64::from(self.high));
        map.put_int(LOW_KEY, i64::from(self.low));
        map.put_int(WEATHER_ID_KEY, i64::from(self.condition_code));
        map
    }

    pub fn icon(&self) -> Option<ConditionIcon> {
        icon_for_condition(self.condition_code)
    }
}

/// Request for fresh weather. The id only makes each request a distinct data
/// item on the receiving side; replies are never matched against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherRequest {
    pub uuid: Uuid,
}

impl WeatherRequest {
    pub fn fresh() -> Self {
        Self {
            uuid: Uuid::new_v4(),
        }
    }

    pub fn to_data_map(&self) -> DataMap {
        let mut map = DataMap::new();
        map.put_string(UUID_KEY, self.uuid.to_string());
        map
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_in_documented_ranges_maps_to_its_icon() {
        let ranges = [
            (200..=232, ConditionIcon::Storm),
            (300..=321, ConditionIcon::LightRain),
            (500..=521, ConditionIcon::Rain),
            (600..=621, ConditionIcon::Snow),
            (800..=821, ConditionIcon::Clear),
        ];
        for (range, icon) in ranges {
            for code in range {
                assert_eq!(icon_for_condition(code), Some(icon), "code {code}");
            }
        }
    }

    #[test]
    fn codes_outside_ranges_have_no_icon() {
        for code in [
            i32::MIN, -1, 0, 199, 233, 299, 322, 499, 522, 599, 622, 799, 822, 900, i32::MAX,
        ] {
            assert_eq!(icon_for_condition(code), None, "code {code}");
        }
        let mapped = (-1000..2000).filter(|c| icon_for_condition(*c).is_some()).count();
        assert_eq!(mapped, 33 + 22 + 22 + 22 + 22);
    }

    #[test]
    fn temperatures_carry_degree_suffix() {
        assert_eq!(format_temperature(75), "75°");
        assert_eq!(format_temperature(-4), "-4°");
    }

    #[test]
    fn decode_reads_all_three_keys() {
        let mut map = DataMap::new();
        map.put_int(HIGH_KEY, 75);
        map.put_int(LOW_KEY, 58);
        map.put_int(WEATHER_ID_KEY, 802);
        let update = WeatherUpdate::decode(&map).expect("decode");
        assert_eq!(
            update,
            WeatherUpdate {
                high: 75,
                low: 58,
                condition_code: 802
            }
        );
        assert_eq!(update.icon(), Some(ConditionIcon::Clear));
    }

    #[test]
    fn decode_fails_when_a_key_is_missing() {
        let mut map = DataMap::new();
        map.put_int(HIGH_KEY, 75);
        map.put_int(WEATHER_ID_KEY, 802);
        assert_eq!(
            WeatherUpdate::decode(&map),
            Err(DecodeError::MissingKey(LOW_KEY))
        );
    }

    #[test]
    fn requests_get_distinct_ids() {
        let a = WeatherRequest::fresh();
        let b = WeatherRequest::fresh();
        assert_ne!(a.uuid, b.uuid);
        let map = a.to_data_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_string(UUID_KEY), Some(a.uuid.to_string().as_str()));
    }
}
