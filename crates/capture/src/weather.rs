//! Weather preset selection.

use std::time::{SystemTime, UNIX_EPOCH};

/// Named presets the simulator understands
const WEATHER_PRESETS: &[&str] = &[
    "ClearNoon",
    "CloudyNoon",
    "WetNoon",
    "WetCloudyNoon",
    "MidRainyNoon",
    "HardRainNoon",
    "SoftRainNoon",
    "ClearSunset",
    "CloudySunset",
    "WetSunset",
];

/// Draw a weather preset for the session.
///
/// Seeded from wall-clock time, like the traffic randomization.
pub fn draw_weather_preset() -> &'static str {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as usize)
        .unwrap_or(0);
    WEATHER_PRESETS[nanos % WEATHER_PRESETS.len()]
}
