//! Human-friendly rendering of lookup state. Nothing here feeds back into the
//! controller.

use weather_core::{RequestState, WeatherReport};

pub const LOADING: &str = "Loading...";

/// Card styling chosen by condition category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backdrop {
    ClearSky,
    Overcast,
    Wet,
    Snow,
    Neutral,
}

impl Backdrop {
    pub fn for_category(category: Option<&str>) -> Self {
        let Some(category) = category else {
            return Backdrop::Neutral;
        };

        match category.to_lowercase().as_str() {
            "clear" => Backdrop::ClearSky,
            "clouds" => Backdrop::Overcast,
            "rain" | "drizzle" | "thunderstorm" => Backdrop::Wet,
            "snow" => Backdrop::Snow,
            _ => Backdrop::Neutral,
        }
    }

    /// ANSI SGR sequence for the card heading.
    fn ansi(self) -> &'static str {
        match self {
            Backdrop::ClearSky => "\x1b[1;38;5;33m",
            Backdrop::Overcast => "\x1b[1;38;5;245m",
            Backdrop::Wet => "\x1b[1;38;5;67m",
            Backdrop::Snow => "\x1b[1;38;5;195m",
            Backdrop::Neutral => "\x1b[1m",
        }
    }
}

/// Rounds halves upwards, so 17.5 -> 18 and -0.5 -> 0.
pub fn round_half_up(value: f64) -> i64 {
    let floor = value.floor();
    // `value + 0.5` is inexact just below a half; compare the fraction.
    let rounded = if value - floor >= 0.5 { floor + 1.0 } else { floor };
    rounded as i64
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn card(report: &WeatherReport, color: bool) -> String {
    let heading = if report.country.is_empty() {
        report.location.clone()
    } else {
        format!("{}, {}", report.location, report.country)
    };

    let heading = if color {
        let backdrop = Backdrop::for_category(Some(&report.condition.category));
        format!("{}{heading}\x1b[0m", backdrop.ansi())
    } else {
        heading
    };

    let mut lines = vec![
        heading,
        capitalize(&report.condition.description),
        format!("{}°C", round_half_up(report.temperature_c)),
        format!("Feels: {}°C", round_half_up(report.feels_like_c)),
        format!("Humidity: {}%", report.humidity_pct),
        format!("Wind: {} m/s", round_half_up(report.wind_speed_mps)),
    ];

    if !report.condition.icon.is_empty() {
        lines.push(format!("Icon: {}", report.icon_url()));
    }
    if let Some(at) = report.observed_at {
        lines.push(format!("Observed: {}", at.format("%Y-%m-%d %H:%M UTC")));
    }

    lines.join("\n")
}

/// Text for the current state; `None` while idle.
pub fn state(state: &RequestState, color: bool) -> Option<String> {
    match state {
        RequestState::Idle => None,
        RequestState::Loading => Some(LOADING.to_string()),
        RequestState::Success(report) => Some(card(report, color)),
        RequestState::Failed(message) => Some(format!("Error: {message}")),
    }
}
