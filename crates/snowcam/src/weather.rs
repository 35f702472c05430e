//! Current conditions from the MeteoSwiss station feed.
//!
//! The feed is a semicolon separated text file: a header row naming the
//! measurement columns, then one row per station starting with its code.

use anyhow::{Context as _, Result};

use crate::config::{StationConfig, WeatherConfig};

const TEMPERATURE_COLUMN: &str = "tre200s0";
const WIND_COLUMN: &str = "fu3010z0";
const PRECIPITATION_COLUMN: &str = "rre150z0";

/// One station row.
#[derive(Debug, Clone, PartialEq)]
pub struct StationReading {
    /// °C
    pub temp: Option<i32>,
    /// km/h
    pub wind: Option<i32>,
    /// mm
    pub precip: f64,
    pub name: String,
    pub altitude: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub mountain: Option<StationReading>,
    pub valley: Option<StationReading>,
    pub emoji: &'static str,
}

/// Downloads and parses the feed on every call.
pub struct WeatherClient {
    http: reqwest::Client,
    feed_url: String,
    mountain: StationConfig,
    valley: StationConfig,
}

impl WeatherClient {
    pub fn new(http: reqwest::Client, config: &WeatherConfig) -> Self {
        Self {
            http,
            feed_url: config.feed_url.clone(),
            mountain: config.mountain.clone(),
            valley: config.valley.clone(),
        }
    }

    /// Fetches current conditions.
    ///
    /// Returns `None` when the feed cannot be fetched (the error is logged).
    pub async fn fetch(&self) -> Option<WeatherSnapshot> {
        match self.fetch_inner().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::error!(url = %self.feed_url, error = %e, "Weather fetch failed");
                None
            }
        }
    }

    async fn fetch_inner(&self) -> Result<WeatherSnapshot> {
        let response = self
            .http
            .get(&self.feed_url)
            .send()
            .await
            .context("HTTP request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("MeteoSwiss API error: {}", response.status());
        }

        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(parse_feed(&text, &self.mountain, &self.valley))
    }
}

/// Extracts the two tracked stations from the feed text.
///
/// A station missing from the feed is `None`; a missing or unparseable
/// column yields `None` for temperature and wind and `0` for precipitation.
pub fn parse_feed(
    text: &str,
    mountain: &StationConfig,
    valley: &StationConfig,
) -> WeatherSnapshot {
    let mut lines = text.trim().lines();
    let headers: Vec<&str> = lines
        .next()
        .map(|line| line.split(';').map(str::trim).collect())
        .unwrap_or_default();
    let rows: Vec<&str> = lines.collect();

    let column = |name: &str| headers.iter().position(|h| *h == name);
    let columns = Columns {
        temp: column(TEMPERATURE_COLUMN),
        wind: column(WIND_COLUMN),
        precip: column(PRECIPITATION_COLUMN),
    };

    let mountain = read_station(&rows, mountain, &columns);
    let valley = read_station(&rows, valley, &columns);

    let temp = mountain.as_ref().and_then(|m| m.temp).unwrap_or(0);
    let precip = mountain.as_ref().map(|m| m.precip).unwrap_or(0.0);

    WeatherSnapshot {
        emoji: weather_emoji(temp, precip),
        mountain,
        valley,
    }
}

struct Columns {
    temp: Option<usize>,
    wind: Option<usize>,
    precip: Option<usize>,
}

fn read_station(
    rows: &[&str],
    station: &StationConfig,
    columns: &Columns,
) -> Option<StationReading> {
    let prefix = format!("{};", station.code);
    let row = rows.iter().find(|row| row.starts_with(&prefix))?;
    let values: Vec<&str> = row.split(';').collect();

    let number = |index: Option<usize>| {
        index
            .and_then(|i| values.get(i))
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| !v.is_nan())
    };

    Some(StationReading {
        temp: number(columns.temp).and_then(round_to_int),
        wind: number(columns.wind).and_then(round_to_int),
        precip: number(columns.precip).unwrap_or(0.0),
        name: station.name.clone(),
        altitude: station.altitude,
    })
}

/// Rounds half up: `-0.5` becomes `0`, `2.5` becomes `3`.
fn round_to_int(value: f64) -> Option<i32> {
    if !value.is_finite() {
        return None;
    }
    let rounded = (value + 0.5).floor();
    (rounded >= f64::from(i32::MIN) && rounded <= f64::from(i32::MAX)).then_some(rounded as i32)
}

/// Picks an icon from mountain conditions, first match wins.
pub fn weather_emoji(temp: i32, precip: f64) -> &'static str {
    if precip > 0.0 && temp <= 0 {
        "🌨️"
    } else if precip > 0.0 {
        "🌧️"
    } else if temp <= -10 {
        "🥶"
    } else if temp <= 0 {
        "❄️"
    } else if temp >= 25 {
        "☀️"
    } else {
        "⛰️"
    }
}

fn value(v: Option<i32>) -> String {
    v.map_or_else(|| "–".to_string(), |v| v.to_string())
}

/// Image caption: `title` alone without weather, otherwise the title with
/// a compact block per station.
pub fn format_caption(weather: Option<&WeatherSnapshot>, title: &str) -> String {
    let Some(weather) = weather else {
        return title.to_string();
    };

    let mut lines = vec![format!("{} {}", weather.emoji, title), String::new()];

    if let Some(mountain) = &weather.mountain {
        lines.push(format!("⛷️ **Pistes** ({}m)", mountain.altitude));
        lines.push(format!(
            "🌡️ {}°C  💨 {} km/h",
            value(mountain.temp),
            value(mountain.wind)
        ));
    }

    if let Some(valley) = &weather.valley {
        lines.push(String::new());
        lines.push(format!("🏘️ **Vallée** ({}m)", valley.altitude));
        lines.push(format!(
            "🌡️ {}°C  💨 {} km/h",
            value(valley.temp),
            value(valley.wind)
        ));
    }

    lines.join("\n")
}

/// Reply for the weather command.
pub fn format_report(weather: &WeatherSnapshot, resort: &str) -> String {
    let mut lines = vec![
        format!("**{resort} Weather** {}", weather.emoji),
        String::new(),
    ];

    if let Some(mountain) = &weather.mountain {
        lines.push(format!(
            "⛷️ **Pistes** · {} ({}m)",
            mountain.name, mountain.altitude
        ));
        lines.push(format!("🌡️ {}°C", value(mountain.temp)));
        lines.push(format!("💨 {} km/h", value(mountain.wind)));
        lines.push(String::new());
    }

    if let Some(valley) = &weather.valley {
        lines.push(format!(
            "🏘️ **Vallée** · {} ({}m)",
            valley.name, valley.altitude
        ));
        lines.push(format!("🌡️ {}°C", value(valley.temp)));
        lines.push(format!("💨 {} km/h", value(valley.wind)));
    }

    lines.push(String::new());
    lines.push("_Source: MeteoSwiss_".to_string());
    lines.join("\n")
}
