use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub resort: ResortConfig,
    #[serde(default)]
    pub webcam: WebcamConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub subscribers: SubscribersConfig,
    #[serde(default = "default_schedule")]
    pub schedule: Vec<ScheduleSlot>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiscordConfig {
    pub token: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: "YOUR_DISCORD_BOT_TOKEN".to_string(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResortConfig {
    /// Display name used in captions.
    pub name: String,
    /// Command word accepted next to `snow` (`!verbier 8am`).
    pub command: String,
    #[serde_as(as = "DisplayFromStr")]
    pub timezone: Tz,
}

impl Default for ResortConfig {
    fn default() -> Self {
        Self {
            name: "Verbier".to_string(),
            command: "verbier".to_string(),
            timezone: chrono_tz::Europe::Zurich,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    #[default]
    Large,
    Small,
}

impl ImageSize {
    /// Size code understood by the frame-get endpoint.
    pub fn code(self) -> &'static str {
        match self {
            ImageSize::Large => "x768",
            ImageSize::Small => "x480",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebcamConfig {
    pub api_url: String,
    pub feed_id: String,
    #[serde(default)]
    pub size: ImageSize,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            api_url: "https://video.teleport.io/api/v2".to_string(),
            feed_id: "fe5nsqhtejqi".to_string(),
            size: ImageSize::Large,
        }
    }
}

const METEOSWISS_FEED_URL: &str =
    "https://data.geo.admin.ch/ch.meteoschweiz.messwerte-aktuell/VQHA80.csv";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WeatherConfig {
    pub feed_url: String,
    pub mountain: StationConfig,
    pub valley: StationConfig,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            feed_url: METEOSWISS_FEED_URL.to_string(),
            mountain: StationConfig {
                code: "ATT".to_string(),
                name: "Les Attelas".to_string(),
                altitude: 2734,
            },
            valley: StationConfig {
                code: "MOB".to_string(),
                name: "Montagnier".to_string(),
                altitude: 839,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StationConfig {
    /// Station code at the start of a feed row.
    pub code: String,
    pub name: String,
    /// Meters above sea level.
    pub altitude: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Unset means no timeout.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubscribersConfig {
    pub path: PathBuf,
    /// Channel ids merged into the store at startup.
    #[serde(default)]
    pub seed: Vec<String>,
}

impl Default for SubscribersConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("subscribers.json"),
            seed: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScheduleSlot {
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    pub title: String,
}

fn default_schedule() -> Vec<ScheduleSlot> {
    vec![
        ScheduleSlot {
            hour: 8,
            minute: 0,
            title: "Good morning! Verbier at 8 AM".to_string(),
        },
        ScheduleSlot {
            hour: 12,
            minute: 0,
            title: "Noon update from Verbier".to_string(),
        },
    ]
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let command = &self.resort.command;
        if command.is_empty() || !command.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("resort.command must be a non-empty alphanumeric word: {command:?}");
        }

        for slot in &self.schedule {
            if slot.hour > 23 || slot.minute > 59 {
                bail!(
                    "Invalid schedule time {:02}:{:02} for {:?}",
                    slot.hour,
                    slot.minute,
                    slot.title
                );
            }
        }

        Ok(())
    }
}

pub fn open_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
    let config: Config = toml::from_str(&content).context("Failed to parse configuration file")?;
    config.validate()?;
    Ok(config)
}

pub fn write_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = Config {
        schedule: default_schedule(),
        ..Default::default()
    };
    let content = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_example_config() {
        let content = include_str!("../../../config.example.toml");
        let config: Config = toml::from_str(content).expect("Failed to parse config.example.toml");

        let expected = Config {
            discord: DiscordConfig {
                token: "YOUR_DISCORD_BOT_TOKEN".to_string(),
            },
            resort: ResortConfig::default(),
            webcam: WebcamConfig::default(),
            weather: WeatherConfig::default(),
            http: HttpConfig {
                timeout: Some(Duration::from_secs(30)),
            },
            subscribers: SubscribersConfig {
                path: PathBuf::from("data/subscribers.json"),
                seed: vec!["123456789012345678".to_string()],
            },
            schedule: default_schedule(),
        };

        assert_eq!(config, expected);
        config.validate().unwrap();
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [discord]
            token = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.discord.token, "abc");
        assert_eq!(config.resort.timezone, chrono_tz::Europe::Zurich);
        assert_eq!(config.webcam.size.code(), "x768");
        assert_eq!(config.http.timeout, None);
        assert_eq!(config.schedule.len(), 2);
        assert_eq!(config.subscribers.path, PathBuf::from("subscribers.json"));
    }

    #[test]
    fn small_size_and_custom_zone() {
        let config: Config = toml::from_str(
            r#"
            [discord]
            token = "abc"

            [resort]
            name = "Zermatt"
            command = "zermatt"
            timezone = "Europe/Zurich"

            [webcam]
            api_url = "http://localhost"
            feed_id = "feed"
            size = "small"
            "#,
        )
        .unwrap();

        assert_eq!(config.resort.name, "Zermatt");
        assert_eq!(config.webcam.size.code(), "x480");
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let result = toml::from_str::<Config>(
            r#"
            [discord]
            token = "abc"

            [resort]
            name = "Nowhere"
            command = "nowhere"
            timezone = "Mars/Olympus_Mons"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.schedule = default_schedule();
        config.validate().unwrap();

        config.schedule[0].hour = 24;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.resort.command = "ver bier".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        write_default_config(&path).unwrap();
        let config = open_config(&path).unwrap();

        assert_eq!(config.schedule, default_schedule());
        assert_eq!(config.resort, ResortConfig::default());
    }
}
