//! Chat command routing.
//!
//! A message is matched against an ordered route table. The first route
//! whose pattern matches decides the [`Command`]; executing it always
//! produces exactly one [`Reply`].

use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{Config, ResortConfig, ScheduleSlot};
use crate::instant::{InstantError, resolve_date, resolve_recent};
use crate::schedule::slot_title;
use crate::subscribers::SubscriberStore;
use crate::timeparse::{ParsedTime, format_label, parse_date, parse_time};
use crate::version::VERSION;
use crate::weather::{WeatherClient, format_caption, format_report};
use crate::webcam::{WebcamClient, WebcamError};

const INVALID_TIME: &str = "Invalid time format. Try: 8am, 3 pm, 15:00, noon";
const INVALID_DATE: &str = "Invalid date format. Use MM-DD or YYYY-MM-DD";
const UNKNOWN_COMMAND: &str = "Unknown command. Type !snow help for available commands.";
const WEATHER_UNAVAILABLE: &str = "Sorry, failed to fetch weather data.";

/// What the bot sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Image {
        data: Vec<u8>,
        filename: String,
        caption: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Morning,
    Noon,
}

/// A recognized command, before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `!!`
    Current,
    /// `!snow 8am`, `!snow noon`
    Shortcut(Shortcut),
    /// `!snow 3pm`: today, or yesterday if that time has not come yet.
    At(ParsedTime),
    /// `!snow 11-20 [time]`: a calendar date, noon unless a time is given.
    On { date: String, time: ParsedTime },
    Weather,
    Subscribe,
    Unsubscribe,
    Status,
    ChatId,
    Help,
    InvalidTime,
    InvalidDate,
    Unknown,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Webcam(#[from] WebcamError),

    #[error(transparent)]
    Instant(#[from] InstantError),

    #[error("Subscriber store error: {0:#}")]
    Store(anyhow::Error),
}

impl CommandError {
    /// Text shown to the chat instead of the error itself.
    pub fn user_message(&self) -> &'static str {
        match self {
            CommandError::Webcam(WebcamError::HistoricalNotFound) => {
                "Historical footage not available for this time."
            }
            CommandError::Webcam(WebcamError::Upstream(_)) => {
                "Unable to fetch image. Please try again later."
            }
            _ => "Sorry, something went wrong.",
        }
    }
}

type Handler = fn(&Captures<'_>) -> Command;

struct Route {
    pattern: Regex,
    handler: Handler,
}

/// Builds the route table for the `snow` prefix and the resort command word.
fn build_routes(command_word: &str) -> Result<Vec<Route>> {
    let prefix = format!("!(?:snow|{})", regex::escape(command_word));

    let literals: [(&str, Handler); 8] = [
        ("8am", |_| Command::Shortcut(Shortcut::Morning)),
        ("noon", |_| Command::Shortcut(Shortcut::Noon)),
        ("weather", |_| Command::Weather),
        ("subscribe", |_| Command::Subscribe),
        ("unsubscribe", |_| Command::Unsubscribe),
        ("status", |_| Command::Status),
        ("chatid", |_| Command::ChatId),
        ("help", |_| Command::Help),
    ];

    let mut patterns: Vec<(String, Handler)> = Vec::new();
    patterns.push(("^!!$".to_string(), |_| Command::Current));
    patterns.extend(
        literals
            .into_iter()
            .map(|(suffix, handler)| (format!("^{prefix} {}$", regex::escape(suffix)), handler)),
    );
    patterns.push((
        format!(r"^{prefix}\s+(\d{{1,2}}(?::\d{{2}})?\s*(?:am|pm)?|noon|midnight)$"),
        time_command,
    ));
    patterns.push((
        format!(r"^{prefix}\s+(\d{{2,4}}-\d{{2}}(?:-\d{{2}})?)\s*(.*)$"),
        date_command,
    ));
    patterns.push((format!("^{prefix}"), |_| Command::Unknown));

    patterns
        .into_iter()
        .map(|(pattern, handler)| {
            let pattern = Regex::new(&pattern)
                .with_context(|| format!("Failed to compile command pattern {pattern}"))?;
            Ok::<_, anyhow::Error>(Route { pattern, handler })
        })
        .collect()
}

fn time_command(caps: &Captures<'_>) -> Command {
    match parse_time(&caps[1]) {
        Some(time) => Command::At(time),
        None => Command::InvalidTime,
    }
}

fn date_command(caps: &Captures<'_>) -> Command {
    let Some(date) = parse_date(&caps[1]) else {
        return Command::InvalidDate;
    };

    let time_text = caps.get(2).map_or("", |m| m.as_str().trim());
    if time_text.is_empty() {
        return Command::On {
            date,
            time: ParsedTime::noon(),
        };
    }

    match parse_time(time_text) {
        Some(time) => Command::On { date, time },
        None => Command::InvalidTime,
    }
}

pub struct Router {
    routes: Vec<Route>,
    resort: ResortConfig,
    schedule: Vec<ScheduleSlot>,
    webcam: WebcamClient,
    weather: WeatherClient,
    store: Arc<Mutex<SubscriberStore>>,
}

impl Router {
    pub fn new(config: &Config, store: Arc<Mutex<SubscriberStore>>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(format!("snowcam/{VERSION}"));
        if let Some(timeout) = config.http.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        // Message bodies are matched lower-cased.
        let resort = ResortConfig {
            command: config.resort.command.to_lowercase(),
            ..config.resort.clone()
        };

        Ok(Self {
            routes: build_routes(&resort.command)?,
            resort,
            schedule: config.schedule.clone(),
            webcam: WebcamClient::new(http.clone(), &config.webcam),
            weather: WeatherClient::new(http, &config.weather),
            store,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.resort.timezone
    }

    pub fn schedule(&self) -> &[ScheduleSlot] {
        &self.schedule
    }

    /// Matches a message body against the route table.
    ///
    /// Returns `None` when the text is not addressed to the bot.
    pub fn parse(&self, body: &str) -> Option<Command> {
        let body = body.trim().to_lowercase();
        self.routes.iter().find_map(|route| {
            route
                .pattern
                .captures(&body)
                .map(|caps| (route.handler)(&caps))
        })
    }

    /// Handles one incoming message from `chat_id`.
    pub async fn handle(&self, chat_id: &str, body: &str) -> Option<Reply> {
        let command = self.parse(body)?;
        tracing::info!(chat_id, command = ?command, "Handling command");

        let reply = match self.execute(chat_id, command).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Command failed");
                Reply::Text(e.user_message().to_string())
            }
        };
        Some(reply)
    }

    async fn execute(
        &self,
        chat_id: &str,
        command: Command,
    ) -> std::result::Result<Reply, CommandError> {
        let resort = &self.resort.name;
        let tz = self.resort.timezone;

        let reply = match command {
            Command::Current => {
                self.conditions(None, &format!("Current view from {resort}"))
                    .await?
            }
            Command::Shortcut(shortcut) => {
                let (hour, suffix, when) = match shortcut {
                    Shortcut::Morning => (8, "8am", "8 AM"),
                    Shortcut::Noon => (12, "noon", "noon"),
                };
                let data = self
                    .webcam
                    .fetch_at(resolve_recent(hour, 0, tz, Utc::now())?)
                    .await?;
                Reply::Image {
                    data,
                    filename: format!("{}_{suffix}.jpg", self.resort.command),
                    caption: format!("{resort} at {when} today"),
                }
            }
            Command::At(time) => {
                let instant = resolve_recent(time.hour, time.minute, tz, Utc::now())?;
                let data = self.webcam.fetch_at(instant).await?;
                self.image(data, format!("{resort} today at {}", time.label))
            }
            Command::On { date, time } => {
                let instant = resolve_date(&date, time.hour, time.minute, tz)?;
                let data = self.webcam.fetch_at(instant).await?;
                self.image(data, format!("{resort} on {date} at {}", time.label))
            }
            Command::Weather => match self.weather.fetch().await {
                Some(weather) => Reply::Text(format_report(&weather, resort)),
                None => Reply::Text(WEATHER_UNAVAILABLE.to_string()),
            },
            Command::Subscribe => self.subscribe(chat_id).await?,
            Command::Unsubscribe => self.unsubscribe(chat_id).await?,
            Command::Status => self.status(chat_id).await,
            Command::ChatId => Reply::Text(format!("**Chat ID:** `{chat_id}`")),
            Command::Help => Reply::Text(self.help()),
            Command::InvalidTime => Reply::Text(INVALID_TIME.to_string()),
            Command::InvalidDate => Reply::Text(INVALID_DATE.to_string()),
            Command::Unknown => Reply::Text(UNKNOWN_COMMAND.to_string()),
        };
        Ok(reply)
    }

    /// Webcam frame with a weather caption.
    ///
    /// `at` is the instant of the frame; `None` fetches the live frame.
    /// Weather is best-effort.
    pub async fn conditions(
        &self,
        at: Option<DateTime<Utc>>,
        title: &str,
    ) -> std::result::Result<Reply, CommandError> {
        let frame = async {
            match at {
                Some(instant) => self.webcam.fetch_at(instant).await,
                None => self.webcam.fetch_current().await,
            }
        };

        let (frame, weather) = tokio::join!(frame, self.weather.fetch());
        Ok(self.image(frame?, format_caption(weather.as_ref(), title)))
    }

    /// Broadcast content for a schedule slot that fired at `fire_at`.
    ///
    /// The frame is the one recorded at `fire_at` and the caption carries
    /// the resort date of that instant.
    pub async fn scheduled(
        &self,
        slot: &ScheduleSlot,
        fire_at: DateTime<Utc>,
    ) -> std::result::Result<Reply, CommandError> {
        let title = slot_title(slot, self.resort.timezone, fire_at);
        self.conditions(Some(fire_at), &title).await
    }

    pub async fn subscribers(&self) -> Vec<String> {
        self.store.lock().await.list().to_vec()
    }

    fn image(&self, data: Vec<u8>, caption: String) -> Reply {
        Reply::Image {
            data,
            filename: format!("{}.jpg", self.resort.command),
            caption,
        }
    }

    async fn subscribe(&self, chat_id: &str) -> std::result::Result<Reply, CommandError> {
        let added = self
            .store
            .lock()
            .await
            .add(chat_id)
            .map_err(CommandError::Store)?;

        if !added {
            return Ok(Reply::Text(
                "This chat is already subscribed to daily updates.".to_string(),
            ));
        }

        tracing::info!(chat_id, "Chat subscribed");
        let when = match self.schedule_times() {
            Some(times) => format!(" at {times}"),
            None => String::new(),
        };
        Ok(Reply::Text(format!(
            "✅ Subscribed!\n\nThis chat will now receive daily updates{when}.\n\nUse `!snow unsubscribe` to stop."
        )))
    }

    async fn unsubscribe(&self, chat_id: &str) -> std::result::Result<Reply, CommandError> {
        let removed = self
            .store
            .lock()
            .await
            .remove(chat_id)
            .map_err(CommandError::Store)?;

        if !removed {
            return Ok(Reply::Text(
                "This chat is not subscribed to daily updates.".to_string(),
            ));
        }

        tracing::info!(chat_id, "Chat unsubscribed");
        Ok(Reply::Text(
            "❌ Unsubscribed.\n\nThis chat will no longer receive daily updates.".to_string(),
        ))
    }

    async fn status(&self, chat_id: &str) -> Reply {
        let (subscribed, total) = {
            let store = self.store.lock().await;
            (store.contains(chat_id), store.len())
        };

        let lines = [
            "**Bot Status**".to_string(),
            String::new(),
            format!(
                "📍 This chat: {}",
                if subscribed {
                    "✅ Subscribed"
                } else {
                    "❌ Not subscribed"
                }
            ),
            format!("📊 Total subscribed chats: {total}"),
            String::new(),
            if subscribed {
                "Use `!snow unsubscribe` to stop updates.".to_string()
            } else {
                "Use `!snow subscribe` to get daily updates.".to_string()
            },
        ];
        Reply::Text(lines.join("\n"))
    }

    fn help(&self) -> String {
        let resort = &self.resort.name;
        [
            format!("**{resort} Snow Bot**"),
            String::new(),
            "**Images**".to_string(),
            "!! - Current live image".to_string(),
            "!snow 8am - Today at 8 AM".to_string(),
            "!snow 3 pm - Today at 3 PM".to_string(),
            "!snow 15 - Today at 15:00".to_string(),
            "!snow 9:30am - Today at 9:30 AM".to_string(),
            "!snow noon - Today at noon".to_string(),
            "!snow 11-20 - Nov 20 at noon".to_string(),
            "!snow 11-20 8am - Nov 20 at 8 AM".to_string(),
            String::new(),
            "**Weather**".to_string(),
            "!snow weather - Current conditions".to_string(),
            String::new(),
            "**Subscriptions**".to_string(),
            "!snow subscribe - Daily updates".to_string(),
            "!snow unsubscribe - Stop updates".to_string(),
            "!snow status - Check subscription".to_string(),
            "!snow chatid - Show this chat's ID".to_string(),
            String::new(),
            format!("`!{}` works everywhere `!snow` does.", self.resort.command),
        ]
        .join("\n")
    }

    /// "8 AM and noon" for the configured slots.
    fn schedule_times(&self) -> Option<String> {
        if self.schedule.is_empty() {
            return None;
        }
        let labels: Vec<String> = self
            .schedule
            .iter()
            .map(|slot| format_label(slot.hour, slot.minute))
            .collect();
        Some(labels.join(" and "))
    }
}
