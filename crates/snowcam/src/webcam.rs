//! Client for the webcam provider's frame-get endpoint.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::{ImageSize, WebcamConfig};

#[derive(Error, Debug)]
pub enum WebcamError {
    #[error("Historical footage not available for this time")]
    HistoricalNotFound,

    #[error("Webcam API error: {0}")]
    Upstream(StatusCode),

    #[error("Webcam request failed: {0}")]
    Request(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, WebcamError>;

/// Fetches JPEG frames for a single feed.
pub struct WebcamClient {
    http: reqwest::Client,
    api_url: String,
    feed_id: String,
    size: ImageSize,
}

impl WebcamClient {
    pub fn new(http: reqwest::Client, config: &WebcamConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            feed_id: config.feed_id.clone(),
            size: config.size,
        }
    }

    /// Fetches the live frame.
    pub async fn fetch_current(&self) -> Result<Vec<u8>> {
        self.fetch_frame(None).await
    }

    /// Fetches the frame recorded at `instant`.
    ///
    /// A 404 here means the provider has no footage for that moment and is
    /// reported as [`WebcamError::HistoricalNotFound`].
    pub async fn fetch_at(&self, instant: DateTime<Utc>) -> Result<Vec<u8>> {
        self.fetch_frame(Some(frametime(instant))).await
    }

    async fn fetch_frame(&self, frametime: Option<String>) -> Result<Vec<u8>> {
        let url = format!("{}/frame-get", self.api_url);

        let mut query = vec![
            ("feedid", self.feed_id.as_str()),
            ("sizecode", self.size.code()),
        ];
        if let Some(frametime) = &frametime {
            query.push(("frametime", frametime.as_str()));
        }

        tracing::debug!(url = %url, frametime = ?frametime, "Fetching webcam frame");

        let response = self.http.get(&url).query(&query).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND && frametime.is_some() {
            return Err(WebcamError::HistoricalNotFound);
        }
        if !status.is_success() {
            return Err(WebcamError::Upstream(status));
        }

        let data = response.bytes().await?.to_vec();
        tracing::debug!(size = data.len(), "Webcam frame received");
        Ok(data)
    }
}

/// Formats an instant the way the frame-get endpoint expects
/// (`2025-11-27T11:00:00Z`).
fn frametime(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}
