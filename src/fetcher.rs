// Upstream line status fetching.
//
// Default endpoint: TfL unified API, all rail modes in one call
// https://api.tfl.gov.uk/Line/Mode/tube,overground,dlr,elizabeth-line,national-rail/Status

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::models::RawLine;

pub const DEFAULT_STATUS_URL: &str =
    "https://api.tfl.gov.uk/Line/Mode/tube,overground,dlr,elizabeth-line,national-rail/Status";

/// The only fetch failure text ever shown to users.
pub const FETCH_ERROR_MESSAGE: &str = "Failed to fetch transport status";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid JSON response: {0}")]
    Decode(String),
}

impl FetchError {
    /// What the presentation layer shows, whatever the underlying cause.
    pub fn user_message(&self) -> &'static str {
        FETCH_ERROR_MESSAGE
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Anything that can hand back the current raw line list.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<RawLine>>;

    fn description(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct StatusClient {
    client: reqwest::Client,
    url: String,
}

impl StatusClient {
    /// `timeout` of `None` leaves request timing to the transport.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(FetchError::Client)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// Decode a status response body. The top level must be an array; each
/// element is read leniently.
pub fn parse_lines(body: &[u8]) -> Result<Vec<RawLine>> {
    let json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    let lines = json
        .as_array()
        .ok_or_else(|| FetchError::Decode("expected a JSON array of lines".to_string()))?;

    Ok(lines.iter().map(RawLine::from_json).collect())
}

#[async_trait]
impl StatusSource for StatusClient {
    async fn fetch(&self) -> Result<Vec<RawLine>> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.bytes().await?;
        let lines = parse_lines(&body)?;

        debug!(url = %self.url, lines = lines.len(), "line status fetched");
        Ok(lines)
    }

    fn description(&self) -> &str {
        &self.url
    }
}
