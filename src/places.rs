//! Places lookup: text search against the places provider, normalised into [`Place`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::PlacesConfig;
use crate::{Error, ErrorBody, Result};

/// Only the top results are ever shown.
pub const MAX_DISPLAYED_PLACES: usize = 5;

const SERVICE: &str = "places";
pub(crate) const GENERIC_FAILURE: &str = "Failed to fetch places";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rating {
    Score(f64),
    NotAvailable,
}

impl Serialize for Rating {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Score(value) => serializer.serialize_f64(*value),
            Self::NotAvailable => serializer.serialize_str("N/A"),
        }
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Score(f64),
            Label(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Score(value) => Self::Score(value),
            Repr::Label(_) => Self::NotAvailable,
        })
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Score(value) => write!(f, "{value}"),
            Self::NotAvailable => write!(f, "N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub address: String,
    pub rating: Rating,
}

impl std::fmt::Display for Place {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, Rating: {})", self.name, self.address, self.rating)
    }
}

/// Body of `GET /places`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacesResponse {
    pub query: String,
    pub places: Vec<Place>,
}

/// Keep the first [`MAX_DISPLAYED_PLACES`] results in upstream order.
#[must_use]
pub fn top_places(mut places: Vec<Place>) -> Vec<Place> {
    places.truncate(MAX_DISPLAYED_PLACES);
    places
}

/// Anything that can answer a `search_places` tool call.
#[async_trait]
pub trait PlacesLookup: Send + Sync {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<Place>>;
}

/// Bounded retry with linear backoff for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    #[must_use]
    pub const fn none() -> Self {
        Self { max_attempts: 1, backoff: Duration::ZERO }
    }

    #[must_use]
    pub const fn linear(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<TextSearchResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextSearchResult {
    #[serde(default)]
    name: String,
    #[serde(default)]
    formatted_address: String,
    rating: Option<f64>,
}

impl From<TextSearchResult> for Place {
    fn from(raw: TextSearchResult) -> Self {
        Self {
            name: raw.name,
            address: raw.formatted_address,
            rating: raw.rating.map_or(Rating::NotAvailable, Rating::Score),
        }
    }
}

/// Direct client for the places provider's text search.
#[derive(Clone)]
pub struct PlacesClient {
    client: Client,
    config: PlacesConfig,
    retry: RetryPolicy,
}

impl PlacesClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(config: PlacesConfig) -> Result<Self> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        let retry = RetryPolicy::linear(config.retry_attempts.max(1), config.retry_backoff);
        Ok(Self { client, config, retry })
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Search for places matching `query` around `location` (`"lat,lon"`).
    ///
    /// Results keep upstream order and are not truncated.
    ///
    /// # Errors
    /// [`Error::Validation`] for empty arguments, [`Error::Upstream`] when the
    /// provider reports a failure status, [`Error::Transport`] on network failure.
    pub async fn search(&self, query: &str, location: &str) -> Result<Vec<Place>> {
        if query.trim().is_empty() || location.trim().is_empty() {
            return Err(Error::Validation("query and location are required".to_string()));
        }

        let mut attempt = 1;
        loop {
            match self.search_once(query, location).await {
                Err(err) if err.is_transport() && attempt < self.retry.max_attempts => {
                    tracing::warn!(attempt, "places lookup failed, retrying: {err}");
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn search_once(&self, query: &str, location: &str) -> Result<Vec<Place>> {
        let radius = self.config.radius_meters.to_string();
        let res = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("query", query),
                ("location", location),
                ("radius", radius.as_str()),
                ("key", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(Error::transport)?;

        let http_status = res.status();
        let body = res.text().await.map_err(Error::transport)?;
        let parsed: TextSearchResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !http_status.is_success() => {
                return Err(Error::upstream(SERVICE, format!("{GENERIC_FAILURE} (HTTP {http_status})")));
            }
            Err(err) => return Err(err.into()),
        };

        match parsed.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Ok(Vec::new()),
            _ => {
                let message = parsed.error_message.unwrap_or_else(|| GENERIC_FAILURE.to_string());
                return Err(Error::upstream(SERVICE, message));
            }
        }

        let places: Vec<Place> = parsed.results.into_iter().map(Place::from).collect();
        tracing::debug!(query, count = places.len(), "places lookup succeeded");
        Ok(places)
    }
}

#[async_trait]
impl PlacesLookup for PlacesClient {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<Place>> {
        Self::search(self, query, location).await
    }
}

/// Lookup through the backend's `GET /places`, the path the voice front-end uses.
#[derive(Clone, Debug)]
pub struct BackendPlaces {
    client: Client,
    base_url: String,
}

impl BackendPlaces {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl PlacesLookup for BackendPlaces {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<Place>> {
        let res = self
            .client
            .get(format!("{}/places", self.base_url))
            .query(&[("query", query), ("location", location)])
            .send()
            .await?;

        if res.status().is_success() {
            let body: PlacesResponse = res.json().await?;
            return Ok(body.places);
        }

        let status = res.status();
        let message = res
            .json::<ErrorBody>()
            .await
            .map_or_else(|_| format!("{GENERIC_FAILURE} (HTTP {status})"), |body| body.error);
        Err(Error::upstream("backend", message))
    }
}
