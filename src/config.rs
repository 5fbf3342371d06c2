//! Runtime configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file by the binary before [`AppConfig::from_env`] runs. Every upstream base
//! URL can be overridden, which is how the integration tests point the backend
//! at mock servers.

use std::time::Duration;

use crate::protocol::models::{DEFAULT_MODEL, DEFAULT_VOICE, Temperature};
use crate::{Error, Result};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1/realtime";
pub const DEFAULT_PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
pub const DEFAULT_GEOCODE_BASE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const DEFAULT_IP_GEO_BASE_URL: &str = "http://ip-api.com/json";
pub const DEFAULT_PREFETCH_QUERY: &str = "pet-friendly places";
pub const DEFAULT_RADIUS_METERS: u32 = 5000;
pub const DEFAULT_PORT: u16 = 4242;

/// Settings for the outbound places lookups.
#[derive(Clone)]
pub struct PlacesConfig {
    pub api_key: String,
    pub base_url: String,
    pub radius_meters: u32,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

/// Settings for the ephemeral realtime session minted by `/token`.
#[derive(Clone)]
pub struct RealtimeConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub voice: String,
    pub temperature: Temperature,
}

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub realtime: RealtimeConfig,
    pub places: PlacesConfig,
    pub geocode_base_url: String,
    pub ip_geo_base_url: String,
    pub prefetch_query: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when a required key is missing or a value fails to parse.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when a required key is missing or a value fails to parse.
    #[allow(clippy::result_large_err)]
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| Error::Config(format!("{key} is required")));

        let temperature: f32 = parse_or(get("REALTIME_TEMPERATURE"), "REALTIME_TEMPERATURE", 0.8)?;
        let temperature = Temperature::new(temperature).map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), "PORT", DEFAULT_PORT)?,
            realtime: RealtimeConfig {
                api_key: required("OPENAI_API_KEY")?,
                base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                model: get("REALTIME_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                voice: get("REALTIME_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string()),
                temperature,
            },
            places: PlacesConfig {
                api_key: required("GOOGLE_PLACES_API_KEY")?,
                base_url: get("PLACES_BASE_URL").unwrap_or_else(|| DEFAULT_PLACES_BASE_URL.to_string()),
                radius_meters: parse_or(get("PLACES_RADIUS_METERS"), "PLACES_RADIUS_METERS", DEFAULT_RADIUS_METERS)?,
                retry_attempts: parse_or(get("PLACES_RETRY_ATTEMPTS"), "PLACES_RETRY_ATTEMPTS", 1)?,
                retry_backoff: Duration::from_millis(parse_or(
                    get("PLACES_RETRY_BACKOFF_MS"),
                    "PLACES_RETRY_BACKOFF_MS",
                    500,
                )?),
            },
            geocode_base_url: get("GEOCODE_BASE_URL").unwrap_or_else(|| DEFAULT_GEOCODE_BASE_URL.to_string()),
            ip_geo_base_url: get("IP_GEO_BASE_URL").unwrap_or_else(|| DEFAULT_IP_GEO_BASE_URL.to_string()),
            prefetch_query: get("PLACES_PREFETCH_QUERY").unwrap_or_else(|| DEFAULT_PREFETCH_QUERY.to_string()),
        })
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[allow(clippy::result_large_err)]
fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    raw.map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {value}")))
    })
}

// Keys stay out of logs.
impl std::fmt::Debug for PlacesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacesConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("radius_meters", &self.radius_meters)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("realtime", &self.realtime)
            .field("places", &self.places)
            .field("geocode_base_url", &self.geocode_base_url)
            .field("ip_geo_base_url", &self.ip_geo_base_url)
            .field("prefetch_query", &self.prefetch_query)
            .finish()
    }
}
