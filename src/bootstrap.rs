//! Token and session bootstrap.
//!
//! Resolves the caller's location, pre-fetches nearby places, renders the
//! system prompt and mints an ephemeral realtime credential carrying it. Every
//! enrichment step is best effort: a failed IP lookup, geocode or prefetch is
//! logged and the prompt falls back to asking the user where they are. Only
//! the credential request itself can fail the bootstrap.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, RealtimeConfig};
use crate::geo::{Coordinates, Geocoder, IpGeolocator, StreetAddress};
use crate::places::{Place, PlacesClient, PlacesLookup, top_places};
use crate::protocol::models::SessionRequest;
use crate::transport::{ClientSecret, RealtimeRestAdapter};
use crate::{Error, Result};

const UNKNOWN_LOCATION: &str = "unknown location";

#[derive(Debug, Clone, PartialEq)]
pub enum LocationContext {
    Known { coords: Coordinates, address: StreetAddress },
    Unknown,
}

impl LocationContext {
    #[must_use]
    pub const fn coords(&self) -> Option<Coordinates> {
        match self {
            Self::Known { coords, .. } => Some(*coords),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for LocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known { address, .. } => write!(f, "{address}"),
            Self::Unknown => f.write_str(UNKNOWN_LOCATION),
        }
    }
}

/// Everything the system prompt is rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub location: LocationContext,
    pub places: Vec<Place>,
}

impl PromptContext {
    #[must_use]
    pub fn render(&self) -> String {
        let mut prompt = String::from(
            "You are a helpful assistant that specializes in providing recommendations \
             for pet-friendly places (5 places) based on user location.\n",
        );
        let _ = writeln!(prompt, "The user's location is {}.", self.location);
        if self.location == LocationContext::Unknown {
            prompt.push_str("The location is unknown, so ask the user where they are.\n");
        }
        if self.places.is_empty() {
            prompt.push_str("No nearby places could be pre-fetched; use the search_places tool once the location is known.\n");
        } else {
            prompt.push_str("Based on Google Maps data, here are recommended pet-friendly places:\n");
            for place in &self.places {
                let _ = writeln!(prompt, "- {place}");
            }
        }
        prompt.push_str(
            "Tailor your recommendations based on the user's location or provided details.\n\
             Be concise, informative, and user-focused.\n\
             Prioritize accuracy and relevance to the user's needs.\n\
             Do not talk about anything unrelated to DogMap and pet-friendly places.",
        );
        prompt
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub credential: String,
    pub expires_at: u64,
    pub prompt: PromptContext,
}

/// Body of `GET /token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub credential: String,
    pub expires_at: u64,
    /// Same credential in the shape browser clients read.
    pub client_secret: ClientSecret,
    pub location: Option<String>,
    pub places: Vec<Place>,
}

impl From<BootstrapOutcome> for TokenResponse {
    fn from(outcome: BootstrapOutcome) -> Self {
        let location = match &outcome.prompt.location {
            LocationContext::Known { address, .. } => Some(address.to_string()),
            LocationContext::Unknown => None,
        };
        Self {
            client_secret: ClientSecret { value: outcome.credential.clone(), expires_at: outcome.expires_at },
            credential: outcome.credential,
            expires_at: outcome.expires_at,
            location,
            places: outcome.prompt.places,
        }
    }
}

pub struct Bootstrapper {
    geolocator: IpGeolocator,
    geocoder: Geocoder,
    places: Arc<dyn PlacesLookup>,
    rest: RealtimeRestAdapter,
    realtime: RealtimeConfig,
    prefetch_query: String,
}

impl Bootstrapper {
    /// # Errors
    /// Returns an error if one of the upstream clients cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            geolocator: IpGeolocator::new(&config.ip_geo_base_url)?,
            geocoder: Geocoder::new(&config.geocode_base_url, &config.places.api_key)?,
            places: Arc::new(PlacesClient::new(config.places.clone())?),
            rest: RealtimeRestAdapter::with_base_url(&config.realtime.api_key, &config.realtime.base_url)?,
            realtime: config.realtime.clone(),
            prefetch_query: config.prefetch_query.clone(),
        })
    }

    /// Swap the lookup used for the prefetch.
    #[must_use]
    pub fn with_places(mut self, places: Arc<dyn PlacesLookup>) -> Self {
        self.places = places;
        self
    }

    /// Run the full bootstrap for a caller at `ip`.
    ///
    /// # Errors
    /// [`Error::Bootstrap`] when the credential cannot be issued.
    pub async fn bootstrap(&self, ip: Option<IpAddr>) -> Result<BootstrapOutcome> {
        let location = self.locate(ip).await;
        let places = match location.coords() {
            Some(coords) => self.prefetch(coords).await,
            None => Vec::new(),
        };
        let prompt = PromptContext { location, places };

        let request = SessionRequest {
            model: self.realtime.model.clone(),
            voice: self.realtime.voice.clone(),
            instructions: prompt.render(),
            temperature: self.realtime.temperature,
        };
        let session = self
            .rest
            .create_session(&request)
            .await
            .map_err(|err| Error::Bootstrap(err.to_string()))?;

        tracing::info!(location = %prompt.location, places = prompt.places.len(), "issued realtime credential");
        Ok(BootstrapOutcome {
            credential: session.client_secret.value,
            expires_at: session.client_secret.expires_at,
            prompt,
        })
    }

    async fn locate(&self, ip: Option<IpAddr>) -> LocationContext {
        let Some(ip) = ip else {
            tracing::debug!("no public client address, location unknown");
            return LocationContext::Unknown;
        };

        let coords = match self.geolocator.locate(ip).await {
            Ok(Some(coords)) => coords,
            Ok(None) => {
                tracing::warn!(%ip, "IP geolocation found no match");
                return LocationContext::Unknown;
            }
            Err(err) => {
                tracing::warn!(%ip, "IP geolocation failed: {err}");
                return LocationContext::Unknown;
            }
        };

        let address = self.geocoder.reverse(coords).await.unwrap_or_else(|err| {
            tracing::warn!(%coords, "reverse geocoding failed: {err}");
            StreetAddress::default()
        });
        tracing::debug!(%address, "resolved caller location");
        LocationContext::Known { coords, address }
    }

    async fn prefetch(&self, coords: Coordinates) -> Vec<Place> {
        match self.places.search(&self.prefetch_query, &coords.to_string()).await {
            Ok(places) => top_places(places),
            Err(err) => {
                tracing::warn!(%coords, "places prefetch failed: {err}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::places::Rating;

    fn known() -> LocationContext {
        LocationContext::Known {
            coords: Coordinates { lat: 52.52, lon: 13.4 },
            address: StreetAddress { city: "Berlin".into(), street: "Unter den Linden".into() },
        }
    }

    #[test]
    fn prompt_lists_prefetched_places() {
        let prompt = PromptContext {
            location: known(),
            places: vec![Place { name: "Hundepark".into(), address: "Berlin".into(), rating: Rating::Score(4.6) }],
        }
        .render();
        assert!(prompt.contains("The user's location is City: Berlin, Street: Unter den Linden."));
        assert!(prompt.contains("- Hundepark (Berlin, Rating: 4.6)"));
        assert!(!prompt.contains("ask the user where they are"));
    }

    #[test]
    fn unknown_location_asks_user() {
        let prompt = PromptContext { location: LocationContext::Unknown, places: Vec::new() }.render();
        assert!(prompt.contains("unknown location"));
        assert!(prompt.contains("ask the user where they are"));
        assert!(prompt.contains("search_places"));
    }

    #[test]
    fn token_response_mirrors_credential() {
        let outcome = BootstrapOutcome {
            credential: "ek_1".into(),
            expires_at: 99,
            prompt: PromptContext { location: known(), places: Vec::new() },
        };
        let body = serde_json::to_value(TokenResponse::from(outcome)).unwrap();
        assert_eq!(body["credential"], "ek_1");
        assert_eq!(body["client_secret"]["value"], "ek_1");
        assert_eq!(body["client_secret"]["expires_at"], 99);
        assert_eq!(body["location"], "City: Berlin, Street: Unter den Linden");
    }
}
