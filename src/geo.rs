//! Caller location: client IP extraction, IP geolocation, reverse geocoding.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::{Error, Result};

const UNKNOWN_CITY: &str = "Unknown City";
const UNKNOWN_STREET: &str = "Unknown Street";
const CITY_COMPONENTS: [&str; 3] = ["locality", "administrative_area_level_1", "political"];
const STREET_COMPONENTS: [&str; 2] = ["route", "intersection"];
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

impl FromStr for Coordinates {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Validation(format!("location must be \"lat,lon\", got {s:?}"));
        let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            lat: lat.trim().parse().map_err(|_| invalid())?,
            lon: lon.trim().parse().map_err(|_| invalid())?,
        })
    }
}

/// Human-readable address resolved from coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreetAddress {
    pub city: String,
    pub street: String,
}

impl Default for StreetAddress {
    fn default() -> Self {
        Self { city: UNKNOWN_CITY.to_string(), street: UNKNOWN_STREET.to_string() }
    }
}

impl std::fmt::Display for StreetAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "City: {}, Street: {}", self.city, self.street)
    }
}

/// Public address of the caller.
///
/// The first `X-Forwarded-For` hop wins over the socket peer. Loopback and
/// unspecified addresses carry no location, so they yield `None`.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    forwarded
        .or_else(|| peer.map(|addr| addr.ip()))
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
}

#[derive(Debug, Deserialize)]
struct IpGeoResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// IP → approximate coordinates.
#[derive(Clone, Debug)]
pub struct IpGeolocator {
    client: Client,
    base_url: String,
}

impl IpGeolocator {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    /// `None` when the provider cannot place the address.
    ///
    /// # Errors
    /// Returns an error on transport failure or an unparseable body.
    pub async fn locate(&self, ip: IpAddr) -> Result<Option<Coordinates>> {
        let res: IpGeoResponse = self
            .client
            .get(format!("{}/{ip}", self.base_url))
            .query(&[("fields", "status,lat,lon")])
            .send()
            .await?
            .json()
            .await?;

        if res.status != "success" {
            return Ok(None);
        }
        Ok(res.lat.zip(res.lon).map(|(lat, lon)| Coordinates { lat, lon }))
    }
}

#[derive(Debug, Default, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Clone, Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

fn pick(components: &[AddressComponent], priority: &[&str]) -> Option<String> {
    priority.iter().find_map(|kind| {
        components
            .iter()
            .find(|c| c.types.iter().any(|t| t == kind))
            .map(|c| c.long_name.clone())
    })
}

fn street_address(components: &[AddressComponent]) -> StreetAddress {
    let fallback = StreetAddress::default();
    StreetAddress {
        city: pick(components, &CITY_COMPONENTS).unwrap_or(fallback.city),
        street: pick(components, &STREET_COMPONENTS).unwrap_or(fallback.street),
    }
}

/// Coordinates → city / street.
#[derive(Clone)]
pub struct Geocoder {
    client: Client,
    base_url: String,
    api_key: String,
}

impl Geocoder {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { client, base_url: base_url.into(), api_key: api_key.into() })
    }

    /// Missing components fall back to `"Unknown City"` / `"Unknown Street"`.
    ///
    /// # Errors
    /// [`Error::Upstream`] when the provider reports a status other than
    /// `OK` / `ZERO_RESULTS`, [`Error::Transport`] on network failure or an
    /// unparseable body.
    pub async fn reverse(&self, coords: Coordinates) -> Result<StreetAddress> {
        let latlng = coords.to_string();
        let res: GeocodeResponse = self
            .client
            .get(&self.base_url)
            .query(&[("latlng", latlng.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(Error::transport)?
            .json()
            .await
            .map_err(Error::transport)?;

        match res.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            status => {
                let message = res.error_message.unwrap_or_else(|| format!("status {status}"));
                return Err(Error::upstream("geocode", message));
            }
        }

        let components = res.results.into_iter().next().unwrap_or_default().address_components;
        Ok(street_address(&components))
    }
}

impl std::fmt::Debug for Geocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geocoder").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}
