use reqwest::{Client, Response, header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE}};
use crate::config::DEFAULT_OPENAI_BASE_URL;
use crate::protocol::models::SessionRequest;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

const SERVICE: &str = "realtime";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientSecret {
    pub value: String,
    pub expires_at: u64,
}

/// Ephemeral session minted for a browser or CLI client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralSession {
    pub client_secret: ClientSecret,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An adapter for the realtime REST endpoints.
#[derive(Clone)]
pub struct RealtimeRestAdapter {
    client: Client,
    auth_header: HeaderValue,
    base_url: String,
}

impl RealtimeRestAdapter {
    /// Create a new adapter against the public API.
    ///
    /// # Errors
    /// Returns an error if the API key results in an invalid header or client build fails.
    #[allow(clippy::result_large_err)]
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_OPENAI_BASE_URL)
    }

    /// # Errors
    /// Returns an error if the API key results in an invalid header or client build fails.
    #[allow(clippy::result_large_err)]
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        Self::new_with_timeouts(api_key, base_url, DEFAULT_TIMEOUT, DEFAULT_POOL_IDLE_TIMEOUT)
    }

    /// Create a new adapter with custom timeouts.
    ///
    /// # Errors
    /// Returns an error if the API key results in an invalid header or client build fails.
    #[allow(clippy::result_large_err)]
    pub fn new_with_timeouts(
        api_key: &str,
        base_url: &str,
        timeout: Duration,
        pool_idle_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(pool_idle_timeout)
            .build()?;

        Ok(Self {
            client,
            auth_header: bearer(api_key)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Mint an ephemeral session credential.
    ///
    /// # Errors
    /// [`Error::Transport`] on network failure, [`Error::Upstream`] on a non-success status.
    pub async fn create_session(&self, request: &SessionRequest) -> Result<EphemeralSession> {
        let res = self.client
            .post(format!("{}/sessions", self.base_url))
            .header(AUTHORIZATION, &self.auth_header)
            .json(request)
            .send()
            .await?;

        let session: EphemeralSession = check_status(res).await?.json().await?;
        tracing::debug!(expires_at = session.client_secret.expires_at, "ephemeral session created");
        Ok(session)
    }

    /// Post an SDP offer with an ephemeral credential and return the SDP answer.
    ///
    /// # Errors
    /// [`Error::Transport`] on network failure, [`Error::Upstream`] on a non-success status.
    pub async fn post_sdp_offer(&self, credential: &str, model: &str, sdp_offer: String) -> Result<String> {
        let res = self.client
            .post(&self.base_url)
            .query(&[("model", model)])
            .header(AUTHORIZATION, bearer(credential)?)
            .header(CONTENT_TYPE, "application/sdp")
            .body(sdp_offer)
            .send()
            .await?;

        Ok(check_status(res).await?.text().await?)
    }
}

impl std::fmt::Debug for RealtimeRestAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeRestAdapter").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

#[allow(clippy::result_large_err)]
pub(crate) fn bearer(secret: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {secret}"))?;
    value.set_sensitive(true);
    Ok(value)
}

// Error bodies are logged, never echoed: the caller only learns the status.
async fn check_status(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    tracing::debug!(%status, "realtime request rejected: {}", crate::safe_truncate(&body, 512));
    Err(Error::upstream(SERVICE, format!("request failed with HTTP {status}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_sensitive() {
        let header = bearer("ek_123").unwrap();
        assert!(header.is_sensitive());
        assert_eq!(header.to_str().unwrap(), "Bearer ek_123");
    }

    #[test]
    fn ephemeral_session_keeps_unknown_fields() {
        let session: EphemeralSession = serde_json::from_value(serde_json::json!({
            "id": "sess_1",
            "object": "realtime.session",
            "client_secret": { "value": "ek_abc", "expires_at": 1_700_000_000 }
        }))
        .unwrap();
        assert_eq!(session.client_secret.value, "ek_abc");
        assert_eq!(session.extra["object"], "realtime.session");
    }

    #[test]
    fn debug_hides_authorization() {
        let adapter = RealtimeRestAdapter::with_base_url("sk-secret", "http://localhost/v1/realtime/").unwrap();
        let rendered = format!("{adapter:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("http://localhost/v1/realtime"));
    }
}
