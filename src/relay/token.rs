use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{Error, ErrorBody, Result};

/// Supplies the short-lived credential a new session connects with.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

#[derive(Deserialize)]
struct CredentialBody {
    credential: String,
}

/// Fetches credentials from the backend's `GET /token`.
#[derive(Clone, Debug)]
pub struct HttpTokenSource {
    client: Client,
    url: String,
}

impl HttpTokenSource {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(backend_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, url: format!("{}/token", backend_url.trim_end_matches('/')) })
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch(&self) -> Result<String> {
        let res = self.client.get(&self.url).send().await?;
        let status = res.status();
        if !status.is_success() {
            let message = res
                .json::<ErrorBody>()
                .await
                .map_or_else(|_| format!("token request failed with HTTP {status}"), |body| body.error);
            return Err(Error::Bootstrap(message));
        }

        let body: CredentialBody = res
            .json()
            .await
            .map_err(|e| Error::Bootstrap(format!("unreadable token response: {e}")))?;
        Ok(body.credential)
    }
}
