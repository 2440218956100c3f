use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Empty query string for endpoints that take no parameters.
pub(crate) const NO_QUERY: &[(&str, &str)] = &[];

/// Thin authenticated wrapper over `reqwest` for the resource endpoints.
///
/// Every request carries the bearer token. A success status decodes the body as
/// JSON; anything else becomes [`Error::Authentication`] or [`Error::Request`]
/// with the status and body attached. Requests are attempted exactly once.
pub struct ApiClient {
    client: Client,
    api_url: String,
    access_token: String,
}

impl ApiClient {
    pub fn new(client: Client, api_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        ApiClient {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Appends `segments` to the API URL with a trailing slash. Each segment is
    /// percent-encoded, so `/`, `?` or `#` inside one stay part of that segment.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be used as a base URL", self.api_url)))?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    pub async fn get<T, Q>(&self, segments: &[&str], query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.url(segments)?;
        debug!(%url, "GET");

        let response = self
            .client
            .get(url.clone())
            .header(AUTHORIZATION, format!("Bearer {token}", token = self.access_token))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%url, %status, "response received");

        if status.is_success() {
            Ok(serde_json::from_str::<T>(&body)?)
        } else {
            Err(Error::from_status(status, body))
        }
    }
}
