//! Fetch collaborators used by `fetch_with_cache`.
//!
//! The cache treats a fetcher as opaque: it hands over a resource descriptor
//! and either gets a parsed payload back or an error it passes straight to
//! the caller.

use async_trait::async_trait;
use strata_core::{FetchError, StrataResult};

/// Source of truth consulted on a cache miss.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch and parse the payload identified by `resource`.
    async fn fetch(&self, resource: &str) -> StrataResult<serde_json::Value>;
}

/// JSON-over-HTTP fetcher.
///
/// Issues `GET base_url + resource`. Non-2xx responses become
/// `FetchError::Status`, connection problems `FetchError::Transport`, and
/// bodies that are not JSON `FetchError::Decode`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Full URL for a resource; absolute URLs are used as-is.
    pub fn url_for(&self, resource: &str) -> String {
        if resource.starts_with("http://") || resource.starts_with("https://") {
            return resource.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, resource: &str) -> StrataResult<serde_json::Value> {
        let url = self.url_for(resource);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                resource: resource.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                resource: resource.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let value = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| FetchError::Decode {
                resource: resource.to_string(),
                reason: e.to_string(),
            })?;

        Ok(value)
    }
}
