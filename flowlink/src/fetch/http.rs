//! reqwest-backed fetcher.

use async_trait::async_trait;
use reqwest::Client;

use super::Fetcher;
use crate::errors::{FlowError, FlowResult};

/// A [`Fetcher`] backed by a shared reqwest client.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher from an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FlowResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| FlowError::operation_failed(format!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlowError::operation_failed(format!(
                "unexpected status {status} from {url}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| FlowError::operation_failed(format!("body read failed: {error}")))?;
        Ok(bytes.to_vec())
    }
}
