//! Fetching source documents over HTTP.
//!
//! [`HttpFetcher`] implements [`Fetcher`] with a shared `reqwest::Client`
//! built from the `download` config section (timeout, user agent). Both the
//! request and the body read give up with [`FetchError::Cancelled`] as soon as
//! the cancellation token fires.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::DownloadSection;
use crate::contract::Fetcher;
use crate::error::FetchError;

/// HttpFetcher downloads source documents with a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the download section of the config.
    pub fn from_config(config: &DownloadSection) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                error!(error = ?e, "Failed to build HTTP client for downloads");
                FetchError::Http(e)
            })?;
        debug!(
            timeout_secs = config.timeout_secs,
            user_agent = %config.user_agent,
            "Constructed HttpFetcher"
        );
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>, FetchError> {
        info!(url = %url, "Fetching source document");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(url = %url, "Download cancelled before response");
                return Err(FetchError::Cancelled);
            }
            res = self.client.get(url.clone()).send() => res,
        };

        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = ?e, url = %url, "Failed to send download request");
                return Err(FetchError::Http(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "Source document request returned error status");
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(url = %url, "Download cancelled while reading body");
                return Err(FetchError::Cancelled);
            }
            body = response.bytes() => body,
        };

        match body {
            Ok(bytes) => {
                info!(url = %url, bytes = bytes.len(), "Downloaded source document");
                Ok(bytes.to_vec())
            }
            Err(e) => {
                error!(error = ?e, url = %url, "Failed to read source document body");
                Err(FetchError::Http(e))
            }
        }
    }
}
