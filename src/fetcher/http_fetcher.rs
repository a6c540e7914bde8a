use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::RetrievalError;
use crate::fetcher::{ClientProfile, RetrievalMode, Retrieved, Retriever};

/// Direct HTTP retrieval with a browser-like client identity
pub struct HttpFetcher {
    client: Client,
    reject_error_status: bool,
}

impl HttpFetcher {
    pub fn new(profile: ClientProfile, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = profile.client_builder(timeout).build()?;
        Ok(Self::with_client(client))
    }

    /// Use a pre-configured client as is
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            reject_error_status: false,
        }
    }

    /// Fail on non-2xx responses instead of passing error pages downstream
    pub fn reject_error_status(mut self, reject: bool) -> Self {
        self.reject_error_status = reject;
        self
    }

    async fn get(&self, url: &Url) -> Result<String, RetrievalError> {
        let response = self.client.get(url.as_str()).send().await?;

        let status = response.status();
        if !status.is_success() {
            if self.reject_error_status {
                return Err(RetrievalError::HttpStatus {
                    status: status.as_u16(),
                });
            }
            tracing::debug!("Passing through {} body for {}", status, url);
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl Retriever for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Retrieved, RetrievalError> {
        // Dropping the losing future releases the connection.
        let html = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            result = self.get(url) => result?,
        };

        Ok(Retrieved {
            html,
            mode: RetrievalMode::Direct,
        })
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Direct
    }
}
