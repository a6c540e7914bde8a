pub mod chrome;
pub mod http_fetcher;
pub mod profile;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::RetrievalError;

pub use chrome::ChromeFetcher;
pub use http_fetcher::HttpFetcher;
pub use profile::ClientProfile;

/// Which strategy a parser uses to obtain raw markup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Plain HTTP GET with a browser-like client identity
    #[default]
    Direct,
    /// Render the page in a remote Chrome instance
    Browser,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Browser => f.write_str("browser"),
        }
    }
}

/// Raw markup and the strategy that produced it
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub html: String,
    pub mode: RetrievalMode,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Fetch the raw markup for `url`.
    ///
    /// Triggering `cancel` aborts the in-flight request and returns
    /// [`RetrievalError::Cancelled`].
    async fn fetch(&self, url: &Url, cancel: &CancellationToken)
        -> Result<Retrieved, RetrievalError>;

    fn mode(&self) -> RetrievalMode;
}
