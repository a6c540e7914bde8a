use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum CleanwebError {
    #[error("Failed to parse url {input}: {source}")]
    UrlParse {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported url scheme '{scheme}' in {url}")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("Failed to read url {url}: {source}")]
    Retrieval {
        url: String,
        #[source]
        source: RetrievalError,
    },

    #[error("Failed to parse {url}: {source}")]
    Extraction {
        url: String,
        #[source]
        source: ExtractError,
    },

    #[error("Failed to convert {url} to Markdown: {source}")]
    Conversion {
        url: String,
        #[source]
        source: ConvertError,
    },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Task for {url} did not complete: {reason}")]
    Task { url: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CleanwebError {
    pub fn is_url_parse(&self) -> bool {
        matches!(
            self,
            Self::UrlParse { .. } | Self::UnsupportedScheme { .. }
        )
    }

    pub fn is_retrieval(&self) -> bool {
        matches!(self, Self::Retrieval { .. })
    }

    pub fn is_extraction(&self) -> bool {
        matches!(self, Self::Extraction { .. })
    }

    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Conversion { .. })
    }

    /// The underlying retrieval failure, if this error came from fetching
    pub fn retrieval_error(&self) -> Option<&RetrievalError> {
        match self {
            Self::Retrieval { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CleanwebError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Cache(e.to_string())
    }
}

impl From<serde_json::Error> for CleanwebError {
    fn from(e: serde_json::Error) -> Self {
        Self::Cache(e.to_string())
    }
}

/// Failures while obtaining raw markup for a page
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Page did not finish loading within {0:?}")]
    NavigationTimeout(Duration),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Request cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
#[error("{0}")]
pub struct ExtractError(pub String);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct ConvertError(pub String);

pub type Result<T> = std::result::Result<T, CleanwebError>;
