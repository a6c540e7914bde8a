//! Adapters for the two pure steps of the pipeline: readable-content
//! extraction and HTML → Markdown conversion.

mod markdown;
mod readability;

pub use markdown::MarkdownConverter;
pub use readability::ReadabilityExtractor;

use url::Url;

use crate::app::{ConvertError, ExtractError};
use crate::domain::Article;

/// Turns raw page markup into a readable [`Article`].
///
/// Implementations must not keep any parse tree alive past the call.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, html: &str, base: &Url) -> Result<Article, ExtractError>;
}

/// Converts an HTML fragment to lightweight markup
pub trait MarkupConverter: Send + Sync {
    fn convert(&self, html: &str) -> Result<String, ConvertError>;
}
