//! # Cleanweb
//!
//! Fetch a web page, extract its readable content, optionally convert it to
//! Markdown, and memoize the result.
//!
//! ## Architecture
//!
//! ```text
//! target → cache lookup ─hit──────────────────────────────→ Article
//!            │ miss
//!            ↓
//!          Retriever (direct | browser) → Extractor → [Converter] → cache → Article
//! ```
//!
//! A failed step returns an error and leaves the cache untouched, so the
//! next call for the same page retries from scratch.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cleanweb::{OutputFormat, Parser};
//!
//! let parser = Parser::builder().build()?;
//! let article = parser.parse("https://example.com/post", OutputFormat::Markdown).await?;
//! println!("{}\n\n{}", article.title, article.content);
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Error types
//! - [`cache`]: Result cache backends
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: Parser configuration
//! - [`domain`]: Article, output format and cache key
//! - [`extract`]: Readable-content extraction and Markdown conversion
//! - [`fetcher`]: Direct and browser retrieval strategies
//! - [`parser`]: The orchestrating [`Parser`]

/// Error handling.
///
/// [`CleanwebError`](app::CleanwebError) carries the requested target on
/// every pipeline failure; [`RetrievalError`](app::RetrievalError)
/// distinguishes network, browser and cancellation failures.
pub mod app;

/// Memoization of parsed articles.
///
/// - [`ResultCache`](cache::ResultCache): Typed cache trait
/// - [`MemoryCache`](cache::MemoryCache): In-process TTL store (default)
/// - [`SqliteCache`](cache::SqliteCache): Persistent store
pub mod cache;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/cleanweb/config.toml`.
pub mod config;

/// Core domain models.
pub mod domain;

/// Extraction and conversion adapters.
pub mod extract;

/// Retrieval strategies.
///
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest with a browser-like client identity
/// - [`ChromeFetcher`](fetcher::ChromeFetcher): remote Chrome via chromiumoxide
pub mod fetcher;

pub mod parser;

pub use app::{CleanwebError, Result, RetrievalError};
pub use config::ParserConfig;
pub use domain::{Article, OutputFormat};
pub use fetcher::RetrievalMode;
pub use parser::{Parser, ParserBuilder};
