use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{CleanwebError, Result};
use crate::cache::{self, MemoryCache, NoCache, ResultCache, SqliteCache};
use crate::config::{CacheBackend, ConfigError, ParserConfig};
use crate::domain::{Article, CacheKey, OutputFormat};
use crate::extract::{ContentExtractor, MarkdownConverter, MarkupConverter, ReadabilityExtractor};
use crate::fetcher::{ChromeFetcher, ClientProfile, HttpFetcher, RetrievalMode, Retriever};

/// Fetches pages, extracts their readable content and memoizes the result
/// per (target, output format).
///
/// Only a fully successful pipeline run is ever written to the cache.
pub struct Parser {
    config: ParserConfig,
    retriever: Arc<dyn Retriever>,
    extractor: Arc<dyn ContentExtractor>,
    converter: Arc<dyn MarkupConverter>,
    cache: Arc<dyn ResultCache<Article>>,
    cleanup: Option<JoinHandle<()>>,
}

impl Parser {
    pub fn builder() -> ParserBuilder {
        ParserBuilder::new()
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn mode(&self) -> RetrievalMode {
        self.retriever.mode()
    }

    pub fn cache(&self) -> &Arc<dyn ResultCache<Article>> {
        &self.cache
    }

    /// Fetch `target` and return its readable content in `format`.
    pub async fn parse(&self, target: &str, format: OutputFormat) -> Result<Article> {
        self.parse_with_cancel(target, format, &CancellationToken::new())
            .await
    }

    /// Like [`parse`](Self::parse); triggering `cancel` aborts an in-flight fetch.
    pub async fn parse_with_cancel(
        &self,
        target: &str,
        format: OutputFormat,
        cancel: &CancellationToken,
    ) -> Result<Article> {
        let url = parse_target(target)?;
        let key = CacheKey::new(&url, format);

        if let Some(article) = self.cached(&key) {
            debug!("Cache hit for {} ({})", url, format);
            return Ok(article);
        }
        debug!("Cache miss for {} ({})", url, format);

        let retrieved = self
            .retriever
            .fetch(&url, cancel)
            .await
            .map_err(|source| CleanwebError::Retrieval {
                url: target.to_string(),
                source,
            })?;

        info!(
            "Fetched {} ({} bytes) via {}",
            url,
            retrieved.html.len(),
            retrieved.mode
        );

        self.process(&retrieved.html, &url, target, format, &key)
    }

    /// Run extraction on markup the caller already has, in the configured format.
    pub fn parse_markup(&self, markup: &str, target: &str) -> Result<Article> {
        self.parse_markup_as(markup, target, self.config.format)
    }

    /// Run extraction on markup the caller already has. Never reads the
    /// cache; a successful result replaces any cached entry.
    pub fn parse_markup_as(
        &self,
        markup: &str,
        target: &str,
        format: OutputFormat,
    ) -> Result<Article> {
        let url = parse_target(target)?;
        let key = CacheKey::new(&url, format);
        self.process(markup, &url, target, format, &key)
    }

    fn process(
        &self,
        html: &str,
        url: &Url,
        target: &str,
        format: OutputFormat,
        key: &CacheKey,
    ) -> Result<Article> {
        let mut article =
            self.extractor
                .extract(html, url)
                .map_err(|source| CleanwebError::Extraction {
                    url: target.to_string(),
                    source,
                })?;

        if format.is_markdown() {
            article.content = self.converter.convert(&article.content).map_err(|source| {
                CleanwebError::Conversion {
                    url: target.to_string(),
                    source,
                }
            })?;
        }

        if let Err(e) = self.cache.set_default(key, &article) {
            warn!("Failed to cache {}: {}", url, e);
        }

        Ok(article)
    }

    fn cached(&self, key: &CacheKey) -> Option<Article> {
        match self.cache.get(key) {
            Ok(article) => article,
            Err(e) => {
                warn!("Cache lookup failed, treating as miss: {}", e);
                None
            }
        }
    }
}

impl Drop for Parser {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup.take() {
            handle.abort();
        }
    }
}

fn parse_target(target: &str) -> Result<Url> {
    let url = Url::parse(target).map_err(|source| CleanwebError::UrlParse {
        input: target.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(CleanwebError::UnsupportedScheme {
            url: target.to_string(),
            scheme: scheme.to_string(),
        }),
    }
}

/// Assembles a [`Parser`]. Settings are validated once, in [`build`](Self::build).
#[derive(Default)]
pub struct ParserBuilder {
    config: ParserConfig,
    retriever: Option<Arc<dyn Retriever>>,
    extractor: Option<Arc<dyn ContentExtractor>>,
    converter: Option<Arc<dyn MarkupConverter>>,
    cache: Option<Arc<dyn ResultCache<Article>>>,
}

impl ParserBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ParserConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Request timeout, rounded up to whole milliseconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_millis() + u128::from(timeout.subsec_nanos() % 1_000_000 > 0);
        self.config.timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn mode(mut self, mode: RetrievalMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Retrieve through the browser at `endpoint`
    pub fn browser_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.browser.endpoint = Some(endpoint.into());
        self.config.mode = RetrievalMode::Browser;
        self
    }

    /// Retrieve through the browser named by `BROWSER_CONTROL_URL`, or the
    /// local default endpoint
    pub fn browser_from_env(self) -> Self {
        let endpoint = self.config.browser.resolve_endpoint();
        self.browser_endpoint(endpoint)
    }

    pub fn profile(mut self, profile: ClientProfile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn reject_error_status(mut self, reject: bool) -> Self {
        self.config.reject_error_status = reject;
        self
    }

    /// Use `cache` instead of the configured backend. It may be shared
    /// with other parsers.
    pub fn cache(mut self, cache: Arc<dyn ResultCache<Article>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a custom retrieval strategy instead of the configured mode
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn MarkupConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn build(self) -> Result<Parser> {
        self.config.validate()?;

        let retriever = match self.retriever {
            Some(retriever) => retriever,
            None => build_retriever(&self.config)?,
        };

        let (cache, cleanup) = match self.cache {
            Some(cache) => (cache, None),
            None => build_cache(&self.config)?,
        };

        let extractor: Arc<dyn ContentExtractor> = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(ReadabilityExtractor),
        };
        let converter: Arc<dyn MarkupConverter> = match self.converter {
            Some(converter) => converter,
            None => Arc::new(MarkdownConverter),
        };

        Ok(Parser {
            config: self.config,
            retriever,
            extractor,
            converter,
            cache,
            cleanup,
        })
    }
}

fn build_retriever(config: &ParserConfig) -> Result<Arc<dyn Retriever>> {
    match config.mode {
        RetrievalMode::Direct => {
            let fetcher = HttpFetcher::new(config.profile, config.timeout())
                .map_err(|e| {
                    ConfigError::Invalid(format!("Failed to build HTTP client: {}", e))
                })?
                .reject_error_status(config.reject_error_status);
            let fetcher: Arc<dyn Retriever> = Arc::new(fetcher);
            Ok(fetcher)
        }
        RetrievalMode::Browser => {
            let fetcher = match config.browser.endpoint {
                Some(ref endpoint) => ChromeFetcher::new(endpoint.clone(), config.timeout()),
                None => ChromeFetcher::unconfigured(config.timeout()),
            };
            let fetcher: Arc<dyn Retriever> = Arc::new(fetcher);
            Ok(fetcher)
        }
    }
}

type BuiltCache = (Arc<dyn ResultCache<Article>>, Option<JoinHandle<()>>);

fn build_cache(config: &ParserConfig) -> Result<BuiltCache> {
    let settings = &config.cache;
    let in_runtime = tokio::runtime::Handle::try_current().is_ok();

    match settings.backend {
        CacheBackend::Memory => {
            let cache = Arc::new(MemoryCache::<Article>::new(settings.ttl()));
            let cleanup = in_runtime
                .then(|| cache::spawn_cleanup::<Article, _>(&cache, settings.cleanup_interval()));
            Ok((cache as Arc<dyn ResultCache<Article>>, cleanup))
        }
        CacheBackend::Sqlite => {
            let path = settings.resolve_path()?;
            let cache = Arc::new(SqliteCache::<Article>::new(&path, settings.ttl())?);
            let cleanup = in_runtime
                .then(|| cache::spawn_cleanup::<Article, _>(&cache, settings.cleanup_interval()));
            Ok((cache as Arc<dyn ResultCache<Article>>, cleanup))
        }
        CacheBackend::Disabled => {
            let cache: Arc<dyn ResultCache<Article>> = Arc::new(NoCache::<Article>::new());
            Ok((cache, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ConvertError, ExtractError, RetrievalError};
    use crate::fetcher::Retrieved;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAGE: &str = "<html><body><article><p>Hello from the stub page.</p></article></body></html>";
    const TARGET: &str = "https://example.com/post";

    /// Serves fixed markup, failing the first `failures` calls
    struct StubRetriever {
        html: String,
        calls: AtomicUsize,
        failures: AtomicUsize,
    }

    impl StubRetriever {
        fn new(html: &str) -> Arc<Self> {
            Self::failing(html, 0)
        }

        fn failing(html: &str, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                html: html.to_string(),
                calls: AtomicUsize::new(0),
                failures: AtomicUsize::new(failures),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Retriever for StubRetriever {
        async fn fetch(
            &self,
            _url: &Url,
            cancel: &CancellationToken,
        ) -> std::result::Result<Retrieved, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return Err(RetrievalError::Cancelled);
            }
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(RetrievalError::Browser("stub failure".into()));
            }
            Ok(Retrieved {
                html: self.html.clone(),
                mode: RetrievalMode::Direct,
            })
        }

        fn mode(&self) -> RetrievalMode {
            RetrievalMode::Direct
        }
    }

    /// Accepts any markup containing an `<article>` element
    struct StubExtractor;

    impl ContentExtractor for StubExtractor {
        fn extract(&self, html: &str, base: &Url) -> std::result::Result<Article, ExtractError> {
            if !html.contains("<article>") {
                return Err(ExtractError("no article element".into()));
            }
            Ok(Article {
                title: base.path().to_string(),
                content: html.to_string(),
                length: html.len(),
                ..Default::default()
            })
        }
    }

    struct PrefixConverter;

    impl MarkupConverter for PrefixConverter {
        fn convert(&self, html: &str) -> std::result::Result<String, ConvertError> {
            Ok(format!("md:{}", html))
        }
    }

    struct FailingConverter;

    impl MarkupConverter for FailingConverter {
        fn convert(&self, _html: &str) -> std::result::Result<String, ConvertError> {
            Err(ConvertError("malformed fragment".into()))
        }
    }

    /// Every operation fails
    struct BrokenCache;

    impl ResultCache<Article> for BrokenCache {
        fn get(&self, _key: &CacheKey) -> Result<Option<Article>> {
            Err(CleanwebError::Cache("disk on fire".into()))
        }
        fn set(&self, _key: &CacheKey, _value: &Article, _ttl: Duration) -> Result<()> {
            Err(CleanwebError::Cache("disk on fire".into()))
        }
        fn default_ttl(&self) -> Duration {
            cache::DEFAULT_TTL
        }
        fn purge_expired(&self) -> Result<usize> {
            Ok(0)
        }
        fn len(&self) -> Result<usize> {
            Ok(0)
        }
    }

    fn parser_with(retriever: Arc<StubRetriever>) -> Parser {
        Parser::builder()
            .retriever(retriever)
            .extractor(Arc::new(StubExtractor))
            .converter(Arc::new(PrefixConverter))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_parse_served_from_cache() {
        let retriever = StubRetriever::new(PAGE);
        let parser = parser_with(retriever.clone());

        for format in [OutputFormat::Html, OutputFormat::Markdown] {
            let first = parser.parse(TARGET, format).await.unwrap();
            let second = parser.parse(TARGET, format).await.unwrap();
            assert_eq!(first, second);
        }

        // Once per format
        assert_eq!(retriever.calls(), 2);
    }

    #[tokio::test]
    async fn test_formats_do_not_collide() {
        let retriever = StubRetriever::new(PAGE);
        let parser = parser_with(retriever.clone());

        let html = parser.parse(TARGET, OutputFormat::Html).await.unwrap();
        let markdown = parser.parse(TARGET, OutputFormat::Markdown).await.unwrap();

        assert_eq!(retriever.calls(), 2);
        assert_eq!(html.content, PAGE);
        assert_eq!(markdown.content, format!("md:{}", PAGE));
        assert_eq!(parser.cache().len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_parse_markup_matches_parse() {
        let fetched = parser_with(StubRetriever::new(PAGE))
            .parse(TARGET, OutputFormat::Markdown)
            .await
            .unwrap();

        let retriever = StubRetriever::new("unused");
        let parser = Parser::builder()
            .retriever(retriever.clone())
            .extractor(Arc::new(StubExtractor))
            .converter(Arc::new(PrefixConverter))
            .format(OutputFormat::Markdown)
            .build()
            .unwrap();
        let direct = parser.parse_markup(PAGE, TARGET).unwrap();

        assert_eq!(fetched, direct);
        assert_eq!(retriever.calls(), 0);

        // parse_markup populates the cache for later fetches
        let cached = parser.parse(TARGET, OutputFormat::Markdown).await.unwrap();
        assert_eq!(cached, direct);
        assert_eq!(retriever.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_url_never_retrieves() {
        let retriever = StubRetriever::new(PAGE);
        let parser = parser_with(retriever.clone());

        let err = parser
            .parse("not-a-url", OutputFormat::Html)
            .await
            .unwrap_err();

        assert!(matches!(err, CleanwebError::UrlParse { .. }));
        assert_eq!(retriever.calls(), 0);
        assert!(parser.parse_markup(PAGE, "not-a-url").unwrap_err().is_url_parse());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_never_retrieves() {
        let retriever = StubRetriever::new(PAGE);
        let parser = parser_with(retriever.clone());

        let err = parser
            .parse("ftp://example.com/file", OutputFormat::Html)
            .await
            .unwrap_err();

        assert!(matches!(err, CleanwebError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"));
        assert_eq!(retriever.calls(), 0);
    }

    #[tokio::test]
    async fn test_browser_mode_without_session_is_unavailable() {
        let parser = Parser::builder()
            .mode(RetrievalMode::Browser)
            .build()
            .unwrap();
        assert_eq!(parser.mode(), RetrievalMode::Browser);

        let err = parser.parse(TARGET, OutputFormat::Html).await.unwrap_err();

        assert!(matches!(
            err.retrieval_error(),
            Some(RetrievalError::BrowserUnavailable(_))
        ));
        assert!(err.to_string().contains(TARGET));
        assert!(parser.cache().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_failed_retrieval_is_not_cached() {
        let retriever = StubRetriever::failing(PAGE, 1);
        let parser = parser_with(retriever.clone());

        let err = parser.parse(TARGET, OutputFormat::Html).await.unwrap_err();
        assert!(err.is_retrieval());
        assert!(parser.cache().is_empty().unwrap());

        let article = parser.parse(TARGET, OutputFormat::Html).await.unwrap();
        assert_eq!(article.content, PAGE);
        assert_eq!(retriever.calls(), 2);
        assert_eq!(parser.cache().len().unwrap(), 1);

        parser.parse(TARGET, OutputFormat::Html).await.unwrap();
        assert_eq!(retriever.calls(), 2);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_not_cached() {
        let retriever = StubRetriever::new("<html><body>nothing here</body></html>");
        let parser = parser_with(retriever.clone());

        for _ in 0..2 {
            let err = parser.parse(TARGET, OutputFormat::Html).await.unwrap_err();
            assert!(err.is_extraction());
        }
        assert_eq!(retriever.calls(), 2);
        assert!(parser.cache().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_conversion_failure_is_not_cached() {
        let retriever = StubRetriever::new(PAGE);
        let parser = Parser::builder()
            .retriever(retriever.clone())
            .extractor(Arc::new(StubExtractor))
            .converter(Arc::new(FailingConverter))
            .build()
            .unwrap();

        let err = parser
            .parse(TARGET, OutputFormat::Markdown)
            .await
            .unwrap_err();
        assert!(err.is_conversion());
        assert!(parser.cache().is_empty().unwrap());

        // The converter only runs for markdown output
        let article = parser.parse(TARGET, OutputFormat::Html).await.unwrap();
        assert_eq!(article.content, PAGE);
        assert_eq!(parser.cache().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_parse_is_not_cached() {
        let retriever = StubRetriever::new(PAGE);
        let parser = parser_with(retriever.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = parser
            .parse_with_cancel(TARGET, OutputFormat::Html, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err.retrieval_error(),
            Some(RetrievalError::Cancelled)
        ));
        assert!(parser.cache().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_cache_failures_do_not_fail_parse() {
        let retriever = StubRetriever::new(PAGE);
        let parser = Parser::builder()
            .retriever(retriever.clone())
            .extractor(Arc::new(StubExtractor))
            .cache(Arc::new(BrokenCache))
            .build()
            .unwrap();

        parser.parse(TARGET, OutputFormat::Html).await.unwrap();
        parser.parse(TARGET, OutputFormat::Html).await.unwrap();
        assert_eq!(retriever.calls(), 2);
    }

    #[tokio::test]
    async fn test_shared_cache_across_parsers() {
        let shared: Arc<dyn ResultCache<Article>> =
            Arc::new(MemoryCache::<Article>::new(cache::DEFAULT_TTL));

        let first_retriever = StubRetriever::new(PAGE);
        let second_retriever = StubRetriever::new(PAGE);
        let first = Parser::builder()
            .retriever(first_retriever.clone())
            .extractor(Arc::new(StubExtractor))
            .cache(shared.clone())
            .build()
            .unwrap();
        let second = Parser::builder()
            .retriever(second_retriever.clone())
            .extractor(Arc::new(StubExtractor))
            .cache(shared)
            .build()
            .unwrap();

        first.parse(TARGET, OutputFormat::Html).await.unwrap();
        second.parse(TARGET, OutputFormat::Html).await.unwrap();

        assert_eq!(first_retriever.calls(), 1);
        assert_eq!(second_retriever.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_retrieves() {
        let retriever = StubRetriever::new(PAGE);
        let mut config = ParserConfig::default();
        config.cache.backend = CacheBackend::Disabled;

        let parser = ParserBuilder::from_config(config)
            .retriever(retriever.clone())
            .extractor(Arc::new(StubExtractor))
            .build()
            .unwrap();

        parser.parse(TARGET, OutputFormat::Html).await.unwrap();
        parser.parse(TARGET, OutputFormat::Html).await.unwrap();
        assert_eq!(retriever.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_parses() {
        let retriever = StubRetriever::new(PAGE);
        let parser = Arc::new(parser_with(retriever.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let parser = parser.clone();
                tokio::spawn(async move {
                    parser
                        .parse(&format!("{}/{}", TARGET, i), OutputFormat::Html)
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(retriever.calls(), 8);
        assert_eq!(parser.cache().len().unwrap(), 8);
    }

    #[test]
    fn test_builder_validates_config() {
        let result = Parser::builder().timeout(Duration::ZERO).build();
        assert!(matches!(
            result,
            Err(CleanwebError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_builder_keeps_sub_second_timeout() {
        let parser = Parser::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        assert_eq!(parser.config().timeout(), Duration::from_millis(200));

        let builder = Parser::builder().timeout(Duration::from_micros(1));
        assert_eq!(builder.config.timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_builder_setters() {
        let builder = Parser::builder()
            .timeout(Duration::from_millis(1500))
            .format(OutputFormat::Markdown)
            .profile(ClientProfile::Firefox)
            .reject_error_status(true)
            .browser_endpoint("ws://127.0.0.1:9222");

        assert_eq!(builder.config.timeout(), Duration::from_millis(1500));
        assert_eq!(builder.config.format, OutputFormat::Markdown);
        assert_eq!(builder.config.profile, ClientProfile::Firefox);
        assert!(builder.config.reject_error_status);
        assert_eq!(builder.config.mode, RetrievalMode::Browser);
        assert_eq!(
            builder.config.browser.endpoint.as_deref(),
            Some("ws://127.0.0.1:9222")
        );
    }

    #[tokio::test]
    async fn test_default_pipeline_produces_markdown() {
        let html = r#"<html><head><title>Pipeline</title></head><body><article>
            <p>The default pipeline runs the readability extractor over the page and then converts the readable content into Markdown.</p>
            <p>This second paragraph carries <strong>strong emphasis</strong> so the conversion step has something to rewrite.</p>
            </article></body></html>"#;

        let parser = Parser::builder()
            .format(OutputFormat::Markdown)
            .retriever(StubRetriever::new(html))
            .build()
            .unwrap();

        let article = parser.parse_markup(html, TARGET).unwrap();
        assert_eq!(article.title, "Pipeline");
        assert!(article.content.contains("**strong emphasis**"));
        assert!(!article.content.contains("<p>"));
    }
}
