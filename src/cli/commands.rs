use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::Semaphore;

use crate::app::{CleanwebError, Result};
use crate::cli::Cli;
use crate::config::ParserConfig;
use crate::domain::{Article, OutputFormat};
use crate::fetcher::RetrievalMode;
use crate::parser::{Parser, ParserBuilder};

/// Resolve the effective configuration: file, then environment, then flags.
pub fn load_config(cli: &Cli) -> anyhow::Result<ParserConfig> {
    let config = match cli.config {
        Some(ref path) => ParserConfig::load(path)?,
        None => ParserConfig::load_default()?,
    };
    let mut config = config.apply_env();

    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
        config.timeout_ms = None;
    }
    if cli.markdown {
        config.format = OutputFormat::Markdown;
    }
    if let Some(ref endpoint) = cli.browser_url {
        config.browser.endpoint = Some(endpoint.clone());
        config.mode = RetrievalMode::Browser;
    }
    if cli.browser {
        config.mode = RetrievalMode::Browser;
        if config.browser.endpoint.is_none() {
            config.browser.endpoint = Some(config.browser.resolve_endpoint());
        }
    }

    Ok(config)
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = config.format;
    let parser = Arc::new(ParserBuilder::from_config(config).build()?);

    if let Some(ref path) = cli.html {
        let [url] = cli.urls.as_slice() else {
            bail!("--html takes exactly one URL, got {}", cli.urls.len());
        };
        let article = parse_file(&parser, path, url)?;
        print_article(url, &article, cli.json)?;
        return Ok(());
    }

    let results = parse_urls(parser, cli.urls.clone(), format, cli.workers).await;

    let total = results.len();
    let mut errors = 0;
    for (url, result) in results {
        match result {
            Ok(article) => print_article(&url, &article, cli.json)?,
            Err(e) => {
                errors += 1;
                eprintln!("Error: {}", e);
            }
        }
    }

    if errors > 0 {
        bail!("{} of {} pages failed", errors, total);
    }
    Ok(())
}

/// Parse markup from a local file as if it had been fetched from `url`
pub fn parse_file(parser: &Parser, path: &Path, url: &str) -> anyhow::Result<Article> {
    let markup = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parser.parse_markup(&markup, url)?)
}

/// Parse several URLs concurrently, at most `workers` at a time.
/// Results come back in input order.
pub async fn parse_urls(
    parser: Arc<Parser>,
    urls: Vec<String>,
    format: OutputFormat,
    workers: usize,
) -> Vec<(String, Result<Article>)> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::new();

    for url in urls {
        let parser = parser.clone();
        let semaphore = semaphore.clone();
        let target = url.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            parser.parse(&target, format).await
        });

        handles.push((url, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (url, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Task join error for {}: {}", url, e);
                Err(CleanwebError::Task {
                    url: url.clone(),
                    reason: e.to_string(),
                })
            }
        };
        results.push((url, result));
    }

    results
}

fn print_article(url: &str, article: &Article, json: bool) -> anyhow::Result<()> {
    if json {
        let value = serde_json::json!({ "url": url, "article": article });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", article.display_title());
    if let Some(ref byline) = article.byline {
        println!("By {}", byline);
    }
    if let Some(ref site) = article.site_name {
        println!("{}", site);
    }
    println!("{}\n", url);
    println!("{}", article.content);
    Ok(())
}
