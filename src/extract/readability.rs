use scraper::{Html, Selector};
use url::Url;

use crate::app::ExtractError;
use crate::domain::Article;
use crate::extract::ContentExtractor;

const EXCERPT_MAX_CHARS: usize = 200;

const BYLINE_META: &[&str] = &[
    r#"meta[name="author"]"#,
    r#"meta[property="article:author"]"#,
    r#"meta[name="twitter:creator"]"#,
];
const BYLINE_ELEMENTS: &[&str] = &[r#"[rel="author"]"#, ".byline", ".author"];
const DESCRIPTION_META: &[&str] = &[
    r#"meta[name="description"]"#,
    r#"meta[property="og:description"]"#,
    r#"meta[name="twitter:description"]"#,
];
const SITE_NAME_META: &[&str] = &[r#"meta[property="og:site_name"]"#];
const TITLE_META: &[&str] = &[
    r#"meta[property="og:title"]"#,
    r#"meta[name="twitter:title"]"#,
];

/// Readability-based extractor with page metadata from `<meta>` tags
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadabilityExtractor;

impl ContentExtractor for ReadabilityExtractor {
    fn extract(&self, html: &str, base: &Url) -> Result<Article, ExtractError> {
        let product = ::readability::extractor::extract(&mut html.as_bytes(), base)
            .map_err(|e| ExtractError(e.to_string()))?;

        let text = product.text.trim();
        if text.is_empty() || product.content.trim().is_empty() {
            return Err(ExtractError("no readable content found".into()));
        }

        let meta = PageMeta::read(html);

        let title = if product.title.trim().is_empty() {
            meta.title.unwrap_or_default()
        } else {
            product.title.trim().to_string()
        };

        Ok(Article {
            title,
            byline: meta.byline,
            excerpt: meta.description.or_else(|| first_paragraph(text)),
            length: text.chars().count(),
            site_name: meta.site_name,
            content: product.content,
        })
    }
}

/// Metadata read from the document head. The parsed document is dropped
/// before this returns.
#[derive(Debug, Default)]
struct PageMeta {
    title: Option<String>,
    byline: Option<String>,
    description: Option<String>,
    site_name: Option<String>,
}

impl PageMeta {
    fn read(html: &str) -> Self {
        let document = Html::parse_document(html);
        Self {
            title: meta_content(&document, TITLE_META),
            byline: meta_content(&document, BYLINE_META)
                .or_else(|| element_text(&document, BYLINE_ELEMENTS)),
            description: meta_content(&document, DESCRIPTION_META),
            site_name: meta_content(&document, SITE_NAME_META),
        }
    }
}

fn meta_content(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .flat_map(|selector| {
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("content"))
                .map(|c| c.trim().to_string())
                .collect::<Vec<_>>()
        })
        .find(|c| !c.is_empty())
}

fn element_text(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .flat_map(|selector| {
            document
                .select(&selector)
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
        })
        .find(|t| !t.is_empty())
}

fn first_paragraph(text: &str) -> Option<String> {
    let paragraph = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let excerpt: String = paragraph.chars().take(EXCERPT_MAX_CHARS).collect();
    Some(excerpt)
}
