use std::fmt;

use serde::{Deserialize, Serialize};

/// Readable content extracted from a web page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub byline: Option<String>,
    /// HTML, or Markdown when the article was parsed with [`OutputFormat::Markdown`]
    pub content: String,
    pub excerpt: Option<String>,
    /// Character count of the readable text
    pub length: usize,
    pub site_name: Option<String>,
}

impl Article {
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }
}

/// Output format of [`Article::content`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Markdown,
}

impl OutputFormat {
    pub fn from_markdown_flag(markdown: bool) -> Self {
        if markdown {
            Self::Markdown
        } else {
            Self::Html
        }
    }

    pub fn is_markdown(self) -> bool {
        self == Self::Markdown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
