pub mod commands;

use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Parser)]
#[command(name = "cleanweb")]
#[command(about = "Fetch web pages and extract their readable content", long_about = None)]
pub struct Cli {
    /// URLs to parse
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Convert the article content to Markdown
    #[arg(short, long)]
    pub markdown: bool,

    /// Render pages in a browser instead of fetching them directly
    #[arg(short, long)]
    pub browser: bool,

    /// DevTools endpoint of the browser (implies --browser)
    #[arg(long, value_name = "WS")]
    pub browser_url: Option<String>,

    /// Request timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Config file (default: ~/.config/cleanweb/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Parse a local HTML file instead of fetching; requires exactly one URL
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,

    /// Print articles as JSON
    #[arg(long)]
    pub json: bool,

    /// Number of URLs parsed concurrently
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
}
