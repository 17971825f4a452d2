use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::deals::DealsConfig;

const DEFAULT_PAGE_URL: &str = "https://www.bigwatermelon.com.au/dailyspecials/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// MCP over Streamable HTTP plus the `/action` endpoint
    Http,
    /// MCP over stdin/stdout
    Stdio,
}

/// Serves Big Watermelon's daily specials, extracted from the store's promo
/// images with Gemini. Set `GEMINI_API_KEY` to enable extraction.
#[derive(Debug, Parser)]
#[command(name = "melon-deals", version, about)]
pub struct Cli {
    /// How clients reach the server
    #[arg(long, value_enum, default_value_t = Transport::Http, env = "MELON_DEALS_TRANSPORT")]
    pub transport: Transport,

    /// Listen address for the HTTP transport
    #[arg(long, default_value = "127.0.0.1:8080", env = "MELON_DEALS_BIND")]
    pub bind: SocketAddr,

    /// Same-day cache file
    #[arg(long, default_value = "offers.json", env = "MELON_DEALS_CACHE")]
    pub cache_file: PathBuf,

    /// Specials page to scrape for images
    #[arg(long, default_value = DEFAULT_PAGE_URL, env = "MELON_DEALS_PAGE_URL")]
    pub page_url: String,

    /// Maximum concurrent image downloads and extractions
    #[arg(
        long,
        default_value_t = 4,
        value_parser = clap::value_parser!(u16).range(1..=32),
        env = "MELON_DEALS_CONCURRENCY"
    )]
    pub concurrency: u16,
}

impl Cli {
    pub fn deals_config(&self) -> DealsConfig {
        DealsConfig {
            page_url: self.page_url.clone(),
            concurrency: usize::from(self.concurrency),
        }
    }
}
