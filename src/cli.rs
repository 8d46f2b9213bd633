// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Three subcommands:
// - serve:  run the crawl server (WebSocket endpoint)
// - render: run the screenshot renderer (HTTP API + link to the crawler)
// - crawl:  crawl one site right here and print what was found
//
// Every tunable also reads an environment variable, so the two servers can
// be configured from a container's environment without flags.
//
// Rust concepts:
// - Derive macros: clap generates the parser from the struct definitions
// - Args structs: each subcommand owns its flags and converts them into
//   a config struct
// =============================================================================

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{CrawlConfig, HeartbeatConfig, RendererConfig, ServerConfig};
use crate::render::{QueuePolicy, Viewport};

// This struct represents our entire CLI application
#[derive(Parser, Debug)]
#[command(
    name = "site-snapper",
    version = "0.1.0",
    about = "Crawl a website, sanitize its pages, and take screenshots of them",
    long_about = "site-snapper crawls a single website and streams sanitized pages over a WebSocket. \
                  A separate renderer process caches those pages and turns them into PNG screenshots on request."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the crawl server
    ///
    /// Example: site-snapper serve --bind 0.0.0.0:8000
    Serve(ServeArgs),

    /// Run the screenshot renderer
    ///
    /// Example: site-snapper render --crawler-url ws://localhost:8000/ws
    Render(RenderArgs),

    /// Crawl one website and print the results
    ///
    /// Example: site-snapper crawl https://example.com --json
    Crawl(CrawlArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address for the WebSocket endpoint (/ws)
    #[arg(long, env = "SNAPPER_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Maximum number of pages fetched at the same time per crawl
    #[arg(long, env = "SNAPPER_MAX_CONCURRENT", default_value_t = 5)]
    pub max_concurrent: usize,

    /// Per-request fetch timeout in seconds
    #[arg(long, env = "SNAPPER_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Seconds between heartbeat pings
    #[arg(long, env = "SNAPPER_PING_INTERVAL_SECS", default_value_t = 30)]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing the connection
    #[arg(long, env = "SNAPPER_PONG_TIMEOUT_SECS", default_value_t = 10)]
    pub pong_timeout_secs: u64,
}

impl ServeArgs {
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            crawl: CrawlConfig {
                max_concurrent: self.max_concurrent.max(1),
                fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            },
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(self.ping_interval_secs),
                timeout: Duration::from_secs(self.pong_timeout_secs),
            },
        }
    }
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Address for the HTTP API
    #[arg(long, env = "RENDERER_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// WebSocket URL of the crawl server
    #[arg(long, env = "CRAWLER_URL", default_value = "ws://127.0.0.1:8000/ws")]
    pub crawler_url: String,

    /// Base URL of the Browserless screenshot service
    #[arg(long, env = "BROWSERLESS_URL", default_value = "http://127.0.0.1:3001")]
    pub browserless_url: String,

    /// Browserless API token
    #[arg(long, env = "BROWSERLESS_TOKEN")]
    pub browserless_token: Option<String>,

    /// How queued screenshots wait for their pages
    #[arg(long, env = "RENDERER_QUEUE_POLICY", value_enum, default_value_t = QueuePolicy::StrictFifo)]
    pub queue_policy: QueuePolicy,

    /// Keep at most this many pages in the content cache (default: no limit)
    #[arg(long, env = "RENDERER_CACHE_MAX_ENTRIES")]
    pub cache_max_entries: Option<usize>,

    /// Screenshot width in pixels
    #[arg(long, env = "RENDERER_VIEWPORT_WIDTH", default_value_t = 1280)]
    pub viewport_width: u32,

    /// Screenshot height in pixels
    #[arg(long, env = "RENDERER_VIEWPORT_HEIGHT", default_value_t = 720)]
    pub viewport_height: u32,

    /// Seconds a screenshot request may wait before giving up
    #[arg(long, env = "RENDERER_SCREENSHOT_TIMEOUT_SECS", default_value_t = 60)]
    pub screenshot_timeout_secs: u64,

    /// Navigation timeout passed to the browser, in seconds
    #[arg(long, env = "RENDERER_RENDER_TIMEOUT_SECS", default_value_t = 30)]
    pub render_timeout_secs: u64,
}

impl RenderArgs {
    pub fn into_config(self) -> RendererConfig {
        RendererConfig {
            bind: self.bind,
            crawler_url: self.crawler_url,
            browserless_url: self.browserless_url,
            browserless_token: self.browserless_token,
            queue_policy: self.queue_policy,
            cache_max_entries: self.cache_max_entries,
            viewport: Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
            },
            screenshot_timeout: Duration::from_secs(self.screenshot_timeout_secs),
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            ..RendererConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Website URL to crawl (e.g., https://example.com)
    pub url: String,

    /// Output one JSON protocol message per line instead of a table
    #[arg(long)]
    pub json: bool,

    /// Maximum number of pages fetched at the same time
    #[arg(long, env = "SNAPPER_MAX_CONCURRENT", default_value_t = 5)]
    pub max_concurrent: usize,

    /// Per-request fetch timeout in seconds
    #[arg(long, env = "SNAPPER_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,
}

impl CrawlArgs {
    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            max_concurrent: self.max_concurrent.max(1),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_args_parse() {
        let cli = Cli::try_parse_from([
            "site-snapper",
            "render",
            "--queue-policy",
            "scan-for-ready",
            "--cache-max-entries",
            "500",
            "--viewport-width",
            "800",
        ])
        .unwrap();

        let Commands::Render(args) = cli.command else {
            panic!("expected render");
        };
        let config = args.into_config();
        assert_eq!(config.queue_policy, QueuePolicy::ScanForReady);
        assert_eq!(config.cache_max_entries, Some(500));
        assert_eq!(config.viewport, Viewport { width: 800, height: 720 });
        assert_eq!(config.screenshot_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["site-snapper", "serve"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.into_config();
        assert_eq!(config.crawl.max_concurrent, 5);
        assert_eq!(config.heartbeat.interval, Duration::from_secs(30));
        assert_eq!(config.heartbeat.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_crawl_requires_url() {
        assert!(Cli::try_parse_from(["site-snapper", "crawl"]).is_err());
        let cli = Cli::try_parse_from(["site-snapper", "crawl", "https://example.com", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Crawl(CrawlArgs { json: true, .. })));
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why an Args struct per subcommand?
//    - Each subcommand has its own flags
//    - into_config() turns the raw flags into the plain structs in config.rs,
//      so the rest of the program never depends on clap
//
// 2. What does env = "..." do?
//    - If the flag isn't given, clap reads that environment variable
//    - If neither is set, default_value / default_value_t is used
//
// 3. Why Option<String> for the token?
//    - The flag is optional with no default; None means "not set"
//
// 4. What is value_enum?
//    - It lets clap parse an enum from text: "strict-fifo" or "scan-for-ready"
// -----------------------------------------------------------------------------
