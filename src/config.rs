// src/config.rs
// =============================================================================
// Plain configuration structs for the crawler and the renderer.
//
// The CLI (cli.rs) fills these in from flags and environment variables.
// Everything below main.rs only sees these structs, so tests can build a
// config with Default and tweak a field or two.
// =============================================================================

use std::net::SocketAddr;
use std::time::Duration;

use crate::render::{QueuePolicy, Viewport};

/// How one crawl session fetches pages.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Upper bound on simultaneous page fetches.
    pub max_concurrent: usize,
    /// Timeout for a single HTTP request.
    pub fetch_timeout: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Ping/pong timing for a WebSocket connection.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
        }
    }
}

/// The crawl server: WebSocket endpoint plus per-connection crawl settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub crawl: CrawlConfig,
    pub heartbeat: HeartbeatConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            crawl: CrawlConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// Exponential reconnect delays for the renderer's link to the crawler.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// The renderer process: screenshot API, browser service, crawler link.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub bind: SocketAddr,
    /// WebSocket URL of the crawl server, e.g. ws://localhost:8000/ws
    pub crawler_url: String,
    /// Base URL of the Browserless-compatible screenshot service.
    pub browserless_url: String,
    pub browserless_token: Option<String>,
    pub queue_policy: QueuePolicy,
    /// None keeps every page for the life of the process.
    pub cache_max_entries: Option<usize>,
    pub viewport: Viewport,
    /// How long a screenshot request may wait for its page content.
    pub screenshot_timeout: Duration,
    /// Navigation timeout passed to the browser.
    pub render_timeout: Duration,
    pub reconnect: BackoffConfig,
    /// Pings the renderer sends to the crawler over its link.
    pub heartbeat: HeartbeatConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            crawler_url: "ws://127.0.0.1:8000/ws".to_string(),
            browserless_url: "http://127.0.0.1:3001".to_string(),
            browserless_token: None,
            queue_policy: QueuePolicy::StrictFifo,
            cache_max_entries: None,
            viewport: Viewport::default(),
            screenshot_timeout: Duration::from_secs(60),
            render_timeout: Duration::from_secs(30),
            reconnect: BackoffConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}
