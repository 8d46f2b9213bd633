// src/render/mod.rs
// =============================================================================
// The renderer: turns crawled pages into screenshots.
//
// The renderer is a separate process from the crawl server. It keeps a
// WebSocket link to the crawler, caches every processed page it hears
// about, and answers screenshot requests once the page content is known.
//
// Pieces:
// - cache.rs: ContentCache, pages keyed by normalized URL
// - coordinator.rs: RenderCoordinator, decides when a queued request can render
// - engine.rs: RenderEngine trait plus the Browserless HTTP implementation
// - link.rs: reconnecting WebSocket client to the crawl server
// - service.rs: the actor that ties them together, and the HTTP API
// =============================================================================

mod cache;
mod coordinator;
mod engine;
mod link;
mod service;

use serde::{Deserialize, Serialize};

pub use service::run_renderer;

/// How the screenshot queue treats a head request whose page isn't here yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum QueuePolicy {
    /// Requests render strictly in arrival order; a waiting head blocks the rest.
    #[default]
    StrictFifo,
    /// Any request whose page is cached may render, keeping arrival order among them.
    ScanForReady,
}

/// Browser window size for screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}
