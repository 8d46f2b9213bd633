// src/error.rs
// =============================================================================
// Error types shared across the crawler and the renderer.
//
// Each boundary gets its own enum so callers can react to the failure kind:
// - FetchError: one page or asset could not be retrieved (never fatal)
// - SessionError: a crawl could not start, or an on-demand page failed
// - ProtocolError: an inbound WebSocket message could not be understood
// - RenderError: the browser service failed to produce an image
//
// The application edge (main.rs and the subcommand handlers) uses
// anyhow::Result instead, because there we only report errors.
// =============================================================================

use std::time::Duration;

use thiserror::Error;

/// A single fetch failed. The crawl reports it and moves on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("not an HTML page (content-type: {content_type})")]
    NotHtml { content_type: String },

    #[error("request timed out")]
    Timeout,

    #[error("host not allowed: {0}")]
    DomainNotAllowed(String),

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// A crawl or on-demand fetch could not be carried out.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Error processing {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// An inbound message could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid message: binary frames must be UTF-8 JSON")]
    NotUtf8,
}

/// The render engine could not produce a screenshot.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render timed out after {0:?}")]
    Timeout(Duration),

    #[error("navigation failed (status {status}): {message}")]
    Navigation { status: u16, message: String },

    #[error("render service unreachable: {0}")]
    Network(String),

    #[error("renderer shut down before the screenshot was taken")]
    Cancelled,
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        RenderError::Network(err.to_string())
    }
}
