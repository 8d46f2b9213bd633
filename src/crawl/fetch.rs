// src/crawl/fetch.rs
// =============================================================================
// This module downloads pages and static assets.
//
// The worker pool only talks to the PageSource trait, never to reqwest
// directly. That keeps the scheduling logic testable: tests plug in an
// in-memory site instead of the network.
//
// HttpFetcher is the real implementation:
// - Sends a realistic browser User-Agent (many sites block obvious bots)
// - Follows up to 10 redirects
// - Applies one fixed timeout per request
// - Treats non-2xx statuses and non-HTML pages as errors
//
// Rust concepts:
// - Traits with async methods (via the async-trait crate)
// - Result<T, FetchError>: typed errors so callers can log the failure kind
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;

use crate::error::FetchError;

/// A current desktop Chrome User-Agent.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 10;

/// Where page markup and asset bytes come from.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches an HTML page and returns its markup.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;

    /// Fetches a static asset (stylesheet, font) as raw bytes.
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// PageSource backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        // A missing content-type is given the benefit of the doubt
        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            if !is_html_content_type(content_type) {
                return Err(FetchError::NotHtml {
                    content_type: content_type.to_string(),
                });
            }
        }

        Ok(response.text().await?)
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_html_content_types() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/HTML; charset=utf-8"));
        assert!(is_html_content_type("application/xhtml+xml"));
        assert!(!is_html_content_type("application/pdf"));
        assert!(!is_html_content_type("text/plain"));
    }

    #[tokio::test]
    async fn test_fetch_page_sends_browser_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", BROWSER_USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>hi</body></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let html = fetcher()
            .fetch_page(&format!("{}/page", server.uri()))
            .await
            .unwrap();
        assert!(html.contains("hi"));
    }

    #[tokio::test]
    async fn test_fetch_page_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_page(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404 }));
    }

    #[tokio::test]
    async fn test_fetch_page_rejects_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("%PDF-1.7", "application/pdf"))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_page(&format!("{}/report", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotHtml { .. }));
    }

    #[tokio::test]
    async fn test_fetch_asset_returns_raw_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site.css"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("body{margin:0}", "text/css"))
            .mount(&server)
            .await;

        let bytes = fetcher()
            .fetch_asset(&format!("{}/site.css", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"body{margin:0}".to_vec());
    }
}
