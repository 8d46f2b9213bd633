// src/render/engine.rs
// =============================================================================
// Turning sanitized markup into a PNG.
//
// RenderEngine is the seam: the renderer only needs "html in, image out".
// BrowserlessEngine implements it by POSTing the markup to a
// Browserless-compatible /screenshot endpoint, which drives headless Chrome
// for us.
//
// The crawler strips scripts and rewrites nothing else, so relative links in
// the markup still point at the original site. Before rendering we add a
// <base href> for the page URL so the browser resolves them correctly, and
// we inline any stylesheets the crawler shipped with the page.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use super::Viewport;
use crate::error::RenderError;

static HEAD_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").expect("valid regex"));
static HEAD_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</head\s*>").expect("valid regex"));
static BASE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<base[\s>]").expect("valid regex"));

#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn render_page(
        &self,
        html: &str,
        base_url: &str,
        viewport: &Viewport,
    ) -> Result<Vec<u8>, RenderError>;
}

pub struct BrowserlessEngine {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    navigation_timeout: Duration,
}

impl BrowserlessEngine {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        navigation_timeout: Duration,
    ) -> Result<Self, RenderError> {
        // Leave the browser room to report its own navigation timeout
        let client = reqwest::Client::builder()
            .timeout(navigation_timeout + Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            navigation_timeout,
        })
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!("{}/screenshot", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }
}

#[async_trait]
impl RenderEngine for BrowserlessEngine {
    async fn render_page(
        &self,
        html: &str,
        base_url: &str,
        viewport: &Viewport,
    ) -> Result<Vec<u8>, RenderError> {
        let body = json!({
            "html": with_base_href(html, base_url),
            "viewport": viewport,
            "options": { "type": "png", "fullPage": true },
            "gotoOptions": {
                "waitUntil": "networkidle2",
                "timeout": self.navigation_timeout.as_millis() as u64,
            },
        });

        debug!(url = %base_url, bytes = html.len(), "requesting screenshot");

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RenderError::Timeout(self.navigation_timeout)
                } else {
                    RenderError::from(e)
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::REQUEST_TIMEOUT {
            return Err(RenderError::Timeout(self.navigation_timeout));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RenderError::Navigation {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

/// Adds `<base href="base_url">` unless the markup already has a base tag.
pub fn with_base_href(html: &str, base_url: &str) -> String {
    if BASE_TAG.is_match(html) {
        return html.to_string();
    }

    let tag = format!(r#"<base href="{}">"#, base_url.replace('"', "&quot;"));
    match HEAD_OPEN.find(html) {
        Some(head) => format!("{}{}{}", &html[..head.end()], tag, &html[head.end()..]),
        None => format!("<head>{}</head>{}", tag, html),
    }
}

/// Appends the page's stylesheets as inline <style> blocks.
///
/// Resources that aren't valid UTF-8 (fonts, images) are left out; the
/// browser fetches those itself through the base URL.
pub fn inline_stylesheets(html: &str, resources: &BTreeMap<String, Vec<u8>>) -> String {
    let styles: String = resources
        .iter()
        .filter_map(|(url, bytes)| {
            let css = std::str::from_utf8(bytes).ok()?;
            Some(format!(
                "<style data-href=\"{}\">{}</style>",
                url.replace('"', "&quot;"),
                css.replace("</style", "<\\/style")
            ))
        })
        .collect();

    if styles.is_empty() {
        return html.to_string();
    }

    match HEAD_CLOSE.find(html) {
        Some(close) => format!("{}{}{}", &html[..close.start()], styles, &html[close.start()..]),
        None => format!("{}{}", styles, html),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_base_href_goes_inside_head() {
        let html = r#"<html><head lang="en"><title>t</title></head><body></body></html>"#;
        let out = with_base_href(html, "https://example.com/a/");
        assert_eq!(
            out,
            r#"<html><head lang="en"><base href="https://example.com/a/"><title>t</title></head><body></body></html>"#
        );
    }

    #[test]
    fn test_base_href_without_head_or_with_existing_base() {
        assert_eq!(
            with_base_href("<p>hi</p>", "https://example.com/"),
            r#"<head><base href="https://example.com/"></head><p>hi</p>"#
        );

        let existing = r#"<head><base href="/x/"></head>"#;
        assert_eq!(with_base_href(existing, "https://example.com/"), existing);

        // <header> is not <head>
        assert!(with_base_href("<header>h</header>", "https://e.com/").starts_with("<head><base"));
    }

    #[test]
    fn test_inline_stylesheets_before_head_close() {
        let mut resources = BTreeMap::new();
        resources.insert("https://example.com/site.css".to_string(), b"p{color:red}".to_vec());
        resources.insert("https://example.com/font.woff".to_string(), vec![0xff, 0xfe, 0x00]);

        let out = inline_stylesheets("<head><title>t</title></head><p>x</p>", &resources);
        assert_eq!(
            out,
            "<head><title>t</title><style data-href=\"https://example.com/site.css\">p{color:red}</style></head><p>x</p>"
        );
        assert_eq!(inline_stylesheets("<p>x</p>", &BTreeMap::new()), "<p>x</p>");
    }

    #[tokio::test]
    async fn test_browserless_screenshot_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/screenshot"))
            .and(query_param("token", "secret"))
            .and(body_partial_json(json!({
                "viewport": { "width": 1280, "height": 720 },
                "options": { "type": "png", "fullPage": true },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG".to_vec()))
            .mount(&server)
            .await;

        let engine =
            BrowserlessEngine::new(&server.uri(), Some("secret"), Duration::from_secs(30)).unwrap();
        let png = engine
            .render_page("<p>hi</p>", "https://example.com/", &Viewport::default())
            .await
            .unwrap();
        assert_eq!(png, b"\x89PNG".to_vec());
    }

    #[tokio::test]
    async fn test_browserless_failure_is_a_navigation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/screenshot"))
            .respond_with(ResponseTemplate::new(500).set_body_string("net::ERR_NAME_NOT_RESOLVED"))
            .mount(&server)
            .await;

        let engine = BrowserlessEngine::new(&server.uri(), None, Duration::from_secs(30)).unwrap();
        let err = engine
            .render_page("<p>hi</p>", "https://example.com/", &Viewport::default())
            .await
            .unwrap_err();
        match err {
            RenderError::Navigation { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("ERR_NAME_NOT_RESOLVED"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
