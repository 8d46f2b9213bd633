// src/crawl/page.rs
// =============================================================================
// Turns a URL into a PageRecord: fetch, sanitize, attach stylesheets.
//
// Both the crawl workers and on-demand content requests go through here, so
// a page looks the same to the renderer no matter how it was fetched.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;

use super::event::PageRecord;
use super::fetch::PageSource;
use super::normalize::CrawlUrl;
use crate::error::FetchError;
use crate::resources::ResourceCollector;
use crate::sanitize::Sanitizer;

#[derive(Clone)]
pub struct PageProcessor {
    source: Arc<dyn PageSource>,
    sanitizer: Arc<dyn Sanitizer>,
    resources: ResourceCollector,
}

impl PageProcessor {
    pub fn new(
        source: Arc<dyn PageSource>,
        sanitizer: Arc<dyn Sanitizer>,
        resources: ResourceCollector,
    ) -> Self {
        Self {
            source,
            sanitizer,
            resources,
        }
    }

    /// Downloads the raw markup of a page.
    pub async fn fetch(&self, url: &CrawlUrl) -> Result<String, FetchError> {
        self.source.fetch_page(url.as_str()).await
    }

    /// Sanitizes fetched markup and gathers its stylesheets.
    pub async fn prepare(&self, url: &CrawlUrl, raw_html: &str) -> PageRecord {
        let resources = self
            .resources
            .collect(raw_html, url, self.source.as_ref())
            .await;

        PageRecord {
            url: url.clone(),
            sanitized_html: self.sanitizer.sanitize(raw_html, url.as_str()),
            resources,
            fetched_at: Utc::now(),
        }
    }

    /// fetch + prepare in one go.
    pub async fn process(&self, url: &CrawlUrl) -> Result<PageRecord, FetchError> {
        let raw_html = self.fetch(url).await?;
        Ok(self.prepare(url, &raw_html).await)
    }
}
