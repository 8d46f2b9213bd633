// src/crawl/testing.rs
// =============================================================================
// Test doubles shared by the crawl, server, and renderer tests.
//
// StaticSite is an in-memory website: a map from URL to markup, with an
// optional artificial delay so tests can observe concurrency.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::fetch::PageSource;
use super::normalize::AllowedDomainSet;
use super::page::PageProcessor;
use crate::error::FetchError;
use crate::resources::{AssetCache, ResourceCollector};
use crate::sanitize::MarkupSanitizer;

#[derive(Default)]
pub struct StaticSite {
    pages: HashMap<String, String>,
    delay: Duration,
    fetched: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StaticSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every URL fetch_page was called with, in call order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// Highest number of simultaneous fetch_page calls seen.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for StaticSite {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.pages
            .get(url)
            .cloned()
            .ok_or(FetchError::Status { status: 404 })
    }

    async fn fetch_asset(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Status { status: 404 })
    }
}

pub fn test_processor(site: Arc<StaticSite>) -> PageProcessor {
    let resources = ResourceCollector::new(
        Arc::new(AssetCache::new()),
        AllowedDomainSet::new("example.com"),
    );
    PageProcessor::new(site, Arc::new(MarkupSanitizer), resources)
}
