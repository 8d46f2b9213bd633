// src/resources.rs
// =============================================================================
// Static asset side job: find the stylesheets a page links to, download the
// ones served from allowed hosts, and keep them in a process-wide cache.
//
// The renderer receives the cached bytes together with each page, so it can
// draw the page without reaching back out to the site.
//
// Only stylesheets are collected. Fetch failures are logged and skipped: a
// missing stylesheet makes a screenshot uglier, it never fails a crawl.
// =============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::crawl::{AllowedDomainSet, CrawlUrl, PageSource};

static STYLESHEET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<link[^>]*rel=["']stylesheet["'][^>]*href=["']([^"']+)["'][^>]*>"#)
        .expect("valid regex")
});

/// Finds `<link rel="stylesheet" href=...>` targets and resolves them
/// against the page URL. Unresolvable hrefs are skipped; duplicates dropped.
pub fn stylesheet_urls(html: &str, page_url: &str) -> Vec<String> {
    let base = match Url::parse(page_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    STYLESHEET_RE
        .captures_iter(html)
        .filter_map(|cap| base.join(cap[1].trim()).ok())
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Asset bytes keyed by absolute URL, shared by every crawl in the process.
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    pub fn insert(&self, url: String, bytes: Vec<u8>) -> Arc<Vec<u8>> {
        let bytes = Arc::new(bytes);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url, Arc::clone(&bytes));
        bytes
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Gathers the stylesheets of one page for one crawl.
#[derive(Debug, Clone)]
pub struct ResourceCollector {
    cache: Arc<AssetCache>,
    allowed: AllowedDomainSet,
}

impl ResourceCollector {
    pub fn new(cache: Arc<AssetCache>, allowed: AllowedDomainSet) -> Self {
        Self { cache, allowed }
    }

    // Returns resource URL -> bytes for every stylesheet of the page that is
    // cached or could be fetched now
    pub async fn collect(
        &self,
        html: &str,
        page_url: &CrawlUrl,
        source: &dyn PageSource,
    ) -> BTreeMap<String, Vec<u8>> {
        let mut resources = BTreeMap::new();

        for url in stylesheet_urls(html, page_url.as_str()) {
            if !self.allowed.allows(&url) {
                debug!(page = %page_url, resource = %url, "skipping stylesheet from foreign host");
                continue;
            }

            if let Some(bytes) = self.cache.get(&url) {
                resources.insert(url, bytes.as_ref().clone());
                continue;
            }

            match source.fetch_asset(&url).await {
                Ok(bytes) => {
                    let bytes = self.cache.insert(url.clone(), bytes);
                    debug!(resource = %url, cached = self.cache.len(), "stylesheet cached");
                    resources.insert(url, bytes.as_ref().clone());
                }
                Err(e) => warn!(page = %page_url, resource = %url, error = %e, "stylesheet fetch failed"),
            }
        }

        resources
    }
}
