// src/crawl/normalize.rs
// =============================================================================
// This module canonicalizes candidate links and decides which ones are worth
// crawling.
//
// Two URLs that only differ by fragment, tracking parameters, or letter case
// point at the same page, so they must produce the same CrawlUrl. Otherwise
// the frontier would fetch the same page several times.
//
// Normalization steps:
// 1. Resolve the raw href against the page it was found on
// 2. Drop the #fragment
// 3. Drop tracking query parameters (utm_*, fbclid, gclid, _ga)
// 4. Add a trailing slash to extension-less paths ("/about" -> "/about/")
// 5. Lower-case the whole thing
//
// Rust concepts:
// - Newtype pattern: CrawlUrl wraps a String so a raw string can't be passed
//   where a normalized URL is expected
// - Option<T>: "invalid" is simply None
// =============================================================================

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameters that only exist for analytics.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "fbclid",
    "gclid",
    "_ga",
];

/// File extensions that are never HTML pages.
const SKIPPED_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "bmp", "tif", "tiff",
    // archives
    "zip", "rar", "7z", "tar", "gz", "bz2", "xz",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // executables and installers
    "exe", "msi", "dmg", "apk", "bin", "deb", "rpm",
    // audio and video
    "mp3", "mp4", "wav", "ogg", "flac", "avi", "mkv", "mov", "webm", "m4a",
    // documents and static assets
    "pdf", "css", "js",
];

/// Path fragments that belong to CMS plumbing rather than content pages.
const SKIPPED_PATH_PATTERNS: &[&str] = &[
    "/wp-",
    "/feed/",
    "/tag/",
    "/category/",
    "/author/",
    "/page/",
    "/comment-",
    "/trackback/",
];

/// CDNs that serve stylesheets and fonts for the sites we crawl.
pub const ASSET_CDNS: &[&str] = &[
    "cdn.jsdelivr.net",
    "cdnjs.cloudflare.com",
    "fonts.googleapis.com",
    "stackpath.bootstrapcdn.com",
    "unpkg.com",
];

/// A normalized absolute URL.
///
/// Only `normalize` can build one, so holding a CrawlUrl means the
/// fragment, tracking parameters and casing have already been dealt with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrawlUrl(String);

impl CrawlUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part of the URL, if it has one.
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.0)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

impl fmt::Display for CrawlUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CrawlUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Normalizes a (possibly relative) URL
//
// Parameters:
//   raw: the href or URL as written
//   base: the page it was found on, used to resolve relative links
//
// Returns: Some(CrawlUrl) or None if the input can't be parsed into a URL
//          with a host (mailto:, javascript:, garbage)
//
// Example:
//   raw = "/Docs?utm_source=x#intro", base = "https://Example.com/"
//   result = "https://example.com/docs/"
pub fn normalize(raw: &str, base: Option<&Url>) -> Option<CrawlUrl> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut parsed = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };

    if !parsed.has_host() {
        return None;
    }

    parsed.set_fragment(None);
    strip_tracking_params(&mut parsed);

    // "/about" and "/about/" are the same page on nearly every site
    let path = parsed.path().to_string();
    let last_segment = path.rsplit('/').next().unwrap_or("");
    if !path.ends_with('/') && !last_segment.contains('.') {
        parsed.set_path(&format!("{}/", path));
    }

    Some(CrawlUrl(parsed.as_str().to_lowercase()))
}

// Removes analytics parameters from the query string.
// The query is only rewritten when something was actually removed, so the
// encoding of untouched queries is preserved.
fn strip_tracking_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.to_ascii_lowercase().as_str()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else if kept.len() != pairs.len() {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}

// Decides whether a normalized URL is a page we should crawl
//
// Both checks matter: a URL can normalize fine and still be out of scope.
//
// Rejects:
// - anything that isn't http/https
// - paths ending in a binary/media extension (.png, .zip, .mp4, ...)
// - CMS plumbing paths (/wp-, /feed/, /tag/, ...)
// - hosts other than `domain` (subdomains included)
pub fn is_crawlable(url: &CrawlUrl, domain: &str) -> bool {
    let parsed = match Url::parse(url.as_str()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let path = parsed.path().to_ascii_lowercase();
    if has_skipped_extension(&path) {
        return false;
    }
    if SKIPPED_PATH_PATTERNS.iter().any(|pattern| path.contains(pattern)) {
        return false;
    }

    parsed
        .host_str()
        .map(|host| host.eq_ignore_ascii_case(domain))
        .unwrap_or(false)
}

fn has_skipped_extension(path: &str) -> bool {
    let last_segment = path.rsplit('/').next().unwrap_or("");
    match last_segment.rsplit_once('.') {
        Some((_, ext)) => SKIPPED_EXTENSIONS.contains(&ext),
        None => false,
    }
}

/// Hosts a crawl may contact: the target site plus the asset CDNs.
///
/// Read-only once built.
#[derive(Debug, Clone)]
pub struct AllowedDomainSet {
    domains: HashSet<String>,
}

impl AllowedDomainSet {
    pub fn new(target_host: &str) -> Self {
        let mut domains: HashSet<String> =
            ASSET_CDNS.iter().map(|cdn| cdn.to_string()).collect();
        domains.insert(target_host.to_ascii_lowercase());
        Self { domains }
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.domains.contains(&host.to_ascii_lowercase())
    }

    /// True when `url` parses and its host is in the set.
    pub fn allows(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(|host| self.contains_host(host)))
            .unwrap_or(false)
    }
}


// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why a newtype instead of String?
//    - CrawlUrl(String) costs nothing at runtime
//    - The compiler now stops us from putting an un-normalized string into
//      the frontier by accident
//
// 2. What does #[serde(transparent)] do?
//    - It serializes CrawlUrl exactly like the String inside it
//    - On the wire a CrawlUrl is just "https://..."
//
// 3. Why does normalize() return Option instead of Result?
//    - Callers never care *why* a link was bad, only that it should be skipped
// -----------------------------------------------------------------------------
