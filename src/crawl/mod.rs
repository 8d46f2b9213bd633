// src/crawl/mod.rs
// =============================================================================
// This module handles crawling a single site.
//
// Features:
// - URL normalization so the same page is never queued twice
// - Same-domain restriction with an allowlist for asset CDNs
// - Bounded-concurrency worker pool that starts new work the moment a
//   slot frees up
// - Completion detection: exactly one "done" event per crawl
//
// Submodules, leaf first:
// - normalize: CrawlUrl, normalize(), is_crawlable(), AllowedDomainSet
// - links: anchor href extraction
// - frontier: visited / pending / in-flight bookkeeping
// - fetch: the PageSource trait and its reqwest implementation
// - page: fetch + sanitize + stylesheets -> PageRecord
// - event: what a crawl reports
// - pool: the worker pool
// - session: one crawl, start to finish
// =============================================================================

mod event;
mod fetch;
mod frontier;
mod links;
mod normalize;
mod page;
mod pool;
mod session;

#[cfg(test)]
pub mod testing;

pub use event::{CrawlEvent, EventSink, PageRecord, SessionEvent};
pub use fetch::{HttpFetcher, PageSource};
pub use normalize::{normalize, AllowedDomainSet, CrawlUrl};
pub use session::{CrawlServices, CrawlSession};
