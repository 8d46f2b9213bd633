// src/crawl/session.rs
// =============================================================================
// A crawl session owns one frontier and the worker pool that drains it.
//
// Starting a session:
// 1. Normalize the seed URL (an invalid seed means no session at all)
// 2. Build the allowed domain set from the seed's host
// 3. Create a fresh frontier holding only the seed
// 4. Spawn the worker pool in the background
//
// A connection runs at most one session at a time. When a new crawl is
// requested, the old session is retired: it stops dispatching, lets its
// in-flight fetches finish, and never reports completion. Its late events
// carry the old session id and are ignored by the connection.
//
// CrawlServices bundles what every session needs (fetcher, sanitizer,
// asset cache, settings) so a server can hand the same services to many
// sessions.
// =============================================================================

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::event::{EventSink, PageRecord};
use super::fetch::PageSource;
use super::frontier::{Frontier, FrontierStats};
use super::normalize::{normalize, AllowedDomainSet, CrawlUrl};
use super::page::PageProcessor;
use super::pool::{run_pool, PoolOutcome, WorkerContext};
use crate::config::CrawlConfig;
use crate::error::SessionError;
use crate::resources::{AssetCache, ResourceCollector};
use crate::sanitize::Sanitizer;

/// Shared, long-lived collaborators for crawl sessions.
#[derive(Clone)]
pub struct CrawlServices {
    pub source: Arc<dyn PageSource>,
    pub sanitizer: Arc<dyn Sanitizer>,
    pub assets: Arc<AssetCache>,
    pub config: CrawlConfig,
}

impl CrawlServices {
    pub fn new(
        source: Arc<dyn PageSource>,
        sanitizer: Arc<dyn Sanitizer>,
        assets: Arc<AssetCache>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            source,
            sanitizer,
            assets,
            config,
        }
    }

    fn processor(&self, allowed: AllowedDomainSet) -> PageProcessor {
        PageProcessor::new(
            Arc::clone(&self.source),
            Arc::clone(&self.sanitizer),
            ResourceCollector::new(Arc::clone(&self.assets), allowed),
        )
    }

    // Fetches and sanitizes one page outside of any crawl
    //
    // Used for request_content: the renderer needs a page now, whether or not
    // a crawl will ever reach it. Returns the normalized URL with any error so
    // the caller can report which page failed.
    pub async fn fetch_content(&self, raw_url: &str) -> Result<PageRecord, SessionError> {
        let (url, host) = parse_seed(raw_url)?;
        let processor = self.processor(AllowedDomainSet::new(&host));
        processor
            .process(&url)
            .await
            .map_err(|source| SessionError::Fetch {
                url: url.to_string(),
                source,
            })
    }
}

fn parse_seed(raw: &str) -> Result<(CrawlUrl, String), SessionError> {
    let invalid = || SessionError::InvalidUrl(raw.to_string());

    let url = normalize(raw, None).ok_or_else(invalid)?;
    if !(url.as_str().starts_with("http://") || url.as_str().starts_with("https://")) {
        return Err(invalid());
    }
    let host = url.host().ok_or_else(invalid)?;
    Ok((url, host))
}

pub struct CrawlSession {
    id: u64,
    seed: CrawlUrl,
    frontier: Arc<Frontier>,
    retire_tx: watch::Sender<bool>,
    handle: JoinHandle<PoolOutcome>,
}

impl CrawlSession {
    /// Validates the seed and starts crawling in the background.
    /// Events go to `events`, tagged with the sink's session id.
    pub fn start(
        seed: &str,
        services: &CrawlServices,
        events: EventSink,
    ) -> Result<Self, SessionError> {
        let (seed, host) = parse_seed(seed)?;
        let id = events.session();

        let frontier = Arc::new(Frontier::new(seed.clone()));
        let allowed = AllowedDomainSet::new(&host);
        let ctx = Arc::new(WorkerContext {
            frontier: Arc::clone(&frontier),
            processor: services.processor(allowed.clone()),
            allowed,
            domain: host,
            events,
        });

        let (retire_tx, retire_rx) = watch::channel(false);
        let max_concurrent = services.config.max_concurrent;
        let handle = tokio::spawn(run_pool(ctx, max_concurrent, retire_rx));

        info!(session = id, seed = %seed, max_concurrent, "crawl started");

        Ok(Self {
            id,
            seed,
            frontier,
            retire_tx,
            handle,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn seed(&self) -> &CrawlUrl {
        &self.seed
    }

    pub fn stats(&self) -> FrontierStats {
        self.frontier.stats()
    }

    /// Stops dispatching new URLs. In-flight fetches run to completion.
    pub fn retire(&self) {
        self.retire_tx.send_replace(true);
    }

    /// Waits for the pool to stop.
    pub async fn wait(self) -> PoolOutcome {
        // A panicking pool can't report completion either
        self.handle.await.unwrap_or(PoolOutcome::Retired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::event::{CrawlEvent, SessionEvent};
    use crate::crawl::testing::StaticSite;
    use crate::sanitize::MarkupSanitizer;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn services(site: Arc<StaticSite>) -> CrawlServices {
        CrawlServices::new(
            site,
            Arc::new(MarkupSanitizer),
            Arc::new(AssetCache::new()),
            CrawlConfig::default(),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_invalid_seed_never_starts() {
        let site = Arc::new(StaticSite::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        for seed in ["not a url", "", "ftp://example.com/file", "mailto:me@example.com"] {
            let result = CrawlSession::start(seed, &services(Arc::clone(&site)), EventSink::new(1, tx.clone()));
            assert!(matches!(result, Err(SessionError::InvalidUrl(_))), "{}", seed);
        }
        assert!(site.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_session_crawls_to_completion() {
        let site = Arc::new(
            StaticSite::new()
                .page("https://example.com/", r#"<a href="/about">About</a>"#)
                .page("https://example.com/about/", "<p>about</p>"),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let session =
            CrawlSession::start("https://Example.com", &services(site), EventSink::new(7, tx)).unwrap();
        assert_eq!(session.seed().as_str(), "https://example.com/");
        assert_eq!(session.wait().await, PoolOutcome::Finished);

        let events = drain(&mut rx);
        assert!(events.iter().all(|e| e.session == 7));
        let completions = events
            .iter()
            .filter(|e| e.event == CrawlEvent::Complete)
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn test_retired_session_stops_dispatching() {
        let mut site = StaticSite::new().with_delay(Duration::from_millis(30));
        let mut body = String::new();
        for i in 0..20 {
            body.push_str(&format!(r#"<a href="/p{}">p</a>"#, i));
            site = site.page(&format!("https://example.com/p{}/", i), "<p>leaf</p>");
        }
        let site = Arc::new(site.page("https://example.com/", &body));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let services = CrawlServices {
            config: CrawlConfig {
                max_concurrent: 2,
                ..CrawlConfig::default()
            },
            ..services(Arc::clone(&site))
        };

        let session = CrawlSession::start("https://example.com/", &services, EventSink::new(3, tx)).unwrap();
        // Let the seed finish and a couple of children start
        tokio::time::sleep(Duration::from_millis(45)).await;
        session.retire();

        assert_eq!(session.wait().await, PoolOutcome::Retired);
        assert!(site.fetched().len() < 21);
        assert!(!drain(&mut rx).iter().any(|e| e.event == CrawlEvent::Complete));
    }

    #[tokio::test]
    async fn test_fetch_content_outside_a_crawl() {
        let site = Arc::new(StaticSite::new().page(
            "https://example.com/hello/",
            "<p>hello</p><script>track()</script>",
        ));
        let services = services(site);

        let record = services.fetch_content("https://example.com/Hello#top").await.unwrap();
        assert_eq!(record.url.as_str(), "https://example.com/hello/");
        assert_eq!(record.sanitized_html, "<p>hello</p>");

        let err = services.fetch_content("https://example.com/nope").await.unwrap_err();
        assert!(err.to_string().contains("https://example.com/nope/"));
    }
}
