// src/crawl/pool.rs
// =============================================================================
// The fetch worker pool: keeps up to `max_concurrent` fetches running until
// the frontier runs dry.
//
// How it works:
// 1. Top up: dispatch URLs from the frontier and spawn a worker task for
//    each, until the pool is full or nothing is pending
// 2. Wait for any one worker to finish
// 3. Check whether the frontier is quiescent (nothing pending, nothing in
//    flight). If so, report completion and stop. Otherwise go to 1.
//
// A finished worker frees its slot immediately, so new work starts as soon
// as there is room. There are no batches and no barriers between them.
//
// Each worker:
// 1. Rejects hosts outside the allowed domain set
// 2. Fetches the page
// 3. Extracts anchor links, normalizes them, and admits the crawlable ones
// 4. Sanitizes the page and emits it
// 5. Marks its URL complete, no matter what happened above
//
// Step 5 is enforced by a guard value whose Drop impl calls complete(), so it
// also runs on early returns and panics. A URL that never completes would
// keep the crawl from ever finishing.
//
// Rust concepts:
// - JoinSet: a set of spawned tasks we can await one at a time
// - tokio::select!: wait on several futures, act on whichever is ready first
// - Drop: run cleanup code when a value goes out of scope
// =============================================================================

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

use super::event::{CrawlEvent, EventSink};
use super::frontier::Frontier;
use super::links::extract_links;
use super::normalize::{is_crawlable, normalize, AllowedDomainSet, CrawlUrl};
use super::page::PageProcessor;
use crate::error::FetchError;

/// Everything a worker needs, shared by all workers of one session.
pub struct WorkerContext {
    pub frontier: Arc<Frontier>,
    pub processor: PageProcessor,
    pub allowed: AllowedDomainSet,
    /// The crawl target host; links elsewhere are never admitted.
    pub domain: String,
    pub events: EventSink,
}

/// Why the pool stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOutcome {
    /// The frontier became quiescent and completion was reported.
    Finished,
    /// A newer session replaced this one; in-flight work was allowed to drain.
    Retired,
}

// Calls Frontier::complete when dropped
struct CompletionGuard {
    frontier: Arc<Frontier>,
    url: CrawlUrl,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.frontier.complete(&self.url);
    }
}

// Runs the pool until the frontier is quiescent or the session is retired
//
// Parameters:
//   ctx: shared worker context (frontier, fetcher, event sink)
//   max_concurrent: ceiling on simultaneous fetches (values below 1 count as 1)
//   retire: flips to true when a newer crawl replaces this one
pub async fn run_pool(
    ctx: Arc<WorkerContext>,
    max_concurrent: usize,
    mut retire: watch::Receiver<bool>,
) -> PoolOutcome {
    let max_concurrent = max_concurrent.max(1);
    let mut workers = JoinSet::new();
    // The sender goes away when the session handle is dropped. The crawl
    // keeps going in that case, it just can't be retired any more.
    let mut retire_open = true;

    loop {
        let retired = *retire.borrow();

        if !retired {
            while workers.len() < max_concurrent {
                match ctx.frontier.dispatch() {
                    Some(url) => {
                        debug!(session = ctx.events.session(), url = %url, "dispatching");
                        workers.spawn(crawl_one(Arc::clone(&ctx), url));
                    }
                    None => break,
                }
            }
        }

        if workers.is_empty() {
            break;
        }

        tokio::select! {
            joined = workers.join_next() => {
                if let Some(Err(e)) = joined {
                    error!(session = ctx.events.session(), error = %e, "crawl worker panicked");
                }
            }
            changed = retire.changed(), if retire_open && !retired => {
                if changed.is_err() {
                    retire_open = false;
                }
            }
        }

        if !*retire.borrow() && ctx.frontier.try_finish() {
            report_completion(&ctx);
            return PoolOutcome::Finished;
        }
    }

    if !*retire.borrow() && ctx.frontier.try_finish() {
        report_completion(&ctx);
        return PoolOutcome::Finished;
    }

    info!(session = ctx.events.session(), "crawl retired");
    PoolOutcome::Retired
}

fn report_completion(ctx: &WorkerContext) {
    let stats = ctx.frontier.stats();
    info!(
        session = ctx.events.session(),
        visited = stats.visited,
        "crawling completed"
    );
    ctx.events.emit(CrawlEvent::Info("Crawling completed".to_string()));
    ctx.events.emit(CrawlEvent::Complete);
}

// One fetch + extract + emit cycle for a dispatched URL
async fn crawl_one(ctx: Arc<WorkerContext>, url: CrawlUrl) {
    // Declared first so it is dropped last, after every event below is sent
    let _guard = CompletionGuard {
        frontier: Arc::clone(&ctx.frontier),
        url: url.clone(),
    };

    ctx.events.emit(CrawlEvent::Info(format!("Crawling: {}", url)));

    if let Err(e) = process_url(&ctx, &url).await {
        warn!(session = ctx.events.session(), url = %url, error = %e, "page failed");
        ctx.events
            .emit(CrawlEvent::Error(format!("Error processing {}: {}", url, e)));
    }
}

async fn process_url(ctx: &WorkerContext, url: &CrawlUrl) -> Result<(), FetchError> {
    let host = url.host().unwrap_or_default();
    if !ctx.allowed.contains_host(&host) {
        return Err(FetchError::DomainNotAllowed(host));
    }

    let raw_html = ctx.processor.fetch(url).await?;

    // Links come from the raw markup, before sanitizing
    let base = Url::parse(url.as_str()).ok();
    for href in extract_links(&raw_html) {
        let link = match normalize(&href, base.as_ref()) {
            Some(link) => link,
            None => continue,
        };
        if is_crawlable(&link, &ctx.domain) && ctx.frontier.try_admit(link.clone()) {
            ctx.events.emit(CrawlEvent::Link(link));
        }
    }

    let record = ctx.processor.prepare(url, &raw_html).await;
    ctx.events.emit(CrawlEvent::Page(record));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::event::SessionEvent;
    use crate::crawl::testing::{test_processor, StaticSite};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        ctx: Arc<WorkerContext>,
        rx: mpsc::UnboundedReceiver<SessionEvent>,
        retire_tx: watch::Sender<bool>,
    }

    fn harness(site: Arc<StaticSite>, seed: &str, domain: &str) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let (retire_tx, _) = watch::channel(false);
        let seed = normalize(seed, None).unwrap();
        let ctx = Arc::new(WorkerContext {
            frontier: Arc::new(Frontier::new(seed)),
            processor: test_processor(site),
            allowed: AllowedDomainSet::new(domain),
            domain: domain.to_string(),
            events: EventSink::new(1, tx),
        });
        Harness { ctx, rx, retire_tx }
    }

    impl Harness {
        async fn run(&self, max_concurrent: usize) -> PoolOutcome {
            run_pool(Arc::clone(&self.ctx), max_concurrent, self.retire_tx.subscribe()).await
        }

        fn events(&mut self) -> Vec<CrawlEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event.event);
            }
            events
        }
    }

    fn links(events: &[CrawlEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                CrawlEvent::Link(url) => Some(url.to_string()),
                _ => None,
            })
            .collect()
    }

    fn count(events: &[CrawlEvent], pred: impl Fn(&CrawlEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    #[tokio::test]
    async fn test_seed_scenario_fetches_two_pages() {
        let site = Arc::new(
            StaticSite::new()
                .page(
                    "https://example.com/",
                    r#"<a href="/a">A</a><a href="/a#section">A again</a>
                       <a href="/b.png">img</a><a href="https://other.com/c">out</a>"#,
                )
                .page("https://example.com/a/", "<p>leaf</p>"),
        );
        let mut h = harness(Arc::clone(&site), "https://example.com/", "example.com");

        assert_eq!(h.run(5).await, PoolOutcome::Finished);

        let events = h.events();
        assert_eq!(site.fetched(), vec!["https://example.com/", "https://example.com/a/"]);
        assert_eq!(links(&events), vec!["https://example.com/a/"]);
        assert_eq!(count(&events, |e| matches!(e, CrawlEvent::Page(_))), 2);
        assert_eq!(count(&events, |e| matches!(e, CrawlEvent::Complete)), 1);
        assert_eq!(events.last(), Some(&CrawlEvent::Complete));
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let mut site = StaticSite::new().with_delay(Duration::from_millis(25));
        for path in ["", "p1/", "p2/", "p3/", "p4/"] {
            site = site.page(&format!("https://example.com/{}", path), "<p>no links</p>");
        }
        let site = Arc::new(site);
        let mut h = harness(Arc::clone(&site), "https://example.com/", "example.com");
        for path in ["/p1", "/p2", "/p3", "/p4"] {
            let url = normalize(&format!("https://example.com{}", path), None).unwrap();
            assert!(h.ctx.frontier.try_admit(url));
        }

        assert_eq!(h.run(2).await, PoolOutcome::Finished);

        assert_eq!(site.fetched().len(), 5);
        assert_eq!(site.peak_in_flight(), 2);
        assert_eq!(count(&h.events(), |e| matches!(e, CrawlEvent::Complete)), 1);
    }

    #[tokio::test]
    async fn test_cyclic_links_are_fetched_once() {
        let body = r#"<a href="/">home</a><a href="/a">a</a><a href="/b">b</a>"#;
        let site = Arc::new(
            StaticSite::new()
                .page("https://example.com/", body)
                .page("https://example.com/a/", body)
                .page("https://example.com/b/", body),
        );
        let h = harness(Arc::clone(&site), "https://example.com/", "example.com");

        h.run(3).await;

        let mut fetched = site.fetched();
        fetched.sort();
        assert_eq!(
            fetched,
            vec!["https://example.com/", "https://example.com/a/", "https://example.com/b/"]
        );
    }

    #[tokio::test]
    async fn test_failed_fetches_still_complete() {
        let site = Arc::new(
            StaticSite::new().page(
                "https://example.com/",
                r#"<a href="/missing">gone</a><a href="/also-missing">gone</a>"#,
            ),
        );
        let mut h = harness(site, "https://example.com/", "example.com");

        assert_eq!(h.run(5).await, PoolOutcome::Finished);

        let events = h.events();
        assert_eq!(count(&events, |e| matches!(e, CrawlEvent::Error(_))), 2);
        assert_eq!(count(&events, |e| matches!(e, CrawlEvent::Complete)), 1);
        assert_eq!(h.ctx.frontier.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_disallowed_host_is_reported_not_fetched() {
        let site = Arc::new(StaticSite::new().page("https://other.com/", "<p>x</p>"));
        let mut h = harness(Arc::clone(&site), "https://other.com/", "example.com");

        assert_eq!(h.run(5).await, PoolOutcome::Finished);

        assert!(site.fetched().is_empty());
        let events = h.events();
        assert!(events.iter().any(|e| matches!(
            e,
            CrawlEvent::Error(message) if message.contains("host not allowed")
        )));
        assert_eq!(events.last(), Some(&CrawlEvent::Complete));
    }

    #[tokio::test]
    async fn test_retired_pool_dispatches_nothing_and_never_completes() {
        let site = Arc::new(StaticSite::new().page("https://example.com/", "<p>x</p>"));
        let mut h = harness(Arc::clone(&site), "https://example.com/", "example.com");
        h.retire_tx.send_replace(true);

        assert_eq!(h.run(5).await, PoolOutcome::Retired);
        assert!(site.fetched().is_empty());
        assert!(!h.events().contains(&CrawlEvent::Complete));
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why not recursion ("when a fetch finishes, start the next one")?
//    - Each callback would start another, and long crawls would build deep
//      chains of futures. A plain loop keeps memory flat.
//
// 2. What does `if retire_open && !retired` do inside select!?
//    - It disables that branch. A disabled branch is simply not polled.
//
// 3. Why is the guard declared before anything else in crawl_one?
//    - Locals are dropped in reverse order. The guard goes last, so the page's
//      events are already sent when the URL is marked complete.
// -----------------------------------------------------------------------------
