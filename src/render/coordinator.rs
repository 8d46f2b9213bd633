// src/render/coordinator.rs
// =============================================================================
// RenderCoordinator: decides when a screenshot request may render.
//
// It tracks three things:
// - pending_urls: pages the crawler announced (link) but hasn't delivered
// - the ContentCache: pages that have been delivered
// - a FIFO queue of screenshot requests waiting for their page
//
// A request only renders once its page is in the cache. When a request
// arrives for a page we don't have, the coordinator asks the crawler for it
// (request_content) instead of waiting for a crawl to maybe find it. A
// queued page that drops out of a bounded cache before its turn is asked
// for again.
//
// Queue policy:
// - StrictFifo: only the head may render. A head still waiting for its
//   page blocks everything behind it, even requests that are ready.
// - ScanForReady: every ready request renders, in arrival order.
//
// This type does no I/O. Each method returns what should happen next
// (renders to start, messages to send) and the caller does it, so the
// whole state machine is tested without sockets or a browser.
// =============================================================================

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::cache::ContentCache;
use super::QueuePolicy;
use crate::crawl::{normalize, CrawlUrl};
use crate::error::RenderError;
use crate::protocol::{ClientMessage, ProcessedContent};

/// Where a finished (or failed) screenshot goes.
pub type RenderReply = oneshot::Sender<Result<Vec<u8>, RenderError>>;

struct RenderRequest {
    url: CrawlUrl,
    reply: RenderReply,
}

/// A request whose page is available; the caller hands it to the engine.
pub struct ReadyRender {
    pub url: CrawlUrl,
    pub content: Arc<ProcessedContent>,
    pub reply: RenderReply,
}

/// What the caller should do after an event: renders to start and
/// request_content messages to send.
#[derive(Default)]
pub struct Step {
    pub renders: Vec<ReadyRender>,
    pub requests: Vec<ClientMessage>,
}

pub struct RenderCoordinator {
    cache: Arc<ContentCache>,
    policy: QueuePolicy,
    pending_urls: HashSet<CrawlUrl>,
    // request_content sent, answer not seen yet, and a live request still needs it
    requested: HashSet<CrawlUrl>,
    queue: VecDeque<RenderRequest>,
}

impl RenderCoordinator {
    pub fn new(cache: Arc<ContentCache>, policy: QueuePolicy) -> Self {
        Self {
            cache,
            policy,
            pending_urls: HashSet::new(),
            requested: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn pending(&self) -> usize {
        self.pending_urls.len()
    }

    /// A new crawl replaces the old one's announcements.
    pub fn on_crawl_started(&mut self) {
        self.pending_urls.clear();
    }

    pub fn on_link(&mut self, url: CrawlUrl) {
        if !self.cache.contains(url.as_str()) {
            self.pending_urls.insert(url);
        }
    }

    pub fn on_processed_content(&mut self, content: ProcessedContent) -> Step {
        let Some(url) = normalize(&content.url, None) else {
            warn!(url = %content.url, "ignoring processed content with an unusable URL");
            return Step::default();
        };

        self.pending_urls.remove(&url);
        self.requested.remove(&url);
        self.cache.insert(url.as_str(), content);
        debug!(url = %url, cached = self.cache.len(), "page cached");

        self.drain()
    }

    pub fn on_crawling_complete(&mut self) -> Step {
        if self.pending_urls.is_empty() {
            self.drain()
        } else {
            debug!(pending = self.pending_urls.len(), "crawl finished with undelivered pages");
            Step::default()
        }
    }

    /// Queues a screenshot request.
    ///
    /// A page that isn't cached is always asked for, even when an earlier
    /// request for it is still outstanding: that one may have failed.
    pub fn enqueue(&mut self, url: CrawlUrl, reply: RenderReply) -> Step {
        let mut requests = Vec::new();
        if !self.cache.contains(url.as_str()) {
            self.requested.insert(url.clone());
            requests.push(ClientMessage::RequestContent {
                url: url.to_string(),
            });
        }

        self.queue.push_back(RenderRequest { url, reply });
        let mut step = self.drain();
        requests.append(&mut step.requests);
        step.requests = requests;
        step
    }

    /// After a reconnect, anything we were waiting for may have been lost.
    /// Asks again for every queued page that isn't cached.
    pub fn on_reconnected(&mut self) -> Vec<ClientMessage> {
        self.requested.clear();
        self.queue.retain(|r| !r.reply.is_closed());
        self.request_missing()
    }

    // Sends request_content for queued pages that aren't cached and haven't
    // been asked for, e.g. pages evicted while their request waited
    fn request_missing(&mut self) -> Vec<ClientMessage> {
        let missing: Vec<CrawlUrl> = self
            .queue
            .iter()
            .filter(|r| !self.cache.contains(r.url.as_str()))
            .map(|r| r.url.clone())
            .collect();

        let mut requests = Vec::new();
        for url in missing {
            if self.requested.insert(url.clone()) {
                debug!(url = %url, "asking for queued page again");
                requests.push(ClientMessage::RequestContent {
                    url: url.to_string(),
                });
            }
        }
        requests
    }

    // Pulls every request the policy allows to render right now, then
    // settles which pages are still worth asking for
    fn drain(&mut self) -> Step {
        // Callers that gave up (HTTP timeout) shouldn't block the queue
        self.queue.retain(|r| !r.reply.is_closed());

        let mut ready = Vec::new();
        match self.policy {
            QueuePolicy::StrictFifo => {
                while let Some(content) = self
                    .queue
                    .front()
                    .and_then(|head| self.cache.get(head.url.as_str()))
                {
                    if let Some(request) = self.queue.pop_front() {
                        ready.push(ReadyRender {
                            url: request.url,
                            content,
                            reply: request.reply,
                        });
                    }
                }
            }
            QueuePolicy::ScanForReady => {
                let mut waiting = VecDeque::with_capacity(self.queue.len());
                for request in self.queue.drain(..) {
                    match self.cache.get(request.url.as_str()) {
                        Some(content) => ready.push(ReadyRender {
                            url: request.url,
                            content,
                            reply: request.reply,
                        }),
                        None => waiting.push_back(request),
                    }
                }
                self.queue = waiting;
            }
        }

        if !ready.is_empty() {
            debug!(ready = ready.len(), still_queued = self.queue.len(), "renders ready");
        }

        // Nobody waits for these any more; a later request must ask afresh
        let needed: HashSet<&CrawlUrl> = self.queue.iter().map(|r| &r.url).collect();
        self.requested.retain(|url| needed.contains(url));

        Step {
            renders: ready,
            requests: self.request_missing(),
        }
    }
}
