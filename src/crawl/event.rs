// src/crawl/event.rs
// =============================================================================
// What a crawl session reports while it runs.
//
// Workers push CrawlEvents into an EventSink. The sink tags every event with
// the id of the session that produced it, so whoever reads the channel can
// drop late events from a session that has since been replaced.
//
// Sending never fails from the worker's point of view: if nobody is
// listening any more (the client disconnected), the event is dropped.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::normalize::CrawlUrl;
use crate::protocol::{ProcessedContent, ServerMessage};

/// One successfully fetched and sanitized page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub url: CrawlUrl,
    pub sanitized_html: String,
    /// Cached stylesheet bytes keyed by resource URL.
    pub resources: BTreeMap<String, Vec<u8>>,
    pub fetched_at: DateTime<Utc>,
}

impl PageRecord {
    pub fn into_content(self) -> ProcessedContent {
        ProcessedContent {
            url: self.url.to_string(),
            html: self.sanitized_html,
            resources: self.resources,
            fetched_at: Some(self.fetched_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    /// Human-readable progress ("Crawling: ...").
    Info(String),
    /// A URL was admitted to the frontier.
    Link(CrawlUrl),
    /// A page finished processing.
    Page(PageRecord),
    /// One URL failed; the crawl carries on.
    Error(String),
    /// The frontier is quiescent. Sent once per session.
    Complete,
}

impl CrawlEvent {
    pub fn into_message(self) -> ServerMessage {
        match self {
            CrawlEvent::Info(message) => ServerMessage::info(message),
            CrawlEvent::Link(url) => ServerMessage::link(url.to_string()),
            CrawlEvent::Page(record) => ServerMessage::ProcessedContent {
                data: record.into_content(),
            },
            CrawlEvent::Error(message) => ServerMessage::error(message),
            CrawlEvent::Complete => ServerMessage::complete(),
        }
    }
}

/// A CrawlEvent tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: u64,
    pub event: CrawlEvent,
}

#[derive(Debug, Clone)]
pub struct EventSink {
    session: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(session: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn emit(&self, event: CrawlEvent) {
        // Err only means the receiver is gone
        let _ = self.tx.send(SessionEvent {
            session: self.session,
            event,
        });
    }
}
