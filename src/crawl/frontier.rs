// src/crawl/frontier.rs
// =============================================================================
// The frontier is the mutable state of one crawl:
//
//   visited   - every URL ever admitted (never shrinks)
//   pending   - admitted but not yet handed to a worker (FIFO)
//   in_flight - handed to a worker and not yet completed
//
// Lifecycle of a URL:
//   try_admit()  -> visited + pending
//   dispatch()   -> pending  -> in_flight
//   complete()   -> removed from in_flight
//
// The crawl is over when pending and in_flight are both empty. That check is
// only meaningful right after a complete(), which is why the worker pool calls
// it from the same place it reaps finished fetches.
//
// All operations take one short lock, so the frontier can be shared between
// workers through an Arc without any extra coordination.
//
// Rust concepts:
// - Interior mutability: &self methods mutate through a Mutex
// - HashSet for O(1) membership checks, VecDeque for the FIFO queue
// =============================================================================

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::normalize::CrawlUrl;

#[derive(Debug, Default)]
struct FrontierState {
    visited: HashSet<CrawlUrl>,
    in_flight: HashSet<CrawlUrl>,
    pending: VecDeque<CrawlUrl>,
    finished: bool,
}

impl FrontierState {
    fn is_quiescent(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

/// Counters for progress logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierStats {
    pub visited: usize,
    pub pending: usize,
    pub in_flight: usize,
}

#[derive(Debug)]
pub struct Frontier {
    state: Mutex<FrontierState>,
}

impl Frontier {
    /// Creates a frontier holding only the seed, ready to be dispatched.
    pub fn new(seed: CrawlUrl) -> Self {
        let mut state = FrontierState::default();
        state.visited.insert(seed.clone());
        state.pending.push_back(seed);
        Self {
            state: Mutex::new(state),
        }
    }

    // A panicking worker must not wedge the whole crawl, so a poisoned lock
    // is treated as usable. Every mutation below leaves the state consistent
    // before it can panic.
    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `url` unless it has been seen before. Returns whether it was queued.
    pub fn try_admit(&self, url: CrawlUrl) -> bool {
        let mut state = self.lock();
        // Every pending URL is also in visited
        if state.finished || !state.visited.insert(url.clone()) {
            return false;
        }
        state.pending.push_back(url);
        true
    }

    /// Pops the oldest pending URL and marks it in flight.
    pub fn dispatch(&self) -> Option<CrawlUrl> {
        let mut state = self.lock();
        let url = state.pending.pop_front()?;
        state.in_flight.insert(url.clone());
        Some(url)
    }

    /// Marks a dispatched URL as done, whatever the fetch outcome was.
    /// Returns false if the URL was not in flight.
    pub fn complete(&self, url: &CrawlUrl) -> bool {
        self.lock().in_flight.remove(url)
    }

    /// Returns true exactly once: the first time it is called while the
    /// frontier is quiescent. After that the frontier admits nothing new.
    pub fn try_finish(&self) -> bool {
        let mut state = self.lock();
        if state.finished || !state.is_quiescent() {
            return false;
        }
        state.finished = true;
        true
    }

    pub fn stats(&self) -> FrontierStats {
        let state = self.lock();
        FrontierStats {
            visited: state.visited.len(),
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
        }
    }
}


// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why std::sync::Mutex and not tokio::sync::Mutex?
//    - We never hold the lock across an .await
//    - Each method locks, does a few set operations, and unlocks
//    - The std Mutex is cheaper for that pattern
//
// 2. What is a poisoned Mutex?
//    - If a thread panics while holding the lock, the Mutex is "poisoned"
//    - lock() then returns Err, but the data is still there
//    - PoisonError::into_inner hands us the guard anyway
//
// 3. Why does visited never shrink?
//    - It doubles as "ever seen": a page we already fetched must not be
//      queued again just because it finished
// -----------------------------------------------------------------------------
