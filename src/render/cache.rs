// src/render/cache.rs
// =============================================================================
// ContentCache: every processed page the renderer has received.
//
// Keys are normalized URLs, so "https://Example.com/a#top" and
// "https://example.com/a/" share one entry. Inserting the same URL again
// replaces the content but keeps its original position in the eviction order.
//
// With max_entries = None the cache only grows. With Some(n) the oldest
// inserted pages are evicted once there are more than n.
//
// The cache is owned by whoever builds the renderer and shared through an
// Arc, so tests can hand in their own instance.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::protocol::ProcessedContent;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<ProcessedContent>>,
    // Insertion order, oldest first
    order: VecDeque<String>,
}

pub struct ContentCache {
    max_entries: Option<usize>,
    state: Mutex<CacheState>,
}

impl ContentCache {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            // A zero-sized cache could never hold the page a request waits for
            max_entries: max_entries.map(|n| n.max(1)),
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a page under `key` and returns the shared copy.
    pub fn insert(&self, key: &str, content: ProcessedContent) -> Arc<ProcessedContent> {
        let content = Arc::new(content);
        let mut state = self.lock();

        if state
            .entries
            .insert(key.to_string(), Arc::clone(&content))
            .is_none()
        {
            state.order.push_back(key.to_string());
        }

        if let Some(max) = self.max_entries {
            while state.order.len() > max {
                if let Some(oldest) = state.order.pop_front() {
                    state.entries.remove(&oldest);
                    debug!(url = %oldest, "evicted page from content cache");
                }
            }
        }

        content
    }

    pub fn get(&self, key: &str) -> Option<Arc<ProcessedContent>> {
        self.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn page(url: &str, html: &str) -> ProcessedContent {
        ProcessedContent {
            url: url.to_string(),
            html: html.to_string(),
            resources: BTreeMap::new(),
            fetched_at: None,
        }
    }

    #[test]
    fn test_unbounded_cache_keeps_everything() {
        let cache = ContentCache::new(None);
        for i in 0..100 {
            let url = format!("https://example.com/{}/", i);
            cache.insert(&url, page(&url, "x"));
        }
        assert_eq!(cache.len(), 100);
        assert!(cache.contains("https://example.com/0/"));
    }

    #[test]
    fn test_bounded_cache_evicts_oldest_inserted() {
        let cache = ContentCache::new(Some(2));
        cache.insert("a", page("a", "1"));
        cache.insert("b", page("b", "2"));
        // Re-inserting keeps "a" in its original slot
        cache.insert("a", page("a", "1 again"));
        cache.insert("c", page("c", "3"));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert_eq!(cache.get("b").unwrap().html, "2");
        assert_eq!(cache.get("c").unwrap().html, "3");
    }

    #[test]
    fn test_reinsert_replaces_content() {
        let cache = ContentCache::new(None);
        cache.insert("a", page("a", "old"));
        cache.insert("a", page("a", "new"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().html, "new");
    }

    #[test]
    fn test_zero_limit_still_holds_latest_page() {
        let cache = ContentCache::new(Some(0));
        cache.insert("a", page("a", "1"));
        assert!(cache.contains("a"));
        assert_eq!(cache.len(), 1);
    }
}
