//! In-memory search result cache.
//!
//! Keyed by [`DocumentQuery::fingerprint`](crate::schema::DocumentQuery::fingerprint).
//! Entries live until the process exits: there is no eviction, expiry or
//! size bound. Only successful pages are stored. Concurrent identical misses
//! may both fetch and both store; the last write wins.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::schema::{SearchItem, SearchPage, SearchResult};

#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    inner: Arc<RwLock<HashMap<String, SearchPage>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<SearchResult> {
        let entries = self.inner.read().unwrap_or_else(|e| e.into_inner());
        entries.get(fingerprint).cloned().map(SearchResult::Page)
    }

    /// Store a result. Error results are ignored.
    pub fn put(&self, fingerprint: &str, result: &SearchResult) {
        let SearchResult::Page(page) = result else {
            return;
        };
        let mut entries = self.inner.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(fingerprint.to_string(), page.clone());
        tracing::debug!(
            "ResultCache: stored '{}' ({} items, {} entries)",
            fingerprint,
            page.items.len(),
            entries.len()
        );
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect cached items by id, in the order the ids were given.
    ///
    /// Returns the ids that are not in any cached page as the error.
    pub fn find_items(&self, ids: &[String]) -> Result<Vec<SearchItem>, Vec<String>> {
        let entries = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let mut found: HashMap<&str, &SearchItem> = HashMap::new();
        for page in entries.values() {
            for item in &page.items {
                if let Some(id) = item.id().filter(|id| wanted.contains(id)) {
                    found.entry(id).or_insert(item);
                }
            }
            if found.len() == wanted.len() {
                break;
            }
        }

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains_key(id.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| found.get(id.as_str()).map(|item| (*item).clone()))
            .collect())
    }
}
