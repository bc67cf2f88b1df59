//! Search entry point: cache lookup in front of the document client.

use tracing::{error, info};

use crate::cache::ResultCache;
use crate::government::GovernmentClient;
use crate::schema::{DocumentQuery, SearchItem, SearchResult};

/// Page size used when crawling several pages.
pub const CRAWL_PAGE_SIZE: u32 = 50;

#[derive(Clone)]
pub struct SearchService {
    client: GovernmentClient,
    cache: ResultCache,
}

impl SearchService {
    pub fn new(client: GovernmentClient, cache: ResultCache) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Search one page. With `use_cache`, a cached page is served when
    /// present and a fresh successful page is stored.
    pub async fn search(&self, query: &DocumentQuery, use_cache: bool) -> SearchResult {
        let fingerprint = query.fingerprint();

        if use_cache {
            if let Some(cached) = self.cache.get(&fingerprint) {
                info!("Serving cached result: {}", fingerprint);
                return cached;
            }
        }

        let result = SearchResult::from(self.client.fetch(query).await);

        if use_cache {
            self.cache.put(&fingerprint, &result);
        }
        result
    }

    /// Fetch consecutive pages of [`CRAWL_PAGE_SIZE`] items, stopping at the
    /// first error, empty page or short page, or after `max_pages`. Items
    /// gathered before an error are kept.
    pub async fn fetch_all(
        &self,
        keyword: &str,
        doc_type: &str,
        manager: &str,
        max_pages: u32,
    ) -> Vec<SearchItem> {
        let mut all = Vec::new();

        for page_no in 1..=max_pages {
            let query = DocumentQuery::new(keyword, doc_type)
                .page(page_no, CRAWL_PAGE_SIZE)
                .manager(manager);

            let page = match self.search(&query, true).await {
                SearchResult::Page(page) => page,
                SearchResult::Error { error } => {
                    error!("Stopping crawl at page {}: {}", page_no, error);
                    break;
                }
            };

            let count = page.items.len();
            all.extend(page.items);
            if count < CRAWL_PAGE_SIZE as usize {
                break;
            }
        }

        info!("Crawl collected {} items", all.len());
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::government::testing::{client, ok, ScriptedTransport};
    use crate::government::{DocumentTransport, TransportError, TransportResponse};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Barrier;

    fn items_body(ids: std::ops::Range<usize>) -> Value {
        let items: Vec<Value> = ids.map(|i| json!({"id": format!("T{}", i)})).collect();
        json!({
            "response": {
                "header": {"resultCode": "00", "resultMsg": "OK"},
                "body": {"totalCount": 120, "items": {"item": items}}
            }
        })
    }

    fn service(transport: Arc<dyn DocumentTransport>) -> SearchService {
        SearchService::new(client(transport, 3), ResultCache::new())
    }

    #[tokio::test]
    async fn test_second_search_served_from_cache() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok(items_body(0..2))]));
        let service = service(transport.clone());
        let query = DocumentQuery::new("정책", "speech");

        let first = service.search(&query, true).await;
        let second = service.search(&query, true).await;
        assert_eq!(first, second);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(service.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_bypass() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok(items_body(0..1)),
            ok(items_body(0..1)),
        ]));
        let service = service(transport.clone());
        let query = DocumentQuery::new("", "speech");

        service.search(&query, false).await;
        service.search(&query, false).await;
        assert_eq!(transport.call_count(), 2);
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_errors_not_cached() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(TransportResponse { status: 500, url: String::new(), body: String::new() }),
            ok(items_body(0..1)),
        ]));
        let service = service(transport.clone());
        let query = DocumentQuery::new("", "plan");

        assert!(service.search(&query, true).await.is_error());
        assert!(service.cache().is_empty());
        assert!(!service.search(&query, true).await.is_error());
        assert_eq!(transport.call_count(), 2);
    }

    /// Holds every request until two are in flight.
    struct RendezvousTransport {
        barrier: Barrier,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentTransport for RendezvousTransport {
        async fn get(
            &self,
            _url: &str,
            _params: &[(&'static str, String)],
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.barrier.wait().await;
            ok(items_body(0..3))
        }
    }

    #[tokio::test]
    async fn test_concurrent_identical_queries_both_fetch() {
        let transport = Arc::new(RendezvousTransport {
            barrier: Barrier::new(2),
            calls: AtomicUsize::new(0),
        });
        let service = service(transport.clone());
        let query = DocumentQuery::new("동시", "report");

        let (a, b) = tokio::join!(service.search(&query, true), service.search(&query, true));

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(a, b);
        assert_eq!(service.cache().len(), 1);
        assert_eq!(service.cache().get(&query.fingerprint()), Some(a));
    }

    #[tokio::test]
    async fn test_fetch_all_stops_on_short_page() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok(items_body(0..50)),
            ok(items_body(50..70)),
            ok(items_body(70..120)),
        ]));
        let service = service(transport.clone());

        let items = service.fetch_all("", "all", "", 10).await;
        assert_eq!(items.len(), 70);
        assert_eq!(transport.call_count(), 2);

        let calls = transport.calls.lock().unwrap();
        assert!(calls[1].1.contains(&("pageNo", "2".to_string())));
        assert!(calls[1].1.contains(&("numOfRows", "50".to_string())));
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_items_before_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok(items_body(0..50)),
            Err(TransportError::Other("reset".into())),
        ]));
        let service = service(transport.clone());

        let items = service.fetch_all("", "all", "", 10).await;
        assert_eq!(items.len(), 50);
    }

    #[tokio::test]
    async fn test_fetch_all_respects_max_pages() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ok(items_body(0..50)),
            ok(items_body(50..100)),
            ok(items_body(100..150)),
        ]));
        let service = service(transport.clone());

        let items = service.fetch_all("", "all", "", 2).await;
        assert_eq!(items.len(), 100);
        assert_eq!(transport.call_count(), 2);
    }
}
