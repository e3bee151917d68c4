use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Source of JSON documents keyed by URL. Implementations swallow transport
/// and decoding failures and report them as `None`.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<Value>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<Value> {
        tracing::debug!("[api_fetch] fetching: {url}");

        let res = match self.client.get(url).send().await {
            Ok(res) => res,
            Err(e) if e.is_timeout() => {
                tracing::error!("[api_fetch] timeout: {e} for url: {url}");
                return None;
            }
            Err(e) if e.is_connect() => {
                tracing::error!("[api_fetch] connection error: {e} for url: {url}");
                return None;
            }
            Err(e) => {
                tracing::error!("[api_fetch] request error: {e} for url: {url}");
                return None;
            }
        };

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!("[api_fetch] http error: {status} for url: {url}");
            tracing::error!("[api_fetch] response body: {body}");
            return None;
        }

        match res.json::<Value>().await {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!("[api_fetch] invalid json: {e} for url: {url}");
                None
            }
        }
    }
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

/// Memoizes another fetcher per URL. Only successful responses are kept, so a
/// failed lookup is retried on the next call.
pub struct CachedFetcher<F> {
    inner: F,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl<F: Fetch> CachedFetcher<F> {
    pub fn new(inner: F, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cached(&self, url: &str) -> Option<Value> {
        let entry = self.entries.get(url)?;
        if entry.stored_at.elapsed() < self.ttl {
            return Some(entry.value.clone());
        }
        // drop the read guard before removing, dashmap would deadlock otherwise
        drop(entry);
        self.entries.remove(url);
        None
    }
}

#[async_trait]
impl<F: Fetch> Fetch for CachedFetcher<F> {
    async fn fetch(&self, url: &str) -> Option<Value> {
        if let Some(value) = self.cached(url) {
            tracing::debug!("[api_fetch] cache hit: {url}");
            return Some(value);
        }

        let value = self.inner.fetch(url).await?;
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        response: Option<Value>,
    }

    #[async_trait]
    impl Fetch for CountingFetcher {
        async fn fetch(&self, _url: &str) -> Option<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn test_cached_fetcher_memoizes_per_url() {
        let fetcher = CachedFetcher::new(
            CountingFetcher {
                calls: AtomicUsize::new(0),
                response: Some(json!({"totalItems": 1})),
            },
            DEFAULT_CACHE_TTL,
        );

        assert_eq!(fetcher.fetch("a").await, Some(json!({"totalItems": 1})));
        assert_eq!(fetcher.fetch("a").await, Some(json!({"totalItems": 1})));
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 1);

        fetcher.fetch("b").await;
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.len(), 2);
    }

    #[tokio::test]
    async fn test_cached_fetcher_does_not_keep_failures() {
        let fetcher = CachedFetcher::new(
            CountingFetcher {
                calls: AtomicUsize::new(0),
                response: None,
            },
            DEFAULT_CACHE_TTL,
        );

        assert!(fetcher.fetch("a").await.is_none());
        assert!(fetcher.fetch("a").await.is_none());
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 2);
        assert!(fetcher.is_empty());
    }

    #[tokio::test]
    async fn test_cached_fetcher_expires_entries() {
        let fetcher = CachedFetcher::new(
            CountingFetcher {
                calls: AtomicUsize::new(0),
                response: Some(json!({})),
            },
            Duration::ZERO,
        );

        fetcher.fetch("a").await;
        fetcher.fetch("a").await;
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 2);
    }
}
