//! Client-side request layer: TTL caching plus collapsing of concurrent
//! identical requests into one transport call.
//!
//! Only idempotent reads belong here. Form submissions and chat messages
//! are distinct user actions and must not go through either path.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use reqwest::Method;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::cache::ResponseCache;
use crate::error::FetchError;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, DEDUP_JOINS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
        }
    }

    /// Key under which concurrent identical requests are collapsed.
    pub fn pending_key(&self) -> String {
        format!("{}:{}", self.method, self.url)
    }
}

/// Anything that can turn a request into a JSON body.
pub trait Transport: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

/// `reqwest`-backed transport. Non-2xx answers become `FetchError::Status`.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        let res = self
            .client
            .request(request.method.clone(), &request.url)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        res.json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,
    /// Overrides the cache key, which is the URL otherwise.
    pub cache_key: Option<String>,
    pub ttl: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            cache_key: None,
            ttl: None,
        }
    }
}

type Waiter = oneshot::Sender<Result<Value, FetchError>>;
type PendingMap = Arc<DashMap<String, Vec<Waiter>>>;

pub struct RequestClient<T: Transport> {
    transport: Arc<T>,
    cache: ResponseCache,
    pending: PendingMap,
}

impl<T: Transport> RequestClient<T> {
    pub fn new(transport: T, cache: ResponseCache) -> Self {
        Self {
            transport: Arc::new(transport),
            cache,
            pending: Arc::new(DashMap::new()),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Number of requests currently in flight.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Serve from cache when fresh, otherwise fetch and store the body.
    /// Failures are never cached.
    pub async fn cached_fetch(&self, url: &str, options: FetchOptions) -> Result<Value, FetchError> {
        let key = options.cache_key.clone().unwrap_or_else(|| url.to_string());
        let ttl = options.ttl.unwrap_or_else(|| self.cache.default_ttl());

        if let Some(data) = self.cache.get(&key, ttl) {
            CACHE_HITS.inc();
            debug!(%key, "cache hit");
            return Ok(data);
        }
        CACHE_MISSES.inc();
        debug!(%key, "cache miss");

        let data = self.deduplicated_fetch(url, options).await?;
        self.cache.set(&key, data.clone());
        Ok(data)
    }

    /// Share one in-flight request among every caller asking for the same
    /// `"{method}:{url}"`. The entry is dropped as soon as the request
    /// settles, so a later call always goes back to the transport.
    pub async fn deduplicated_fetch(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<Value, FetchError> {
        let request = FetchRequest {
            method: options.method,
            url: url.to_string(),
        };
        let key = request.pending_key();
        let (tx, rx) = oneshot::channel();

        // check-and-register happens under the shard lock
        let leader = match self.pending.entry(key.clone()) {
            Entry::Occupied(mut waiters) => {
                waiters.get_mut().push(tx);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![tx]);
                true
            }
        };

        if leader {
            let transport = Arc::clone(&self.transport);
            let guard = PendingGuard {
                pending: Arc::clone(&self.pending),
                key,
                settled: false,
            };
            tokio::spawn(async move {
                let mut guard = guard;
                let result = transport.fetch(&request).await;
                guard.settle(result);
            });
        } else {
            DEDUP_JOINS.inc();
            debug!(%key, "joined in-flight request");
        }

        rx.await
            .map_err(|_| FetchError::Abandoned(url.to_string()))?
    }
}

/// Removes the pending entry even if the fetch task dies early; waiters
/// then observe `FetchError::Abandoned` instead of hanging.
struct PendingGuard {
    pending: PendingMap,
    key: String,
    settled: bool,
}

impl PendingGuard {
    fn settle(&mut self, result: Result<Value, FetchError>) {
        self.settled = true;
        if let Some((_, waiters)) = self.pending.remove(&self.key) {
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.pending.remove(&self.key);
        }
    }
}
