use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::rate::RateLimiter;
use crate::types::{SearchRequest, SearchResponse};

/// Transport to the research service: one request, one response, no retry.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn complete(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError>;
}

/// Cached, rate-limited, retrying search.
pub struct SearchClient {
    backend: Arc<dyn SearchBackend>,
    cache: Option<Arc<dyn ResponseCache>>,
    limiter: Arc<RateLimiter>,
    config: SearchConfig,
}

impl SearchClient {
    /// A client with its own rate limiter and no cache.
    pub fn new(backend: Arc<dyn SearchBackend>, config: SearchConfig) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(config.min_interval())),
            backend,
            cache: None,
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share a limiter with other clients in the process.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run one query.
    ///
    /// A cache hit returns immediately with `from_cache` set. Otherwise up to
    /// `max_attempts` calls are made, each after the rate limiter. Auth
    /// failures return at once; a 429 adds the long cooldown before the next
    /// attempt. When every attempt fails the last error is returned.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        let mut request = request;
        if request.model.is_none() {
            request.model = Some(self.config.model.clone());
        }
        let key = request.cache_key();

        if let Some(mut hit) = self.cached(&key).await {
            debug!(query = %preview(&request.query), "search cache hit");
            hit.from_cache = true;
            return Ok(hit);
        }

        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.backoff(attempt)).await;
                debug!(attempt = attempt + 1, max = attempts, "retrying search");
            }
            self.limiter.acquire().await;

            match self.backend.complete(&request).await {
                Ok(mut response) => {
                    response.from_cache = false;
                    self.store(&key, &response).await;
                    return Ok(response);
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "search attempt failed");
                    if e.is_rate_limited() {
                        tokio::time::sleep(self.config.rate_limit_cooldown()).await;
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(SearchError::Status {
            status: 0,
            body: "no attempts made".into(),
        }))
    }

    async fn cached(&self, key: &str) -> Option<SearchResponse> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: &str, response: &SearchResponse) {
        if let Some(cache) = &self.cache
            && let Err(e) = cache.setex(key, self.config.cache_ttl(), response).await
        {
            warn!(error = %e, "failed to cache search response");
        }
    }
}

fn preview(query: &str) -> String {
    query.chars().take(50).collect()
}
