//! Client for the external research service.
//!
//! [`SearchClient`] wraps a [`SearchBackend`] with a response cache, a
//! process-wide [`RateLimiter`], and bounded retry with backoff. The backend
//! is the only part that talks HTTP; [`PerplexityBackend`] is the production
//! implementation.

mod cache;
mod client;
mod config;
mod error;
mod perplexity;
mod rate;
mod types;

pub use cache::{CacheError, MemoryCache, ResponseCache};
pub use client::{SearchBackend, SearchClient};
pub use config::SearchConfig;
pub use error::SearchError;
pub use perplexity::PerplexityBackend;
pub use rate::RateLimiter;
pub use types::{
    Citation, DEFAULT_MAX_TOKENS, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, SearchRequest,
    SearchResponse, Usage,
};
