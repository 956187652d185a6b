use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://api.perplexity.ai/chat/completions";
pub const DEFAULT_MODEL: &str = "sonar-pro";

/// Search client settings. Every field has a default, so a partial JSON
/// config file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_url: String,
    pub model: String,
    /// Minimum spacing between outbound calls.
    pub min_interval_ms: u64,
    pub max_attempts: u32,
    /// Backoff before attempt `n` (0-based, n > 0) is `retry_base_ms * 2^n`.
    pub retry_base_ms: u64,
    /// Extra wait after a 429.
    pub rate_limit_cooldown_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            min_interval_ms: 200,
            max_attempts: 3,
            retry_base_ms: 200,
            rate_limit_cooldown_ms: 5_000,
            cache_ttl_secs: 86_400,
            cache_capacity: 10_000,
            request_timeout_secs: 60,
        }
    }
}

impl SearchConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: SearchConfig = serde_json::from_str(r#"{"model": "sonar"}"#).unwrap();
        assert_eq!(cfg.model, "sonar");
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn backoff_doubles() {
        let cfg = SearchConfig::default();
        assert_eq!(cfg.backoff(1), Duration::from_millis(400));
        assert_eq!(cfg.backoff(2), Duration::from_millis(800));
    }
}
