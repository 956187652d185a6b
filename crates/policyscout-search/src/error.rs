use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("search API key is not configured")]
    MissingApiKey,
}

impl SearchError {
    /// 401 or 403: misconfiguration, never retried.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. }) || self.is_missing_key()
    }

    /// 429: retried after the long cooldown.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Status { status: 429, .. })
    }

    fn is_missing_key(&self) -> bool {
        matches!(self, Self::MissingApiKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> SearchError {
        SearchError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn classification_by_status() {
        assert!(status(401).is_auth());
        assert!(status(403).is_auth());
        assert!(!status(500).is_auth());
        assert!(status(429).is_rate_limited());
        assert!(!status(503).is_rate_limited());
        assert!(SearchError::MissingApiKey.is_auth());
    }

    #[test]
    fn display_embeds_status() {
        assert_eq!(
            SearchError::Status {
                status: 502,
                body: "bad gateway".into()
            }
            .to_string(),
            "search API returned 502: bad gateway"
        );
    }
}
