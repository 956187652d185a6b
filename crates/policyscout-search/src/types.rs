use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful research assistant. Be concise and factual.";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// One query to the research service.
///
/// `model` is filled from [`SearchConfig`](crate::SearchConfig) when unset.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub system_prompt: String,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub return_citations: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            return_citations: true,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    /// Cache key: a digest of query and system prompt only. Model and
    /// sampling parameters do not partition the cache.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.query.as_bytes());
        hasher.update(b"|");
        hasher.update(self.system_prompt.as_bytes());
        format!("search:{}", hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
}

impl Citation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            snippet: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub content: String,
    pub citations: Vec<Citation>,
    pub model: Option<String>,
    pub usage: Usage,
    /// Set by the client when the response came from the cache; never stored.
    #[serde(skip)]
    pub from_cache: bool,
}

impl SearchResponse {
    /// A response with content only, as produced by test doubles.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            citations: Vec::new(),
            model: None,
            usage: Usage::default(),
            from_cache: false,
        }
    }

    pub fn with_citations<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.citations = urls.into_iter().map(Citation::new).collect();
        self
    }

    pub fn first_citation(&self) -> Option<&Citation> {
        self.citations.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_depends_on_query_and_prompt_only() {
        let a = SearchRequest::new("q").system_prompt("p");
        let b = SearchRequest::new("q")
            .system_prompt("p")
            .model("sonar")
            .temperature(0.9)
            .max_tokens(10);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), SearchRequest::new("q").cache_key());
        assert!(a.cache_key().starts_with("search:"));
        assert_eq!(a.cache_key().len(), "search:".len() + 64);
    }

    #[test]
    fn from_cache_is_not_serialized() {
        let mut r = SearchResponse::text("hello");
        r.from_cache = true;
        let json = serde_json::to_string(&r).unwrap();
        let back: SearchResponse = serde_json::from_str(&json).unwrap();
        assert!(!back.from_cache);
        assert_eq!(back.content, "hello");
    }
}
