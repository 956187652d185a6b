//! HTTP backend for Perplexity's chat completions endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::SearchBackend;
use crate::config::{DEFAULT_MODEL, SearchConfig};
use crate::error::SearchError;
use crate::types::{Citation, SearchRequest, SearchResponse, Usage};

pub struct PerplexityBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl PerplexityBackend {
    /// Fails with [`SearchError::MissingApiKey`] when `api_key` is blank.
    pub fn new(config: &SearchConfig, api_key: impl Into<String>) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    return_citations: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    citations: Vec<RawCitation>,
    search_results: Vec<SearchResult>,
    usage: Option<RawUsage>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Citations arrive either as bare URLs or as objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCitation {
    Url(String),
    Object { url: String, title: Option<String> },
}

#[derive(Deserialize)]
struct SearchResult {
    url: String,
    title: Option<String>,
    snippet: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ChatResponse> for SearchResponse {
    fn from(raw: ChatResponse) -> Self {
        let mut citations: Vec<Citation> = raw
            .citations
            .into_iter()
            .map(|c| match c {
                RawCitation::Url(url) => Citation::new(url),
                RawCitation::Object { url, title } => Citation {
                    url,
                    title,
                    snippet: None,
                },
            })
            .collect();

        if citations.is_empty() {
            citations = raw
                .search_results
                .into_iter()
                .map(|r| Citation {
                    url: r.url,
                    title: r.title,
                    snippet: r.snippet,
                })
                .collect();
        } else {
            for result in raw.search_results {
                if let Some(c) = citations.iter_mut().find(|c| c.url == result.url) {
                    c.title = c.title.take().or(result.title);
                    c.snippet = c.snippet.take().or(result.snippet);
                }
            }
        }

        let usage = raw.usage.unwrap_or_default();
        Self {
            content: raw
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message)
                .and_then(|m| m.content)
                .unwrap_or_default(),
            citations,
            model: raw.model,
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            from_cache: false,
        }
    }
}

#[async_trait]
impl SearchBackend for PerplexityBackend {
    async fn complete(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let body = ChatRequest {
            model: request.model.as_deref().unwrap_or(DEFAULT_MODEL),
            messages: [
                Message {
                    role: "system",
                    content: &request.system_prompt,
                },
                Message {
                    role: "user",
                    content: &request.query,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            return_citations: request.return_citations,
        };

        debug!(url = %self.api_url, model = body.model, "sending search request");
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        let raw: ChatResponse = serde_json::from_str(&text)?;
        let response = SearchResponse::from(raw);
        debug!(
            citations = response.citations.len(),
            tokens = response.usage.total_tokens,
            "search response received"
        );
        Ok(response)
    }
}
