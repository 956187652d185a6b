use std::time::{Duration, Instant};

use policyscout_core::{ActivityEventType, EventDraft, Phase, PipelineConfig};
use policyscout_search::{SearchClient, SearchError, SearchRequest, SearchResponse};

use crate::activity::ActivityCollector;

/// What every phase needs: the search client, the run's activity buffer,
/// and the pipeline settings.
#[derive(Clone, Copy)]
pub struct PhaseContext<'a> {
    pub search: &'a SearchClient,
    pub activity: &'a ActivityCollector,
    pub config: &'a PipelineConfig,
}

/// Tags attached to the events of one tracked query.
#[derive(Default, Clone, Copy)]
pub(crate) struct QueryTags<'a> {
    pub country: Option<&'a str>,
    pub item: Option<&'a str>,
}

impl<'a> PhaseContext<'a> {
    pub fn new(
        search: &'a SearchClient,
        activity: &'a ActivityCollector,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            search,
            activity,
            config,
        }
    }

    pub(crate) fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.config.batch_pause_ms)
    }

    pub(crate) fn emit(&self, draft: EventDraft) {
        self.activity.emit(draft);
    }

    /// Search, recording `query_sent` and then `cache_hit` or `cache_miss`.
    /// Failures are returned for the caller to record.
    pub(crate) async fn tracked_search(
        &self,
        phase: Phase,
        request: SearchRequest,
        tags: QueryTags<'_>,
    ) -> Result<SearchResponse, SearchError> {
        let sent = tag(EventDraft::new(phase, ActivityEventType::QuerySent), tags)
            .query(request.query.clone());
        self.emit(sent);

        let started = Instant::now();
        let response = self.search.search(request).await?;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = if response.from_cache {
            ActivityEventType::CacheHit
        } else {
            ActivityEventType::CacheMiss
        };
        self.emit(
            tag(EventDraft::new(phase, outcome), tags)
                .tokens(response.usage.total_tokens)
                .duration_ms(elapsed),
        );
        Ok(response)
    }

    /// Record a failed item as an `api_error`.
    pub(crate) fn api_error(&self, phase: Phase, tags: QueryTags<'_>, error: &impl ToString) {
        self.emit(tag(EventDraft::new(phase, ActivityEventType::ApiError), tags).error(error.to_string()));
    }
}

fn tag(mut draft: EventDraft, tags: QueryTags<'_>) -> EventDraft {
    if let Some(c) = tags.country {
        draft = draft.country(c);
    }
    if let Some(i) = tags.item {
        draft = draft.item(i);
    }
    draft
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use policyscout_search::{MemoryCache, Usage};

    use super::*;
    use crate::testing::{Harness, ScriptedBackend, fast_search_config};

    #[tokio::test]
    async fn cached_answers_keep_their_token_count() {
        let mut answer = SearchResponse::text("Estonia runs a startup visa.");
        answer.usage = Usage {
            prompt_tokens: 40,
            completion_tokens: 60,
            total_tokens: 100,
        };
        let mut h = Harness::new(ScriptedBackend::new().on("startup visa", answer));
        h.search = SearchClient::new(h.backend.clone(), fast_search_config())
            .with_cache(Arc::new(MemoryCache::new(16)));

        let tags = QueryTags {
            country: Some("Estonia"),
            item: None,
        };
        for _ in 0..2 {
            h.ctx()
                .tracked_search(Phase::SignalHunter, SearchRequest::new("startup visa"), tags)
                .await
                .unwrap();
        }

        let events = h.activity.events();
        let outcomes: Vec<_> = events
            .iter()
            .filter(|e| e.event_type != ActivityEventType::QuerySent)
            .collect();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].event_type, ActivityEventType::CacheMiss);
        assert_eq!(outcomes[1].event_type, ActivityEventType::CacheHit);
        assert!(outcomes.iter().all(|e| e.tokens_used == Some(100)));
        assert_eq!(outcomes[1].target_country.as_deref(), Some("Estonia"));
        assert_eq!(h.backend.calls().len(), 1);
    }
}
