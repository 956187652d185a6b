//! Offline search double and fixtures for pipeline tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use policyscout_core::{
    Evidence, EvidenceType, PipelineConfig, PolicySignal, SourceType, VettedPolicy,
};
use policyscout_search::{
    SearchBackend, SearchClient, SearchConfig, SearchError, SearchRequest, SearchResponse,
};
use uuid::Uuid;

use crate::activity::ActivityCollector;
use crate::context::PhaseContext;

enum Reply {
    Ok(SearchResponse),
    Status(u16),
}

struct Rule {
    needle: String,
    reply: Reply,
    /// Matching requests left to pass through to later rules.
    skip: usize,
}

/// Answers each request with the first rule whose needle appears in the
/// query or system prompt, else an empty response. Rules built with
/// `fail_after` pass their first matches on to the next rule.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<SearchRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: &str, response: SearchResponse) -> Self {
        self.push(needle, Reply::Ok(response), 0)
    }

    pub fn fail_on(self, needle: &str, status: u16) -> Self {
        self.push(needle, Reply::Status(status), 0)
    }

    /// Let the first `passes` matching requests fall through to later
    /// rules, then fail every one after.
    pub fn fail_after(self, needle: &str, passes: usize, status: u16) -> Self {
        self.push(needle, Reply::Status(status), passes)
    }

    fn push(self, needle: &str, reply: Reply, skip: usize) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            reply,
            skip,
        });
        self
    }

    pub fn calls(&self) -> Vec<SearchRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    async fn complete(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        self.calls.lock().unwrap().push(request.clone());
        let mut rules = self.rules.lock().unwrap();
        let matching = rules.iter_mut().filter(|r| {
            request.query.contains(&r.needle) || request.system_prompt.contains(&r.needle)
        });
        for rule in matching {
            if rule.skip > 0 {
                rule.skip -= 1;
                continue;
            }
            return match &rule.reply {
                Reply::Ok(resp) => Ok(resp.clone()),
                Reply::Status(status) => Err(SearchError::Status {
                    status: *status,
                    body: "scripted failure".into(),
                }),
            };
        }
        Ok(SearchResponse::text(""))
    }
}

/// Search config with no spacing and a single attempt.
pub(crate) fn fast_search_config() -> SearchConfig {
    SearchConfig {
        min_interval_ms: 0,
        max_attempts: 1,
        ..SearchConfig::default()
    }
}

/// A scripted backend wired into a client, an activity buffer, and config.
pub(crate) struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub search: SearchClient,
    pub activity: ActivityCollector,
    pub config: PipelineConfig,
}

impl Harness {
    pub fn new(backend: ScriptedBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            search: SearchClient::new(backend.clone(), fast_search_config()),
            backend,
            activity: ActivityCollector::new(Uuid::new_v4(), "Ireland"),
            config: PipelineConfig {
                batch_pause_ms: 0,
                ..PipelineConfig::default()
            },
        }
    }

    pub fn ctx(&self) -> PhaseContext<'_> {
        PhaseContext::new(&self.search, &self.activity, &self.config)
    }

    pub fn count(&self, kind: policyscout_core::ActivityEventType) -> usize {
        self.activity
            .events()
            .iter()
            .filter(|e| e.event_type == kind)
            .count()
    }
}

pub(crate) fn signal(name: &str, country: &str) -> PolicySignal {
    PolicySignal {
        name: name.into(),
        category: "Tax Incentive".into(),
        source_country: country.into(),
        source_url: format!("https://{}.example/{}", country.to_lowercase(), name.len()),
        source_title: None,
        description: format!("{name} description"),
    }
}

pub(crate) fn evidence(url: &str, kind: EvidenceType, confidence: f64) -> Evidence {
    let mut e = Evidence::new(url, kind, SourceType::infer_from_url(url), "A claim.");
    e.confidence = Some(confidence);
    e
}

pub(crate) fn vetted(name: &str, success: f64, criticism: f64) -> VettedPolicy {
    VettedPolicy {
        success_evidence: vec![
            evidence("https://a.gov.ee/1", EvidenceType::SuccessMetric, 0.8),
            evidence("https://oecd.org/2", EvidenceType::SuccessMetric, 0.7),
        ],
        criticism_evidence: Vec::new(),
        success_score: success,
        criticism_score: criticism,
        ..VettedPolicy::unscored(signal(name, "Estonia"))
    }
}
