//! Phase 1: find named policy programs in the target countries.
//!
//! Each query's answer goes through a second, extraction-only call that
//! returns a JSON array of `{name, category, description}`. Signals are
//! deduplicated on lowercased name plus source country, first one wins.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use policyscout_core::{
    ActivityEventType, EventDraft, Phase, PolicyInterpretation, PolicySignal, SearchMode,
    country_context,
};
use policyscout_search::{Citation, SearchError, SearchRequest, SearchResponse};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::context::{PhaseContext, QueryTags};

const POLICY_DOMAINS: &[&str] = &[
    "R&D tax incentives and credits",
    "Startup grants and funding programs",
    "Tech talent and startup visa programs",
    "Regulatory sandbox initiatives",
    "Green technology and cleantech incentives",
    "Digital transformation and e-government",
];

const DISCOVERY_QUERIES: &[&str] = &[
    "OECD innovation policy recommendations 2024 2025 best practices",
    "Nordic countries innovation policy new initiatives 2024",
    "Asia Pacific startup policy government programs 2024 2025",
    "European Union innovation policy new programs member states",
    "emerging economies innovation policy successful programs",
];

const EXTRACTION_SYSTEM_PROMPT: &str = "You are a policy extraction specialist. Return ONLY a \
    valid JSON array, no other text. Example: [{\"name\": \"R&D Tax Credit\", \"category\": \
    \"Tax Incentive\", \"description\": \"Tax credit for research activities\"}]";

const DEFAULT_CATEGORY: &str = "Innovation Policy";

/// Name variants searched per country in interpretation mode.
const MAX_NAME_VARIANTS: usize = 3;

static JSON_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[\s\S]*\]").expect("json array regex"));
static COUNTRY_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:in|from|by)\s+(\w+(?:\s+\w+)?)\s+(?:government|ministry|authority)")
        .expect("country mention regex")
});

/// How signal queries are built for each country.
#[derive(Debug, Clone, PartialEq)]
pub enum HuntStrategy {
    /// Sweep fixed policy domains using the country's agencies.
    Broad,
    /// Look for a named topic.
    Topic(String),
    /// Start from a problem and look for programs addressing it.
    Reverse(String),
    /// Search for a structured policy idea and its aliases.
    Interpretation(PolicyInterpretation),
}

impl HuntStrategy {
    pub fn search_mode(&self) -> SearchMode {
        match self {
            Self::Broad => SearchMode::Broad,
            Self::Topic(_) => SearchMode::Topic,
            Self::Reverse(_) => SearchMode::Reverse,
            Self::Interpretation(_) => SearchMode::Interpretation,
        }
    }

    /// Free-text query recorded on the run.
    pub fn search_query(&self) -> Option<String> {
        match self {
            Self::Broad => None,
            Self::Topic(q) | Self::Reverse(q) => Some(q.clone()),
            Self::Interpretation(i) => Some(i.policy_name.clone()),
        }
    }

    pub fn interpretation(&self) -> Option<&PolicyInterpretation> {
        match self {
            Self::Interpretation(i) => Some(i),
            _ => None,
        }
    }

    /// Queries for one country. Broad mode needs agency context and yields
    /// nothing for countries without it.
    pub fn queries(&self, country: &str, year: i32) -> Vec<String> {
        let years = recent_years(year);
        let context = country_context(country);
        match self {
            Self::Broad => {
                let Some(ctx) = context else {
                    return Vec::new();
                };
                let agencies = ctx.agency_mention();
                let mut queries: Vec<String> = POLICY_DOMAINS
                    .iter()
                    .map(|domain| {
                        format!(
                            "{country} government policy \"{domain}\" program initiative \
                             ({agencies}) {years}"
                        )
                    })
                    .collect();
                queries.extend(ctx.specializations.iter().take(2).map(|spec| {
                    format!(
                        "{country} {spec} government incentive policy program {} {years}",
                        ctx.primary_agency()
                    )
                }));
                queries
            }
            Self::Topic(topic) => vec![format!(
                "{country} innovation policy \"{topic}\" government program initiative legislation"
            )],
            Self::Reverse(problem) => vec![format!(
                "{country} government programs addressing \"{problem}\" policy initiatives \
                 outcomes {years}"
            )],
            Self::Interpretation(idea) => {
                let mut queries: Vec<String> = idea
                    .name_variants()
                    .iter()
                    .take(MAX_NAME_VARIANTS)
                    .map(|name| format!("\"{name}\" {country} government policy program {years}"))
                    .collect();
                let levers = &idea.levers;
                let agencies = context
                    .map(|c| format!(" ({})", c.agency_mention()))
                    .unwrap_or_default();
                queries.push(format!(
                    "{country} {} {} for {} government program{agencies}",
                    idea.category, levers.mechanism, levers.target_group
                ));
                queries.push(match &levers.sector {
                    Some(sector) => format!(
                        "{country} {sector} policy {} initiative {years}",
                        levers.intended_outcome
                    ),
                    None => format!(
                        "{country} government policy {} initiative {years}",
                        levers.intended_outcome
                    ),
                });
                queries
            }
        }
    }

    fn system_prompt(&self, country: &str) -> String {
        let base = format!(
            "You are a policy research analyst. Search for specific innovation policy \
             mechanisms, legislative tools, or government programs from {country}. Focus on \
             quantifiable programs with clear names (e.g., \"R&D Tax Super-deduction\", \
             \"Startup Visa Program\", \"Innovation Fund Grant\"). Include program names, key \
             features, and any available metrics. Be factual and cite sources."
        );
        match self {
            Self::Interpretation(idea) => format!(
                "{base}\nLook for policies similar to \"{}\": {}",
                idea.policy_name, idea.summary
            ),
            _ => base,
        }
    }
}

/// The current year and the two before, space separated.
fn recent_years(year: i32) -> String {
    format!("{year} {} {}", year - 1, year - 2)
}

/// Run the signal hunt across `countries`.
pub async fn hunt_signals(
    ctx: PhaseContext<'_>,
    countries: &[String],
    strategy: &HuntStrategy,
) -> Vec<PolicySignal> {
    let year = Utc::now().year();
    let mut hunt = Dedup::default();

    for country in countries {
        let queries = strategy.queries(country, year);
        if queries.is_empty() {
            warn!(country = %country, "no query context for country, skipping");
            continue;
        }
        info!(country = %country, queries = queries.len(), "hunting signals");
        let system_prompt = strategy.system_prompt(country);

        for query in queries {
            let tags = QueryTags {
                country: Some(country.as_str()),
                item: None,
            };
            let request = SearchRequest::new(query).system_prompt(system_prompt.clone());
            let result = async {
                let response = ctx.tracked_search(Phase::SignalHunter, request, tags).await?;
                extract_signals(ctx, &response, country).await
            }
            .await;
            match result {
                Ok(found) => {
                    let added = hunt.absorb(ctx, found);
                    debug!(country = %country, added, "query processed");
                }
                Err(e) => {
                    warn!(country = %country, error = %e, "signal query failed");
                    ctx.api_error(Phase::SignalHunter, tags, &e);
                }
            }
        }
    }

    info!(count = hunt.signals.len(), "signal hunt complete");
    hunt.signals
}

/// Country-agnostic exploration: run the discovery queries and attribute
/// signals to countries named in the answer text.
pub async fn discover_signals(ctx: PhaseContext<'_>) -> Vec<PolicySignal> {
    let domestic = &ctx.config.domestic.country;
    let system_prompt = format!(
        "You are a global policy research analyst. Identify specific, named innovation \
         policies from countries around the world that could be relevant for {domestic}. \
         Focus on:\n1. Specific program names (not vague concepts)\n2. Programs with \
         measurable success\n3. Policies from peer economies or innovative nations\nInclude \
         the country of origin for each policy."
    );
    let mut hunt = Dedup::default();

    for &query in DISCOVERY_QUERIES {
        let request = SearchRequest::new(query).system_prompt(system_prompt.clone());
        let tags = QueryTags::default();
        let response = match ctx.tracked_search(Phase::SignalHunter, request, tags).await {
            Ok(response) => response,
            Err(e) => {
                warn!(query, error = %e, "discovery query failed");
                ctx.api_error(Phase::SignalHunter, tags, &e);
                continue;
            }
        };
        for country in mentioned_countries(&response.content) {
            match extract_signals(ctx, &response, &country).await {
                Ok(found) => {
                    hunt.absorb(ctx, found);
                }
                Err(e) => {
                    warn!(query, country = %country, error = %e, "discovery extraction failed");
                    let tags = QueryTags {
                        country: Some(country.as_str()),
                        item: None,
                    };
                    ctx.api_error(Phase::SignalHunter, tags, &e);
                }
            }
        }
    }

    info!(count = hunt.signals.len(), "discovery complete");
    hunt.signals
}

/// Countries named as `in|from|by X government|ministry|authority`, in
/// order of first mention. Loose by nature: "the Finnish" is a country here.
pub fn mentioned_countries(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in COUNTRY_MENTION.captures_iter(content) {
        let country = caps[1].to_string();
        if !out.contains(&country) {
            out.push(country);
        }
    }
    out
}

#[derive(Default)]
struct Dedup {
    seen: HashSet<(String, String)>,
    signals: Vec<PolicySignal>,
}

impl Dedup {
    /// Keep unseen signals, emitting `signal_found` for each. Returns how
    /// many were new.
    fn absorb(&mut self, ctx: PhaseContext<'_>, found: Vec<PolicySignal>) -> usize {
        let mut added = 0;
        for signal in found {
            if !self.seen.insert(signal.dedup_key()) {
                continue;
            }
            ctx.emit(
                EventDraft::new(Phase::SignalHunter, ActivityEventType::SignalFound)
                    .item(signal.name.clone())
                    .country(signal.source_country.clone())
                    .meta("category", signal.category.clone()),
            );
            self.signals.push(signal);
            added += 1;
        }
        added
    }
}

async fn extract_signals(
    ctx: PhaseContext<'_>,
    response: &SearchResponse,
    country: &str,
) -> Result<Vec<PolicySignal>, SearchError> {
    let request = SearchRequest::new(format!(
        "Extract specific named policy programs from this text. Return JSON array with objects \
         containing: name (exact policy name), category (one of: R&D Incentives, Talent Visa, \
         Startup Support, Innovation Fund, Tax Incentive, Digital Policy), description (one \
         sentence). Only include specific named programs, not vague concepts.\n\n\
         Text to analyze:\n{}",
        response.content
    ))
    .system_prompt(EXTRACTION_SYSTEM_PROMPT)
    .temperature(0.0)
    .max_tokens(1024);

    let extraction = ctx.search.search(request).await?;
    Ok(parse_extracted(
        &extraction.content,
        &response.citations,
        country,
    ))
}

#[derive(Deserialize)]
struct Extracted {
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parse the extraction call's answer into signals for `country`.
///
/// The widest `[...]` span must be a JSON array of objects with a `name`.
/// Anything else yields no signals.
pub fn parse_extracted(content: &str, citations: &[Citation], country: &str) -> Vec<PolicySignal> {
    let Some(m) = JSON_ARRAY.find(content) else {
        warn!(country, "no JSON array in extraction response");
        return Vec::new();
    };
    let items: Vec<Extracted> = match serde_json::from_str(m.as_str()) {
        Ok(items) => items,
        Err(e) => {
            warn!(country, error = %e, "failed to parse extracted policies");
            return Vec::new();
        }
    };

    let source = citations.first();
    items
        .into_iter()
        .filter(|p| !p.name.trim().is_empty())
        .map(|p| PolicySignal {
            name: p.name.trim().to_string(),
            category: p
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            source_country: country.to_string(),
            source_url: source.map(|c| c.url.clone()).unwrap_or_default(),
            source_title: source.and_then(|c| c.title.clone()),
            description: p.description.unwrap_or_default(),
        })
        .collect()
}
