//! Phase 3: does the domestic country already have it?
//!
//! One search per vetted policy, restricted to the domestic allow-list of
//! sites. The answer is classified by [`classify`], an ordered rule chain:
//!
//! 1. an explicit `Classification:` or `Status:` label;
//! 2. a line that starts with one of the status words;
//! 3. the citations: no domestic source means absent, any domestic source
//!    means discussed. Never `exists` without a label.

use std::sync::LazyLock;

use policyscout_core::{
    ActivityEventType, AnalyzedPolicy, DomesticProfile, DomesticStatus, EventDraft, Evidence,
    EvidenceType, OpportunityValue, Phase, Sentiment, SourceType, VettedPolicy, clamp_claim,
    derive_publisher, extract_citation_claims, normalize_snippet,
};
use policyscout_search::{Citation, SearchRequest};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::batch::in_batches;
use crate::context::{PhaseContext, QueryTags};

pub const ANALYSIS_FAILED_NOTE: &str = "Gap analysis failed - manual review required";

const NOTES_MAX_CHARS: usize = 300;
const DOMESTIC_CONFIDENCE: f64 = 0.7;

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:classification|status)\s*[:\-]\s*([A-Z_ \t-]+)").expect("label regex")
});
static LEADING_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(exists|absent|discussed(?:\s+but\s+rejected)?)\b")
        .expect("leading status regex")
});
static REASONING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*reasoning\s*:").expect("reasoning regex"));

/// The domestic search for one policy.
pub fn gap_request(profile: &DomesticProfile, name: &str, category: &str) -> SearchRequest {
    let sites = profile
        .search_sites
        .iter()
        .map(|s| format!("site:{s}"))
        .collect::<Vec<_>>()
        .join(" OR ");
    let country = &profile.country;
    SearchRequest::new(format!(
        "Does {country} have a policy equivalent to \"{name}\" ({category})? Has anything \
         similar been implemented, proposed, or rejected? Search only: {sites}"
    ))
    .system_prompt(format!(
        "You are an {} policy analyst checking whether a foreign policy already exists in \
         {country}. Use only {} government and news sources. Answer with a first line \
         \"Classification: EXISTS\", \"Classification: DISCUSSED_BUT_REJECTED\", or \
         \"Classification: ABSENT\", then a line \"Reasoning: <one sentence>\".",
        profile.adjective, profile.adjective
    ))
}

/// Classify a gap-analysis answer. Returns the status and the notes.
pub fn classify(
    content: &str,
    citations: &[Citation],
    profile: &DomesticProfile,
) -> (DomesticStatus, String) {
    let reasoning = reasoning(content);
    let status = labelled_status(content).or_else(|| leading_status(content));

    if let Some(status) = status {
        let notes = reasoning.unwrap_or_else(|| default_notes(status, profile));
        return (status, notes);
    }

    let domestic = citations
        .iter()
        .filter(|c| profile.match_domain(&c.url).is_some())
        .count();
    let (status, fallback) = if domestic == 0 {
        (
            DomesticStatus::Absent,
            format!("No {} sources discuss an equivalent policy", profile.adjective),
        )
    } else {
        (
            DomesticStatus::DiscussedRejected,
            format!(
                "{domestic} {} source(s) discuss related measures; no explicit classification",
                profile.adjective
            ),
        )
    };
    (status, reasoning.unwrap_or(fallback))
}

fn labelled_status(content: &str) -> Option<DomesticStatus> {
    LABEL
        .captures_iter(content)
        .find_map(|caps| status_from_word(&caps[1]))
}

fn leading_status(content: &str) -> Option<DomesticStatus> {
    LEADING_WORD
        .captures(content)
        .and_then(|caps| status_from_word(&caps[1]))
}

fn status_from_word(raw: &str) -> Option<DomesticStatus> {
    let word = raw.trim().to_lowercase().replace(['_', '-'], " ");
    if word.contains("discussed") || word.contains("rejected") {
        Some(DomesticStatus::DiscussedRejected)
    } else if word.contains("exists") {
        Some(DomesticStatus::Exists)
    } else if word.contains("absent") {
        Some(DomesticStatus::Absent)
    } else {
        None
    }
}

/// Text after `Reasoning:`, or the next non-empty line when the label stands
/// alone. Capped at 300 characters.
fn reasoning(content: &str) -> Option<String> {
    let m = REASONING.find(content)?;
    let text = content[m.end()..]
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?;
    Some(text.chars().take(NOTES_MAX_CHARS).collect())
}

fn default_notes(status: DomesticStatus, profile: &DomesticProfile) -> String {
    let country = &profile.country;
    match status {
        DomesticStatus::Exists => format!("An equivalent policy already operates in {country}"),
        DomesticStatus::DiscussedRejected => {
            format!("Similar measures have been discussed in {country} but not adopted")
        }
        DomesticStatus::Absent => format!("No equivalent policy found in {country}"),
        DomesticStatus::Pending => ANALYSIS_FAILED_NOTE.to_string(),
    }
}

/// Evidence from the domestic answer: every citation, tagged with the
/// allow-listed domain it matched.
pub fn domestic_evidence(
    content: &str,
    citations: &[Citation],
    policy_name: &str,
    profile: &DomesticProfile,
) -> Vec<Evidence> {
    let claims = extract_citation_claims(content, policy_name);
    citations
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.url.trim().is_empty())
        .map(|(i, citation)| {
            let domain = profile.match_domain(&citation.url).map(str::to_string);
            let source_type = match &domain {
                Some(d) if profile.is_government_domain(d) => SourceType::GovDoc,
                _ => SourceType::News,
            };
            let mut e = Evidence::new(
                citation.url.clone(),
                EvidenceType::AdoptionRate,
                source_type,
                clamp_claim(claims.claim_for(i + 1)),
            );
            e.title = citation.title.clone();
            e.publisher = derive_publisher(&citation.url);
            e.excerpt = normalize_snippet(citation.snippet.as_deref());
            e.sentiment = Some(Sentiment::Neutral);
            e.confidence = Some(DOMESTIC_CONFIDENCE);
            e.is_domestic_source = domain.is_some();
            e.domestic_domain = domain;
            e
        })
        .collect()
}

/// Analyse every vetted policy. All policies are returned; the ones not
/// worth a report are recorded as `item_filtered`.
pub async fn analyze_gaps(ctx: PhaseContext<'_>, vetted: Vec<VettedPolicy>) -> Vec<AnalyzedPolicy> {
    let analyzed = in_batches(vetted, ctx.config.batch_size, ctx.batch_pause(), |policy| {
        analyze_one(ctx, policy)
    })
    .await;

    let country = &ctx.config.domestic.country;
    for policy in analyzed.iter().filter(|p| !p.is_reportable()) {
        let reason = match (policy.domestic_status, policy.opportunity_value()) {
            (DomesticStatus::Exists, _) => format!("Policy already exists in {country}"),
            (_, Some(OpportunityValue::Low)) => {
                "Low opportunity value based on evidence scores".to_string()
            }
            _ => ANALYSIS_FAILED_NOTE.to_string(),
        };
        ctx.emit(
            EventDraft::new(Phase::GapAnalysis, ActivityEventType::ItemFiltered)
                .item(policy.name.clone())
                .country(policy.source_country.clone())
                .reason(reason),
        );
    }

    let reportable = analyzed.iter().filter(|p| p.is_reportable()).count();
    info!(total = analyzed.len(), reportable, "gap analysis complete");
    analyzed
}

async fn analyze_one(ctx: PhaseContext<'_>, vetted: VettedPolicy) -> AnalyzedPolicy {
    let profile = &ctx.config.domestic;
    let request = gap_request(profile, &vetted.name, &vetted.category);
    let tags = QueryTags {
        country: Some(profile.country.as_str()),
        item: Some(vetted.name.as_str()),
    };

    let response = match ctx.tracked_search(Phase::GapAnalysis, request, tags).await {
        Ok(r) => r,
        Err(e) => {
            warn!(policy = %vetted.name, error = %e, "gap analysis failed");
            ctx.api_error(Phase::GapAnalysis, tags, &e);
            return AnalyzedPolicy::new(
                vetted,
                DomesticStatus::Pending,
                ANALYSIS_FAILED_NOTE,
                Vec::new(),
            );
        }
    };

    let (status, notes) = classify(&response.content, &response.citations, profile);
    let evidence = domestic_evidence(
        &response.content,
        &response.citations,
        &vetted.name,
        profile,
    );
    for e in &evidence {
        ctx.emit(
            EventDraft::new(Phase::GapAnalysis, ActivityEventType::EvidenceFound)
                .item(vetted.name.clone())
                .country(profile.country.clone())
                .source_type(e.source_type),
        );
    }

    let analyzed = AnalyzedPolicy::new(vetted, status, notes, evidence);
    debug!(
        policy = %analyzed.name,
        status = analyzed.domestic_status.as_str(),
        opportunity = ?analyzed.opportunity_value(),
        "policy analysed"
    );
    analyzed
}
