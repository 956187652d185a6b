//! Phase 2: adversarial evidence gathering.
//!
//! Every signal gets two searches, one for measurable success and one for
//! criticism. Each citation becomes an [`Evidence`] item and each side is
//! scored with [`evidence_score`]. Signals without any success score are
//! dropped.

use policyscout_core::{
    ActivityEventType, EventDraft, Evidence, EvidenceType, Phase, PolicySignal, Sentiment,
    SourceType, VettedPolicy, clamp_claim, derive_publisher, extract_citation_claims,
    normalize_snippet,
};
use policyscout_search::{SearchError, SearchRequest, SearchResponse};
use tracing::{debug, info, warn};

use crate::batch::in_batches;
use crate::context::{PhaseContext, QueryTags};

/// Evidence count at which the volume factor saturates.
const FULL_COUNT: f64 = 5.0;
/// High-quality source count at which the quality factor saturates.
const FULL_QUALITY: f64 = 3.0;
const DEFAULT_CONFIDENCE: f64 = 0.7;

const CLAIM_FORMAT: &str = "Format each finding as a bullet with the claim, an inline citation \
    marker like [1], and a rating on its own line as \"Strength: N/10\". Prefer OECD reports, \
    academic studies, and government evaluations.";

/// Score an evidence set in [0, 1]; zero exactly when it is empty.
///
/// `(count_ratio * 0.5 + quality_ratio * 0.5) * (0.3 + 0.7 * avg_confidence)`,
/// rounded to two decimals.
pub fn evidence_score(evidence: &[Evidence]) -> f64 {
    if evidence.is_empty() {
        return 0.0;
    }
    let n = evidence.len() as f64;
    let high_quality = evidence
        .iter()
        .filter(|e| e.source_type.is_high_quality())
        .count() as f64;
    let count_ratio = (n / FULL_COUNT).min(1.0);
    let quality_ratio = (high_quality / FULL_QUALITY).min(1.0);
    let avg_confidence = evidence
        .iter()
        .map(|e| e.confidence.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0))
        .sum::<f64>()
        / n;

    round2((count_ratio * 0.5 + quality_ratio * 0.5) * (0.3 + 0.7 * avg_confidence))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// One evidence item per citation with a usable URL.
pub fn evidence_from_response(
    response: &SearchResponse,
    policy_name: &str,
    evidence_type: EvidenceType,
    sentiment: Sentiment,
) -> Vec<Evidence> {
    let claims = extract_citation_claims(&response.content, policy_name);
    response
        .citations
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.url.trim().is_empty())
        .map(|(i, citation)| {
            let marker = i + 1;
            let mut e = Evidence::new(
                citation.url.clone(),
                evidence_type,
                SourceType::infer_from_url(&citation.url),
                clamp_claim(claims.claim_for(marker)),
            );
            e.title = citation.title.clone();
            e.publisher = derive_publisher(&citation.url);
            e.excerpt = normalize_snippet(citation.snippet.as_deref());
            e.sentiment = Some(sentiment);
            e.confidence = Some(claims.confidence_for(marker));
            e
        })
        .collect()
}

fn success_request(signal: &PolicySignal) -> SearchRequest {
    SearchRequest::new(format!(
        "What measurable outcomes has \"{}\" in {} achieved? Look for adoption figures, \
         economic impact, evaluations, and independent assessments.",
        signal.name, signal.source_country
    ))
    .system_prompt(format!(
        "You are an evidence analyst assessing whether a government policy succeeded. \
         Report only claims backed by sources. {CLAIM_FORMAT}"
    ))
}

fn criticism_request(signal: &PolicySignal) -> SearchRequest {
    SearchRequest::new(format!(
        "What criticisms, failures, or unintended consequences has \"{}\" in {} faced? \
         Look for audits, cost overruns, low uptake, and expert critiques.",
        signal.name, signal.source_country
    ))
    .system_prompt(format!(
        "You are a critical policy reviewer looking for weaknesses in a government policy. \
         Report only claims backed by sources. {CLAIM_FORMAT}"
    ))
}

/// Vet every signal, keeping those with a positive success score.
pub async fn vet_signals(ctx: PhaseContext<'_>, signals: Vec<PolicySignal>) -> Vec<VettedPolicy> {
    let total = signals.len();
    let vetted = in_batches(signals, ctx.config.batch_size, ctx.batch_pause(), |signal| {
        vet_one(ctx, signal)
    })
    .await;

    let mut kept = Vec::with_capacity(vetted.len());
    for policy in vetted {
        if policy.success_score > 0.0 {
            kept.push(policy);
            continue;
        }
        debug!(policy = %policy.name, "no success evidence, rejecting");
        ctx.emit(
            EventDraft::new(Phase::GlobalVetting, ActivityEventType::SignalRejected)
                .item(policy.name.clone())
                .country(policy.source_country.clone())
                .reason("No success evidence found"),
        );
    }

    info!(total, kept = kept.len(), "vetting complete");
    kept
}

async fn vet_one(ctx: PhaseContext<'_>, signal: PolicySignal) -> VettedPolicy {
    let tags = QueryTags {
        country: Some(signal.source_country.as_str()),
        item: Some(signal.name.as_str()),
    };
    let (success, criticism) = tokio::join!(
        ctx.tracked_search(Phase::GlobalVetting, success_request(&signal), tags),
        ctx.tracked_search(Phase::GlobalVetting, criticism_request(&signal), tags),
    );

    let (success, criticism) = match both(success, criticism) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(policy = %signal.name, error = %e, "vetting failed, scoring zero");
            ctx.api_error(Phase::GlobalVetting, tags, &e);
            return VettedPolicy::unscored(signal);
        }
    };

    let success_evidence = evidence_from_response(
        &success,
        &signal.name,
        EvidenceType::SuccessMetric,
        Sentiment::Positive,
    );
    let criticism_evidence = evidence_from_response(
        &criticism,
        &signal.name,
        EvidenceType::Criticism,
        Sentiment::Negative,
    );

    for e in success_evidence.iter().chain(&criticism_evidence) {
        ctx.emit(
            EventDraft::new(Phase::GlobalVetting, ActivityEventType::EvidenceFound)
                .item(signal.name.clone())
                .country(signal.source_country.clone())
                .source_type(e.source_type),
        );
    }

    let success_score = evidence_score(&success_evidence);
    let criticism_score = evidence_score(&criticism_evidence);
    info!(
        policy = %signal.name,
        success_score,
        criticism_score,
        "policy vetted"
    );

    VettedPolicy {
        signal,
        success_evidence,
        criticism_evidence,
        success_score,
        criticism_score,
    }
}

fn both(
    a: Result<SearchResponse, SearchError>,
    b: Result<SearchResponse, SearchError>,
) -> Result<(SearchResponse, SearchResponse), SearchError> {
    Ok((a?, b?))
}

#[cfg(test)]
mod tests {
    use policyscout_core::ActivityEventType as T;
    use proptest::prelude::*;

    use super::*;
    use crate::testing::{Harness, ScriptedBackend, evidence, signal};

    #[test]
    fn confidence_follows_strength() {
        let resp = SearchResponse::text(
            "Adoption rose 40% [1]. Strength: 7/10\n\n\
             Independent review confirmed savings [2]. Strength: 9/10",
        )
        .with_citations(["https://www.oecd.org/a", "https://stats.gov.ee/b"]);
        let ev = evidence_from_response(
            &resp,
            "R&D Tax Credit",
            EvidenceType::SuccessMetric,
            Sentiment::Positive,
        );
        assert_eq!(ev.len(), 2);
        assert_eq!(ev[0].claim, "Adoption rose 40%.");
        assert_eq!(ev[1].claim, "Independent review confirmed savings.");
        assert!((ev[0].confidence.unwrap() - 0.7).abs() < 1e-9);
        assert!((ev[1].confidence.unwrap() - 0.9).abs() < 1e-9);
        assert_eq!(ev[0].source_type, SourceType::OecdReport);
        assert_eq!(ev[1].publisher.as_deref(), Some("stats.gov.ee"));
        assert_eq!(ev[0].sentiment, Some(Sentiment::Positive));
    }

    #[test]
    fn blank_citation_urls_are_skipped() {
        let resp = SearchResponse::text("Claim [2].").with_citations(["", "https://x.edu/p"]);
        let ev = evidence_from_response(&resp, "X", EvidenceType::Criticism, Sentiment::Negative);
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].claim, "Claim.");
        assert_eq!(ev[0].source_type, SourceType::Academic);
    }

    #[test]
    fn score_examples() {
        assert_eq!(evidence_score(&[]), 0.0);
        // 2 items, 2 high quality, avg confidence 0.75:
        // (0.4 * 0.5 + 0.667 * 0.5) * (0.3 + 0.525) = 0.44
        let ev = vec![
            evidence("https://a.gov.ee/1", EvidenceType::SuccessMetric, 0.8),
            evidence("https://oecd.org/2", EvidenceType::SuccessMetric, 0.7),
        ];
        assert_eq!(evidence_score(&ev), 0.44);

        let full: Vec<_> = (0..6)
            .map(|i| evidence(&format!("https://oecd.org/{i}"), EvidenceType::SuccessMetric, 1.0))
            .collect();
        assert_eq!(evidence_score(&full), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn vetting_drops_policies_without_success() {
        let backend = ScriptedBackend::new()
            .on(
                "outcomes has \"Startup Visa\"",
                SearchResponse::text("Visas issued doubled [1]. Strength: 8/10")
                    .with_citations(["https://www.gov.ee/visa"]),
            )
            .on(
                "criticisms, failures, or unintended consequences has \"Startup Visa\"",
                SearchResponse::text("Uptake was slow in year one [1].")
                    .with_citations(["https://news.example.com/visa"]),
            )
            .fail_on("Broken Grant", 403);
        let h = Harness::new(backend);
        let signals = vec![
            signal("Startup Visa", "Estonia"),
            signal("Empty Fund", "Estonia"),
            signal("Broken Grant", "Estonia"),
        ];

        let vetted = vet_signals(h.ctx(), signals).await;

        assert_eq!(vetted.len(), 1);
        let visa = &vetted[0];
        assert_eq!(visa.name, "Startup Visa");
        assert_eq!(visa.success_evidence.len(), 1);
        assert_eq!(visa.criticism_evidence.len(), 1);
        assert!(visa.success_score > 0.0);
        assert!(visa.criticism_score > 0.0);

        assert_eq!(h.count(T::SignalRejected), 2);
        assert_eq!(h.count(T::EvidenceFound), 2);
        assert_eq!(h.count(T::ApiError), 1);
        // Two searches per signal, whether or not they fail.
        assert_eq!(h.count(T::QuerySent), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn evidence_events_carry_source_type() {
        let backend = ScriptedBackend::new().on(
            "outcomes has",
            SearchResponse::text("Output grew [1]. Cited [2].")
                .with_citations(["https://oecd.org/r", "https://uni.edu/p"]),
        );
        let h = Harness::new(backend);
        vet_signals(h.ctx(), vec![signal("Growth Fund", "Finland")]).await;

        let types: Vec<_> = h
            .activity
            .events()
            .iter()
            .filter(|e| e.event_type == T::EvidenceFound)
            .map(|e| (e.source_type(), e.target_country.clone()))
            .collect();
        assert_eq!(
            types,
            vec![
                (Some(SourceType::OecdReport), Some("Finland".to_string())),
                (Some(SourceType::Academic), Some("Finland".to_string())),
            ]
        );
    }

    proptest! {
        #[test]
        fn score_is_bounded(
            items in proptest::collection::vec((0usize..3, proptest::option::of(0.0f64..=1.0)), 0..12)
        ) {
            let urls = ["https://oecd.org/x", "https://news.example/x", "https://gov.ee/x"];
            let ev: Vec<Evidence> = items
                .iter()
                .map(|(u, c)| {
                    let mut e = evidence(urls[*u], EvidenceType::SuccessMetric, 0.5);
                    e.confidence = *c;
                    e
                })
                .collect();
            let score = evidence_score(&ev);
            prop_assert!((0.0..=1.0).contains(&score));
            prop_assert_eq!(score == 0.0, ev.is_empty());
        }
    }
}
