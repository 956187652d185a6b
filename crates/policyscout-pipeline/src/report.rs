//! Phase 4: write up and persist each reportable policy.
//!
//! Three generated sections per policy (hook, case study, pilot proposal)
//! run concurrently and each falls back to fixed text on failure. The gap
//! statement and risk assessment are built locally. The policy, all of its
//! evidence and its claims are saved in one atomic create.

use policyscout_core::{
    ActivityEventType, AnalyzedPolicy, ClaimType, DomesticProfile, DomesticStatus, EventDraft,
    Level, NewPolicy, NewPolicyClaim, OpportunityValue, Phase, Policy, PolicyStatus,
    RiskAssessment, VettingStatus,
};
use policyscout_search::SearchRequest;
use policyscout_store::{RecordStore, StoreError};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::PhaseContext;

const HOOK_MAX_WORDS: usize = 25;
const CASE_STUDY_CLAIMS: usize = 3;

// ── Generated sections ──

fn hook_request(policy: &AnalyzedPolicy, profile: &DomesticProfile) -> SearchRequest {
    SearchRequest::new(format!(
        "Create a compelling one-sentence hook (max 25 words) for \"{}\" from {} that would \
         grab an {} policymaker's attention. Focus on the key benefit or innovation.",
        policy.name, policy.source_country, profile.adjective
    ))
    .system_prompt(
        "Return ONLY the hook sentence. No quotes, no explanation. Make it punchy and memorable.",
    )
    .temperature(0.3)
    .max_tokens(100)
}

fn case_study_request(policy: &AnalyzedPolicy) -> SearchRequest {
    let context = policy
        .success_evidence
        .iter()
        .take(CASE_STUDY_CLAIMS)
        .map(|e| e.claim.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    SearchRequest::new(format!(
        "Summarize the success of \"{}\" in {} in 2-3 sentences. Include specific metrics if \
         available. Context: {context}",
        policy.name, policy.source_country
    ))
    .system_prompt("Be concise and data-driven. Include specific numbers where possible. No fluff.")
    .temperature(0.2)
    .max_tokens(200)
}

fn pilot_request(policy: &AnalyzedPolicy, profile: &DomesticProfile) -> SearchRequest {
    SearchRequest::new(format!(
        "Propose a realistic pilot program to test the \"{}\" concept in {}. Consider: {} \
         institutions ({}, etc.), existing frameworks, realistic scope. 3-4 sentences max.",
        policy.name,
        profile.country,
        profile.adjective,
        profile.institutions.join(", ")
    ))
    .system_prompt(format!(
        "Be specific and actionable. Reference real {} institutions. Focus on low-risk, \
         achievable first steps.",
        profile.adjective
    ))
    .temperature(0.3)
    .max_tokens(250)
}

fn hook_fallback(policy: &AnalyzedPolicy) -> String {
    format!(
        "{}: A proven {} mechanism from {}.",
        policy.name,
        policy.category.to_lowercase(),
        policy.source_country
    )
}

fn case_study_fallback(policy: &AnalyzedPolicy) -> String {
    format!(
        "{} has shown positive results in {}. Further research recommended for specific metrics.",
        policy.name, policy.source_country
    )
}

fn pilot_fallback(profile: &DomesticProfile) -> String {
    format!(
        "A pilot could be launched in partnership with {}, targeting a specific sector for \
         12-18 months to evaluate effectiveness.",
        profile.lead_institution()
    )
}

/// Trim, drop one pair of surrounding quotes, and cap at 25 words.
pub fn clean_hook(raw: &str) -> String {
    const QUOTES: &[char] = &['"', '\'', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}'];
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(QUOTES).unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(QUOTES).unwrap_or(trimmed).trim();
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() > HOOK_MAX_WORDS {
        words[..HOOK_MAX_WORDS].join(" ")
    } else {
        trimmed.to_string()
    }
}

async fn generate(ctx: PhaseContext<'_>, request: SearchRequest, section: &str) -> Option<String> {
    match ctx.search.search(request).await {
        Ok(r) if !r.content.trim().is_empty() => Some(r.content.trim().to_string()),
        Ok(_) => {
            warn!(section, "empty generation, using fallback");
            None
        }
        Err(e) => {
            warn!(section, error = %e, "generation failed, using fallback");
            None
        }
    }
}

// ── Local sections ──

/// Template keyed on domestic status.
pub fn gap_statement(policy: &AnalyzedPolicy, profile: &DomesticProfile) -> String {
    let country = &profile.country;
    match policy.domestic_status {
        DomesticStatus::Absent => format!(
            "{country} currently has no equivalent to {}. This represents an untapped \
             opportunity for {} policy innovation that peer economies have successfully \
             implemented.",
            policy.name,
            policy.category.to_lowercase()
        ),
        DomesticStatus::DiscussedRejected => {
            let notes = if policy.domestic_notes.trim().is_empty() {
                format!(
                    "The evidence from {} suggests revisiting this policy.",
                    policy.source_country
                )
            } else {
                policy.domestic_notes.clone()
            };
            format!(
                "While {} or similar concepts have been discussed in {country}, no equivalent \
                 has been adopted. {notes}",
                policy.name
            )
        }
        DomesticStatus::Exists => format!(
            "{country} has existing mechanisms in this space. However, the {} model may offer \
             improvements or extensions worth considering.",
            policy.source_country
        ),
        DomesticStatus::Pending => format!(
            "Analysis of {} policy landscape pending. Initial research suggests this may be an \
             opportunity.",
            profile.adjective
        ),
    }
}

/// Fixed implementation and budget risks, political risk scaled by the
/// criticism score, and known issues when criticism is substantial.
pub fn assess_risks(policy: &AnalyzedPolicy) -> RiskAssessment {
    let criticism = policy.criticism_score;
    let mut ra = RiskAssessment::default();

    ra.push(
        "Implementation complexity",
        Level::Medium,
        Level::Medium,
        "Start with limited pilot scope, leverage existing agency infrastructure",
    );

    let political = if criticism > 0.5 {
        Level::High
    } else if criticism > 0.3 {
        Level::Medium
    } else {
        Level::Low
    };
    ra.push(
        "Political resistance",
        political,
        Level::Medium,
        "Build cross-party support, emphasize evidence base from peer economies",
    );

    ra.push(
        "Budget constraints",
        Level::High,
        Level::High,
        "Explore EU funding mechanisms, consider revenue-neutral design",
    );

    if criticism > 0.4 && !policy.criticism_evidence.is_empty() {
        ra.push(
            "Known issues from source country",
            Level::Medium,
            Level::Medium,
            format!(
                "Learn from {}'s experience and design to avoid identified pitfalls",
                policy.source_country
            ),
        );
    }
    ra
}

/// Claims citing evidence by position in the flattened
/// success, criticism, domestic list. The gap statement cites domestic
/// evidence, or the success evidence when there is none. Claims with no text
/// or no evidence are dropped.
pub fn build_claims(
    policy: &AnalyzedPolicy,
    case_study: &str,
    gap_statement: &str,
) -> Vec<NewPolicyClaim> {
    let success: Vec<usize> = (0..policy.success_evidence.len()).collect();
    let domestic_offset = policy.success_evidence.len() + policy.criticism_evidence.len();
    let domestic: Vec<usize> =
        (domestic_offset..domestic_offset + policy.domestic_evidence.len()).collect();
    let gap_indexes = if domestic.is_empty() {
        success.clone()
    } else {
        domestic
    };

    [
        (ClaimType::CaseStudySummary, case_study, success),
        (ClaimType::GapStatement, gap_statement, gap_indexes),
    ]
    .into_iter()
    .filter(|(_, text, indexes)| !text.trim().is_empty() && !indexes.is_empty())
    .map(|(claim_type, text, evidence_indexes)| NewPolicyClaim {
        claim_type,
        claim_text: text.to_string(),
        evidence_indexes,
    })
    .collect()
}

// ── Phase ──

/// Generate and persist a report for each policy, in order. A policy whose
/// save fails is recorded as an `api_error` and skipped.
pub async fn generate_reports(
    ctx: PhaseContext<'_>,
    store: &dyn RecordStore,
    run_id: Option<Uuid>,
    policies: Vec<AnalyzedPolicy>,
) -> Vec<Policy> {
    info!(count = policies.len(), "generating reports");
    let mut saved = Vec::with_capacity(policies.len());

    for policy in policies {
        let name = policy.name.clone();
        match report_one(ctx, store, run_id, policy).await {
            Ok(p) => {
                info!(policy = %p.name, slug = %p.slug, "report saved");
                saved.push(p);
            }
            Err(e) => {
                warn!(policy = %name, error = %e, "report failed, skipping");
                ctx.emit(
                    EventDraft::new(Phase::ReportGeneration, ActivityEventType::ApiError)
                        .item(name)
                        .error(e.to_string()),
                );
            }
        }
    }

    info!(count = saved.len(), "report generation complete");
    saved
}

async fn report_one(
    ctx: PhaseContext<'_>,
    store: &dyn RecordStore,
    run_id: Option<Uuid>,
    policy: AnalyzedPolicy,
) -> Result<Policy, StoreError> {
    let profile = &ctx.config.domestic;
    for kind in ["concept_hook", "case_study", "pilot_proposal"] {
        ctx.emit(
            EventDraft::new(Phase::ReportGeneration, ActivityEventType::QuerySent)
                .item(policy.name.clone())
                .meta("query_type", kind),
        );
    }

    let started = Instant::now();
    let (hook, case_study, pilot) = tokio::join!(
        generate(ctx, hook_request(&policy, profile), "concept_hook"),
        generate(ctx, case_study_request(&policy), "case_study"),
        generate(ctx, pilot_request(&policy, profile), "pilot_proposal"),
    );
    ctx.emit(
        EventDraft::new(Phase::ReportGeneration, ActivityEventType::CacheMiss)
            .item(policy.name.clone())
            .duration_ms(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
    );

    let hook = hook.map(|h| clean_hook(&h)).unwrap_or_else(|| hook_fallback(&policy));
    let case_study = case_study.unwrap_or_else(|| case_study_fallback(&policy));
    let pilot = pilot.unwrap_or_else(|| pilot_fallback(profile));
    let gap = gap_statement(&policy, profile);
    let claims = build_claims(&policy, &case_study, &gap);
    let opportunity = policy.opportunity_value();

    let new = NewPolicy {
        run_id,
        name: policy.name.clone(),
        category: policy.category.clone(),
        source_country: policy.source_country.clone(),
        original_source_url: policy.source_url.clone(),
        original_source_title: policy.source_title.clone(),
        discovery_context: Some(policy.description.clone()).filter(|d| !d.trim().is_empty()),
        vetting_status: VettingStatus::Vetted,
        success_score: Some(policy.success_score),
        criticism_score: Some(policy.criticism_score),
        domestic_status: policy.domestic_status,
        domestic_notes: Some(policy.domestic_notes.clone()).filter(|n| !n.is_empty()),
        opportunity_value: opportunity,
        concept_hook: Some(hook),
        case_study_summary: Some(case_study),
        gap_statement: Some(gap),
        pilot_proposal: Some(pilot),
        risk_assessment: Some(assess_risks(&policy)),
        status: if opportunity == Some(OpportunityValue::High) {
            PolicyStatus::Active
        } else {
            PolicyStatus::Draft
        },
    };

    let AnalyzedPolicy { vetted, domestic_evidence, .. } = policy;
    let country = vetted.source_country.clone();
    let evidence: Vec<_> = vetted
        .success_evidence
        .into_iter()
        .chain(vetted.criticism_evidence)
        .chain(domestic_evidence)
        .collect();
    let evidence_count = evidence.len();

    let saved = store.create_policy_with_evidence(new, evidence, claims).await?;
    ctx.emit(
        EventDraft::new(Phase::ReportGeneration, ActivityEventType::SignalFound)
            .item(saved.name.clone())
            .country(country)
            .meta("slug", saved.slug.clone())
            .meta(
                "opportunity_value",
                saved.opportunity_value.map(|v| v.as_str()).unwrap_or_default(),
            )
            .meta("evidence_count", evidence_count),
    );
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use policyscout_core::{ActivityEventType as T, EvidenceType};
    use policyscout_search::SearchResponse;
    use policyscout_store::MemoryStore;

    use super::*;
    use crate::testing::{Harness, ScriptedBackend, evidence, vetted};

    fn analyzed(name: &str, success: f64, criticism: f64) -> AnalyzedPolicy {
        AnalyzedPolicy::new(
            vetted(name, success, criticism),
            DomesticStatus::Absent,
            "No mentions found.",
            Vec::new(),
        )
    }

    #[test]
    fn high_value_without_criticism_has_three_risks() {
        let p = analyzed("Startup Visa", 0.8, 0.0);
        assert_eq!(p.opportunity_value(), Some(OpportunityValue::High));
        let ra = assess_risks(&p);
        assert_eq!(ra.risks.len(), 3);
        assert_eq!(ra.mitigations.len(), 3);
        assert_eq!(ra.risks[1].severity, Level::Low);
        assert!(ra.risks.iter().all(|r| r.risk != "Known issues from source country"));
    }

    #[test]
    fn criticism_adds_known_issues() {
        let mut v = vetted("Growth Fund", 0.8, 0.45);
        v.criticism_evidence = vec![evidence("https://news.example/c", EvidenceType::Criticism, 0.6)];
        let p = AnalyzedPolicy::new(v, DomesticStatus::Absent, "", Vec::new());
        let ra = assess_risks(&p);
        assert_eq!(ra.risks.len(), 4);
        assert_eq!(ra.risks[1].severity, Level::Medium);
        assert_eq!(ra.risks[3].risk, "Known issues from source country");
        assert!(ra.mitigations[3].mitigation.starts_with("Learn from Estonia's"));

        // High score alone is not enough.
        let bare = analyzed("Bare", 0.8, 0.9);
        assert_eq!(assess_risks(&bare).risks.len(), 3);
        assert_eq!(assess_risks(&bare).risks[1].severity, Level::High);
    }

    #[test]
    fn hook_cleanup() {
        assert_eq!(clean_hook("  \"Cut red tape.\" "), "Cut red tape.");
        assert_eq!(clean_hook("'Quoted'"), "Quoted");
        let long = (0..40).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(clean_hook(&long).split_whitespace().count(), HOOK_MAX_WORDS);
    }

    #[test]
    fn gap_statement_by_status() {
        let profile = DomesticProfile::default();
        let absent = analyzed("Startup Visa", 0.8, 0.0);
        assert!(gap_statement(&absent, &profile).starts_with("Ireland currently has no equivalent to Startup Visa."));

        let discussed = AnalyzedPolicy::new(
            vetted("Startup Visa", 0.8, 0.0),
            DomesticStatus::DiscussedRejected,
            "",
            Vec::new(),
        );
        assert!(
            gap_statement(&discussed, &profile)
                .ends_with("The evidence from Estonia suggests revisiting this policy.")
        );
    }

    #[test]
    fn claims_index_flattened_evidence() {
        let mut v = vetted("Startup Visa", 0.8, 0.0);
        v.criticism_evidence = vec![evidence("https://news.example/c", EvidenceType::Criticism, 0.6)];
        let domestic = vec![evidence("https://www.gov.ie/x", EvidenceType::AdoptionRate, 0.7)];
        let p = AnalyzedPolicy::new(v, DomesticStatus::Absent, "", domestic);

        let claims = build_claims(&p, "Case study.", "Gap.");
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].evidence_indexes, vec![0, 1]);
        assert_eq!(claims[1].evidence_indexes, vec![3]);

        let no_domestic = analyzed("Startup Visa", 0.8, 0.0);
        let claims = build_claims(&no_domestic, "", "Gap.");
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].claim_type, ClaimType::GapStatement);
        assert_eq!(claims[0].evidence_indexes, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_are_saved_with_fallbacks() {
        let backend = ScriptedBackend::new()
            .on("one-sentence hook", SearchResponse::text("\"Visas in a week.\""))
            .fail_on("Summarize the success", 500);
        let h = Harness::new(backend);
        let store = MemoryStore::new();
        let run_id = Uuid::new_v4();
        let mut medium = analyzed("Seed Grant", 0.35, 0.0);
        medium.domestic_notes.clear();

        let saved = generate_reports(
            h.ctx(),
            &store,
            Some(run_id),
            vec![analyzed("Startup Visa", 0.8, 0.0), medium],
        )
        .await;

        assert_eq!(saved.len(), 2);
        let visa = &saved[0];
        assert_eq!(visa.slug, "startup-visa");
        assert_eq!(visa.status, PolicyStatus::Active);
        assert_eq!(visa.concept_hook.as_deref(), Some("Visas in a week."));
        assert_eq!(
            visa.case_study_summary.as_deref(),
            Some("Startup Visa has shown positive results in Estonia. Further research recommended for specific metrics.")
        );
        // Empty answer falls back too.
        assert!(visa.pilot_proposal.as_deref().unwrap().contains("Enterprise Ireland"));
        assert_eq!(visa.run_id, Some(run_id));
        assert_eq!(saved[1].status, PolicyStatus::Draft);
        assert_eq!(saved[1].domestic_notes, None);

        assert_eq!(store.evidence_for_policy(visa.id).await.unwrap().len(), 2);
        assert_eq!(store.claims_for_policy(visa.id).await.unwrap().len(), 2);
        assert_eq!(h.count(T::QuerySent), 6);
        assert_eq!(h.count(T::CacheMiss), 2);
        assert_eq!(h.count(T::SignalFound), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_skipped() {
        let h = Harness::new(ScriptedBackend::new());
        let store = MemoryStore::new();
        let mut bad = vetted("Bad Evidence", 0.8, 0.0);
        bad.success_evidence[0].url = String::new();
        let bad = AnalyzedPolicy::new(bad, DomesticStatus::Absent, "", Vec::new());

        let saved = generate_reports(
            h.ctx(),
            &store,
            None,
            vec![bad, analyzed("Good One", 0.8, 0.0)],
        )
        .await;

        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "Good One");
        assert_eq!(store.policy_count(), 1);
        assert_eq!(h.count(T::ApiError), 1);
        assert_eq!(h.count(T::SignalFound), 1);
    }
}
