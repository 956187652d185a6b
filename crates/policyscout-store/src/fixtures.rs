//! Sample records shared by the store tests.

use policyscout_core::{
    ClaimType, DomesticStatus, Evidence, EvidenceType, Level, NewPolicy, NewPolicyClaim, NewRun,
    OpportunityValue, PolicyStatus, RiskAssessment, RunType, SearchMode, SourceType,
    VettingStatus,
};

pub fn new_run() -> NewRun {
    NewRun {
        run_type: RunType::Manual,
        countries: vec!["Estonia".into(), "Finland".into()],
        search_mode: Some(SearchMode::Topic),
        search_query: Some("startup visa".into()),
        interpretation: None,
    }
}

pub fn new_policy(name: &str) -> NewPolicy {
    let mut risks = RiskAssessment::default();
    risks.push(
        "Budget constraints",
        Level::High,
        Level::High,
        "Explore EU funding mechanisms",
    );
    NewPolicy {
        run_id: None,
        name: name.into(),
        category: "Talent Visa".into(),
        source_country: "Estonia".into(),
        original_source_url: "https://www.startupestonia.ee/visa".into(),
        original_source_title: Some("Startup Visa".into()),
        discovery_context: Some("Residence route for non-EU founders.".into()),
        vetting_status: VettingStatus::Vetted,
        success_score: Some(0.72),
        criticism_score: Some(0.2),
        domestic_status: DomesticStatus::Absent,
        domestic_notes: Some("No mentions found.".into()),
        opportunity_value: Some(OpportunityValue::High),
        concept_hook: Some("Founders in, jobs out.".into()),
        case_study_summary: Some("Over 5,000 founders admitted.".into()),
        gap_statement: Some("Ireland has no equivalent.".into()),
        pilot_proposal: Some("Pilot with Enterprise Ireland.".into()),
        risk_assessment: Some(risks),
        status: PolicyStatus::Active,
    }
}

pub fn evidence(url: &str) -> Evidence {
    let mut e = Evidence::new(
        url,
        EvidenceType::SuccessMetric,
        SourceType::infer_from_url(url),
        "Adoption rose 40%.",
    );
    e.confidence = Some(0.7);
    e
}

pub fn claims() -> Vec<NewPolicyClaim> {
    vec![
        NewPolicyClaim {
            claim_type: ClaimType::CaseStudySummary,
            claim_text: "Over 5,000 founders admitted.".into(),
            evidence_indexes: vec![0, 1],
        },
        NewPolicyClaim {
            claim_type: ClaimType::GapStatement,
            claim_text: "Ireland has no equivalent.".into(),
            evidence_indexes: vec![1],
        },
    ]
}
