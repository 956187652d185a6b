#[macro_use]
mod enums;

pub mod activity;
pub mod config;
pub mod countries;
pub mod evidence;
pub mod extract;
pub mod policy;
pub mod run;
pub mod slug;

pub use activity::{
    ActivityEvent, ActivityEventType, ActivityOutcome, ActivitySummary, ApiMetrics, EventDraft,
    FunnelMetrics, PhaseTiming, RejectionMetrics, SourceMetrics, TimingSummary,
};
pub use config::{DomesticProfile, PipelineConfig};
pub use countries::{
    CountryContext, PEER_COUNTRIES, canonical_peer, country_context, is_peer_country,
};
pub use enums::UnknownVariant;
pub use evidence::{Evidence, EvidenceType, MAX_CLAIM_CHARS, Sentiment, SourceType, clamp_claim};
pub use extract::{CitationClaims, derive_publisher, extract_citation_claims, normalize_snippet};
pub use policy::{
    AnalyzedPolicy, ClaimType, DomesticStatus, Level, Mitigation, NewPolicy, NewPolicyClaim,
    OpportunityValue, Policy, PolicyClaim, PolicySignal, PolicyStatus, Risk, RiskAssessment,
    VettedPolicy, VettingStatus, opportunity_value,
};
pub use run::{NewRun, Phase, PolicyInterpretation, PolicyLevers, Run, RunStatus, RunType, SearchMode};
pub use slug::{slugify, unique_slug};
