//! Policy records at each pipeline stage, from raw signal to persisted report.
//!
//! The in-memory stages compose rather than copy: an [`AnalyzedPolicy`] wraps
//! a [`VettedPolicy`], which wraps a [`PolicySignal`]. `Deref` exposes the
//! inner fields so callers can write `analyzed.name` directly.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::evidence::Evidence;

str_enum! {
    pub enum VettingStatus {
        Pending => "pending",
        Vetted => "vetted",
        Rejected => "rejected",
    }
}

str_enum! {
    /// Whether an equivalent policy exists in the domestic country.
    pub enum DomesticStatus {
        Pending => "pending",
        Exists => "exists",
        DiscussedRejected => "discussed_rejected",
        Absent => "absent",
    }
}

str_enum! {
    pub enum OpportunityValue {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

str_enum! {
    pub enum PolicyStatus {
        Draft => "draft",
        Active => "active",
        Archived => "archived",
    }
}

str_enum! {
    /// Severity or likelihood of a risk.
    pub enum Level {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

str_enum! {
    /// Which narrative field a policy claim backs.
    pub enum ClaimType {
        CaseStudySummary => "case_study_summary",
        GapStatement => "gap_statement",
    }
}

/// Derive the opportunity tier from domestic status and vetting scores.
///
/// `Pending` (analysis failed) has no tier. For `Absent`, a strong success
/// record with contained criticism is `High`; a moderate one is `Medium`.
pub fn opportunity_value(
    status: DomesticStatus,
    success_score: f64,
    criticism_score: f64,
) -> Option<OpportunityValue> {
    match status {
        DomesticStatus::Pending => None,
        DomesticStatus::Exists => Some(OpportunityValue::Low),
        DomesticStatus::DiscussedRejected => Some(OpportunityValue::Medium),
        DomesticStatus::Absent => {
            if success_score >= 0.5 && criticism_score < 0.5 {
                Some(OpportunityValue::High)
            } else if success_score >= 0.3 {
                Some(OpportunityValue::Medium)
            } else {
                Some(OpportunityValue::Low)
            }
        }
    }
}

// ── Pipeline stages ──

/// A candidate named policy discovered in one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySignal {
    pub name: String,
    pub category: String,
    pub source_country: String,
    pub source_url: String,
    pub source_title: Option<String>,
    pub description: String,
}

impl PolicySignal {
    /// Deduplication key: lowercased name plus source country.
    pub fn dedup_key(&self) -> (String, String) {
        (self.name.to_lowercase(), self.source_country.clone())
    }
}

/// A signal with success and criticism evidence attached and scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VettedPolicy {
    #[serde(flatten)]
    pub signal: PolicySignal,
    pub success_evidence: Vec<Evidence>,
    pub criticism_evidence: Vec<Evidence>,
    pub success_score: f64,
    pub criticism_score: f64,
}

impl VettedPolicy {
    /// A signal whose vetting failed: no evidence, zero scores.
    pub fn unscored(signal: PolicySignal) -> Self {
        Self {
            signal,
            success_evidence: Vec::new(),
            criticism_evidence: Vec::new(),
            success_score: 0.0,
            criticism_score: 0.0,
        }
    }
}

impl Deref for VettedPolicy {
    type Target = PolicySignal;

    fn deref(&self) -> &PolicySignal {
        &self.signal
    }
}

/// A vetted policy with its domestic gap analysis.
///
/// The opportunity value is derived from the status and scores on every
/// read and is never stored; serialization includes it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedPolicy {
    pub vetted: VettedPolicy,
    pub domestic_status: DomesticStatus,
    pub domestic_notes: String,
    pub domestic_evidence: Vec<Evidence>,
}

impl AnalyzedPolicy {
    pub fn new(
        vetted: VettedPolicy,
        domestic_status: DomesticStatus,
        domestic_notes: impl Into<String>,
        domestic_evidence: Vec<Evidence>,
    ) -> Self {
        Self {
            vetted,
            domestic_status,
            domestic_notes: domestic_notes.into(),
            domestic_evidence,
        }
    }

    pub fn opportunity_value(&self) -> Option<OpportunityValue> {
        opportunity_value(
            self.domestic_status,
            self.vetted.success_score,
            self.vetted.criticism_score,
        )
    }

    /// High or medium opportunities are worth a report.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self.opportunity_value(),
            Some(OpportunityValue::High | OpportunityValue::Medium)
        )
    }
}

impl Serialize for AnalyzedPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(flatten)]
            vetted: &'a VettedPolicy,
            domestic_status: DomesticStatus,
            domestic_notes: &'a str,
            domestic_evidence: &'a [Evidence],
            opportunity_value: Option<OpportunityValue>,
        }

        Wire {
            vetted: &self.vetted,
            domestic_status: self.domestic_status,
            domestic_notes: &self.domestic_notes,
            domestic_evidence: &self.domestic_evidence,
            opportunity_value: self.opportunity_value(),
        }
        .serialize(serializer)
    }
}

impl Deref for AnalyzedPolicy {
    type Target = VettedPolicy;

    fn deref(&self) -> &VettedPolicy {
        &self.vetted
    }
}

// ── Persisted records ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub risk: String,
    pub severity: Level,
    pub likelihood: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mitigation {
    pub risk: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risks: Vec<Risk>,
    pub mitigations: Vec<Mitigation>,
}

impl RiskAssessment {
    /// Add a risk together with its mitigation.
    pub fn push(
        &mut self,
        risk: &str,
        severity: Level,
        likelihood: Level,
        mitigation: impl Into<String>,
    ) {
        self.risks.push(Risk {
            risk: risk.to_string(),
            severity,
            likelihood,
        });
        self.mitigations.push(Mitigation {
            risk: risk.to_string(),
            mitigation: mitigation.into(),
        });
    }
}

/// The report-grade policy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub run_id: Option<Uuid>,
    pub name: String,
    /// URL-safe identifier derived from the name at creation; never changes.
    pub slug: String,
    pub category: String,
    pub source_country: String,
    pub original_source_url: String,
    pub original_source_title: Option<String>,
    pub discovery_context: Option<String>,
    pub vetting_status: VettingStatus,
    pub success_score: Option<f64>,
    pub criticism_score: Option<f64>,
    pub domestic_status: DomesticStatus,
    pub domestic_notes: Option<String>,
    pub opportunity_value: Option<OpportunityValue>,
    pub concept_hook: Option<String>,
    pub case_study_summary: Option<String>,
    pub gap_statement: Option<String>,
    pub pilot_proposal: Option<String>,
    pub risk_assessment: Option<RiskAssessment>,
    pub status: PolicyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Materialise a new record; the store supplies the unique slug.
    pub fn from_new(new: NewPolicy, slug: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: new.run_id,
            name: new.name,
            slug,
            category: new.category,
            source_country: new.source_country,
            original_source_url: new.original_source_url,
            original_source_title: new.original_source_title,
            discovery_context: new.discovery_context,
            vetting_status: new.vetting_status,
            success_score: new.success_score,
            criticism_score: new.criticism_score,
            domestic_status: new.domestic_status,
            domestic_notes: new.domestic_notes,
            opportunity_value: new.opportunity_value,
            concept_hook: new.concept_hook,
            case_study_summary: new.case_study_summary,
            gap_statement: new.gap_statement,
            pilot_proposal: new.pilot_proposal,
            risk_assessment: new.risk_assessment,
            status: new.status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields supplied when creating a policy record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPolicy {
    pub run_id: Option<Uuid>,
    pub name: String,
    pub category: String,
    pub source_country: String,
    pub original_source_url: String,
    pub original_source_title: Option<String>,
    pub discovery_context: Option<String>,
    pub vetting_status: VettingStatus,
    pub success_score: Option<f64>,
    pub criticism_score: Option<f64>,
    pub domestic_status: DomesticStatus,
    pub domestic_notes: Option<String>,
    pub opportunity_value: Option<OpportunityValue>,
    pub concept_hook: Option<String>,
    pub case_study_summary: Option<String>,
    pub gap_statement: Option<String>,
    pub pilot_proposal: Option<String>,
    pub risk_assessment: Option<RiskAssessment>,
    pub status: PolicyStatus,
}

/// A narrative claim that cites evidence rows of the same policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyClaim {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub claim_type: ClaimType,
    pub claim_text: String,
    pub evidence_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A claim to create, citing evidence by its position in the batch being
/// inserted alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPolicyClaim {
    pub claim_type: ClaimType,
    pub claim_text: String,
    pub evidence_indexes: Vec<usize>,
}
