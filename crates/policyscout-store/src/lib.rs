//! Storage layer: the [`RecordStore`] repository interface with an in-memory
//! implementation and a DuckDB one behind the `duckdb` feature.

use async_trait::async_trait;
use policyscout_core::{
    ActivityEvent, ActivitySummary, DomesticStatus, Evidence, NewPolicy, NewPolicyClaim, NewRun,
    OpportunityValue, Phase, Policy, PolicyClaim, PolicyStatus, Run, RunStatus,
};
use uuid::Uuid;

mod error;
pub use error::StoreError;

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;

#[cfg(test)]
mod fixtures;

/// Filters for [`RecordStore::list_policies`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyFilter {
    pub status: Option<PolicyStatus>,
    pub domestic_status: Option<DomesticStatus>,
    pub opportunity_value: Option<OpportunityValue>,
    pub source_country: Option<String>,
    pub limit: Option<usize>,
}

impl PolicyFilter {
    pub fn matches(&self, p: &Policy) -> bool {
        self.status.is_none_or(|s| p.status == s)
            && self.domestic_status.is_none_or(|s| p.domestic_status == s)
            && self
                .opportunity_value
                .is_none_or(|v| p.opportunity_value == Some(v))
            && self
                .source_country
                .as_deref()
                .is_none_or(|c| p.source_country == c)
    }
}

/// Repository interface for everything the pipeline persists.
///
/// `create_policy_with_evidence` is the only multi-record write and must be
/// atomic: the policy, its evidence, and its claims are stored together or
/// not at all.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Runs ──

    /// Insert a run with status `running` and `started_at` set.
    async fn create_run(&self, new: NewRun) -> Result<Run, StoreError>;

    async fn update_run_phase(&self, id: Uuid, phase: Phase) -> Result<(), StoreError>;

    /// Set the run status. Terminal statuses also set `completed_at`; a run
    /// that is already terminal cannot change again.
    async fn set_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn update_run_counts(
        &self,
        id: Uuid,
        policies_found: u32,
        high_value_count: u32,
    ) -> Result<(), StoreError>;

    async fn update_run_summary(
        &self,
        id: Uuid,
        summary: &ActivitySummary,
    ) -> Result<(), StoreError>;

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>, StoreError>;

    /// Newest first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<Run>, StoreError>;

    /// The most recently created run still `running`, if any.
    async fn active_run(&self) -> Result<Option<Run>, StoreError>;

    // ── Policies ──

    /// Atomically create a policy with its evidence and claims.
    ///
    /// The slug is derived from the name and suffixed `-2`, `-3`, ... when
    /// taken. Claims cite evidence by index into `evidence`; indexes are
    /// resolved to the stored evidence ids.
    async fn create_policy_with_evidence(
        &self,
        policy: NewPolicy,
        evidence: Vec<Evidence>,
        claims: Vec<NewPolicyClaim>,
    ) -> Result<Policy, StoreError>;

    async fn get_policy(&self, id: Uuid) -> Result<Option<Policy>, StoreError>;

    async fn get_policy_by_slug(&self, slug: &str) -> Result<Option<Policy>, StoreError>;

    /// Newest first.
    async fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, StoreError>;

    /// Active, high-value policies, newest first.
    async fn top_opportunities(&self, limit: usize) -> Result<Vec<Policy>, StoreError> {
        self.list_policies(&PolicyFilter {
            status: Some(PolicyStatus::Active),
            opportunity_value: Some(OpportunityValue::High),
            limit: Some(limit),
            ..Default::default()
        })
        .await
    }

    /// In the order they were supplied at creation.
    async fn evidence_for_policy(&self, policy_id: Uuid) -> Result<Vec<Evidence>, StoreError>;

    async fn claims_for_policy(&self, policy_id: Uuid) -> Result<Vec<PolicyClaim>, StoreError>;

    // ── Activity ──

    /// Append a batch of activity events.
    async fn insert_activities(&self, events: &[ActivityEvent]) -> Result<(), StoreError>;

    /// Events for a run in timestamp order.
    async fn run_activities(&self, run_id: Uuid) -> Result<Vec<ActivityEvent>, StoreError>;
}

/// Check every evidence row and claim index before anything is written.
pub(crate) fn validate_policy_batch(
    evidence: &[Evidence],
    claims: &[NewPolicyClaim],
) -> Result<(), StoreError> {
    for (index, e) in evidence.iter().enumerate() {
        e.validate()
            .map_err(|reason| StoreError::InvalidEvidence { index, reason })?;
    }
    for claim in claims {
        if let Some(&index) = claim
            .evidence_indexes
            .iter()
            .find(|&&i| i >= evidence.len())
        {
            return Err(StoreError::ClaimIndex {
                index,
                count: evidence.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{evidence, new_policy};
    use policyscout_core::ClaimType;

    #[test]
    fn filter_matches_all_fields() {
        let now = chrono::Utc::now();
        let policy = Policy::from_new(new_policy("Startup Visa"), "startup-visa".into(), now);
        assert!(PolicyFilter::default().matches(&policy));
        assert!(
            PolicyFilter {
                status: Some(PolicyStatus::Active),
                source_country: Some("Estonia".into()),
                ..Default::default()
            }
            .matches(&policy)
        );
        assert!(
            !PolicyFilter {
                opportunity_value: Some(OpportunityValue::Low),
                ..Default::default()
            }
            .matches(&policy)
        );
    }

    #[test]
    fn batch_validation_rejects_out_of_range_claim() {
        let ev = vec![evidence("https://a.gov")];
        let claims = vec![NewPolicyClaim {
            claim_type: ClaimType::GapStatement,
            claim_text: "gap".into(),
            evidence_indexes: vec![0, 1],
        }];
        let err = validate_policy_batch(&ev, &claims).unwrap_err();
        assert!(matches!(err, StoreError::ClaimIndex { index: 1, count: 1 }));
    }

    #[test]
    fn batch_validation_reports_row_index() {
        let mut bad = evidence("https://b.gov");
        bad.url = String::new();
        let ev = vec![evidence("https://a.gov"), bad];
        let err = validate_policy_batch(&ev, &[]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidEvidence { index: 1, .. }));
    }
}
