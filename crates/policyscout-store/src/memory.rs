//! In-process record store.
//!
//! Used when no database path is configured and throughout the pipeline
//! tests. All state sits behind one mutex so the atomic policy create is a
//! single critical section.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use policyscout_core::{
    ActivityEvent, ActivitySummary, Evidence, NewPolicy, NewPolicyClaim, NewRun, Phase, Policy,
    PolicyClaim, Run, RunStatus, slugify, unique_slug,
};
use tracing::debug;
use uuid::Uuid;

use crate::{PolicyFilter, RecordStore, StoreError, validate_policy_batch};

#[derive(Default)]
struct State {
    runs: Vec<Run>,
    policies: Vec<Policy>,
    evidence: Vec<Evidence>,
    claims: Vec<PolicyClaim>,
    activities: Vec<ActivityEvent>,
    activity_flushes: HashMap<Uuid, u32>,
    summary_writes: HashMap<Uuid, u32>,
}

/// Record store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `insert_activities` calls made for a run.
    pub fn activity_flushes(&self, run_id: Uuid) -> u32 {
        self.lock().activity_flushes.get(&run_id).copied().unwrap_or(0)
    }

    /// Number of `update_run_summary` calls made for a run.
    pub fn summary_writes(&self, run_id: Uuid) -> u32 {
        self.lock().summary_writes.get(&run_id).copied().unwrap_or(0)
    }

    /// Total policies stored.
    pub fn policy_count(&self) -> usize {
        self.lock().policies.len()
    }

    /// Total evidence rows stored.
    pub fn evidence_count(&self) -> usize {
        self.lock().evidence.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave a half-applied write:
        // every mutation validates first and then only pushes.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn run_mut(&mut self, id: Uuid) -> Result<&mut Run, StoreError> {
        self.runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::run_not_found(id))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_run(&self, new: NewRun) -> Result<Run, StoreError> {
        let run = Run::start(new, Utc::now());
        self.lock().runs.push(run.clone());
        debug!(run_id = %run.id, "created run");
        Ok(run)
    }

    async fn update_run_phase(&self, id: Uuid, phase: Phase) -> Result<(), StoreError> {
        let mut state = self.lock();
        let run = state.run_mut(id)?;
        run.phase = Some(phase);
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn set_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let run = state.run_mut(id)?;
        if run.status.is_terminal() {
            return Err(StoreError::RunFinished(id));
        }
        let now = Utc::now();
        run.status = status;
        run.updated_at = now;
        if status.is_terminal() {
            run.completed_at = Some(now);
        }
        if let Some(msg) = error_message {
            run.error_message = Some(msg.to_string());
        }
        Ok(())
    }

    async fn update_run_counts(
        &self,
        id: Uuid,
        policies_found: u32,
        high_value_count: u32,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let run = state.run_mut(id)?;
        run.policies_found = policies_found;
        run.high_value_count = high_value_count;
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn update_run_summary(
        &self,
        id: Uuid,
        summary: &ActivitySummary,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let run = state.run_mut(id)?;
        run.activity_summary = Some(summary.clone());
        run.updated_at = Utc::now();
        *state.summary_writes.entry(id).or_default() += 1;
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>, StoreError> {
        Ok(self.lock().runs.iter().find(|r| r.id == id).cloned())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<Run>, StoreError> {
        Ok(self.lock().runs.iter().rev().take(limit).cloned().collect())
    }

    async fn active_run(&self) -> Result<Option<Run>, StoreError> {
        Ok(self
            .lock()
            .runs
            .iter()
            .rev()
            .find(|r| r.status == RunStatus::Running)
            .cloned())
    }

    async fn create_policy_with_evidence(
        &self,
        policy: NewPolicy,
        evidence: Vec<Evidence>,
        claims: Vec<NewPolicyClaim>,
    ) -> Result<Policy, StoreError> {
        validate_policy_batch(&evidence, &claims)?;

        let mut state = self.lock();
        let slug = unique_slug(&slugify(&policy.name), |s| {
            state.policies.iter().any(|p| p.slug == s)
        });
        let now = Utc::now();
        let saved = Policy::from_new(policy, slug, now);

        let evidence: Vec<Evidence> = evidence
            .into_iter()
            .map(|mut e| {
                e.policy_id = Some(saved.id);
                e
            })
            .collect();
        let claims: Vec<PolicyClaim> = claims
            .into_iter()
            .map(|c| PolicyClaim {
                id: Uuid::new_v4(),
                policy_id: saved.id,
                claim_type: c.claim_type,
                claim_text: c.claim_text,
                evidence_ids: c.evidence_indexes.iter().map(|&i| evidence[i].id).collect(),
                created_at: now,
            })
            .collect();

        debug!(slug = %saved.slug, evidence = evidence.len(), claims = claims.len(), "stored policy");
        state.policies.push(saved.clone());
        state.evidence.extend(evidence);
        state.claims.extend(claims);
        Ok(saved)
    }

    async fn get_policy(&self, id: Uuid) -> Result<Option<Policy>, StoreError> {
        Ok(self.lock().policies.iter().find(|p| p.id == id).cloned())
    }

    async fn get_policy_by_slug(&self, slug: &str) -> Result<Option<Policy>, StoreError> {
        Ok(self.lock().policies.iter().find(|p| p.slug == slug).cloned())
    }

    async fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, StoreError> {
        let state = self.lock();
        let matching = state.policies.iter().rev().filter(|p| filter.matches(p));
        Ok(match filter.limit {
            Some(n) => matching.take(n).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn evidence_for_policy(&self, policy_id: Uuid) -> Result<Vec<Evidence>, StoreError> {
        Ok(self
            .lock()
            .evidence
            .iter()
            .filter(|e| e.policy_id == Some(policy_id))
            .cloned()
            .collect())
    }

    async fn claims_for_policy(&self, policy_id: Uuid) -> Result<Vec<PolicyClaim>, StoreError> {
        Ok(self
            .lock()
            .claims
            .iter()
            .filter(|c| c.policy_id == policy_id)
            .cloned()
            .collect())
    }

    async fn insert_activities(&self, events: &[ActivityEvent]) -> Result<(), StoreError> {
        let mut state = self.lock();
        for run_id in events.iter().map(|e| e.run_id).collect::<std::collections::HashSet<_>>() {
            *state.activity_flushes.entry(run_id).or_default() += 1;
        }
        state.activities.extend_from_slice(events);
        Ok(())
    }

    async fn run_activities(&self, run_id: Uuid) -> Result<Vec<ActivityEvent>, StoreError> {
        let mut events: Vec<ActivityEvent> = self
            .lock()
            .activities
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{claims, evidence, new_policy, new_run};
    use policyscout_core::{ActivityEventType, EventDraft, PolicyStatus};

    #[tokio::test]
    async fn run_lifecycle() {
        let store = MemoryStore::new();
        let run = store.create_run(new_run()).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.started_at.is_some());

        store.update_run_phase(run.id, Phase::GapAnalysis).await.unwrap();
        store.update_run_counts(run.id, 4, 1).await.unwrap();
        store
            .set_run_status(run.id, RunStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let stored = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.phase, Some(Phase::GapAnalysis));
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
        assert_eq!(stored.policies_found, 4);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn terminal_status_is_set_once() {
        let store = MemoryStore::new();
        let run = store.create_run(new_run()).await.unwrap();
        store
            .set_run_status(run.id, RunStatus::Cancelled, None)
            .await
            .unwrap();
        let err = store
            .set_run_status(run.id, RunStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RunFinished(_)));
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_run_phase(Uuid::new_v4(), Phase::SignalHunter)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "run", .. }));
    }

    #[tokio::test]
    async fn active_and_recent_runs() {
        let store = MemoryStore::new();
        let a = store.create_run(new_run()).await.unwrap();
        let b = store.create_run(new_run()).await.unwrap();
        store
            .set_run_status(b.id, RunStatus::Completed, None)
            .await
            .unwrap();

        assert_eq!(store.active_run().await.unwrap().unwrap().id, a.id);
        let recent = store.recent_runs(10).await.unwrap();
        assert_eq!(recent[0].id, b.id);
        assert_eq!(recent.len(), 2);
        assert_eq!(store.recent_runs(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_policy_links_evidence_and_claims() {
        let store = MemoryStore::new();
        let ev = vec![evidence("https://a.gov.ee"), evidence("https://oecd.org/x")];
        let ev_ids: Vec<Uuid> = ev.iter().map(|e| e.id).collect();
        let saved = store
            .create_policy_with_evidence(new_policy("Startup Visa"), ev, claims())
            .await
            .unwrap();

        assert_eq!(saved.slug, "startup-visa");
        let stored_ev = store.evidence_for_policy(saved.id).await.unwrap();
        assert_eq!(stored_ev.len(), 2);
        assert!(stored_ev.iter().all(|e| e.policy_id == Some(saved.id)));

        let stored_claims = store.claims_for_policy(saved.id).await.unwrap();
        assert_eq!(stored_claims.len(), 2);
        assert_eq!(stored_claims[0].evidence_ids, ev_ids);
        assert_eq!(stored_claims[1].evidence_ids, vec![ev_ids[1]]);
    }

    #[tokio::test]
    async fn invalid_evidence_leaves_no_policy() {
        let store = MemoryStore::new();
        let mut bad = evidence("https://a.gov.ee");
        bad.claim = "x".repeat(501);
        let err = store
            .create_policy_with_evidence(
                new_policy("Startup Visa"),
                vec![evidence("https://b.gov.ee"), bad],
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidEvidence { index: 1, .. }));
        assert_eq!(store.policy_count(), 0);
        assert_eq!(store.evidence_count(), 0);
        assert!(store.get_policy_by_slug("startup-visa").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_names_get_suffixed_slugs() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store
                .create_policy_with_evidence(new_policy("R&D Tax Credit"), vec![], vec![])
                .await
                .unwrap();
        }
        for slug in ["r-d-tax-credit", "r-d-tax-credit-2", "r-d-tax-credit-3"] {
            assert!(store.get_policy_by_slug(slug).await.unwrap().is_some(), "{slug}");
        }
    }

    #[tokio::test]
    async fn list_filters_and_top_opportunities() {
        let store = MemoryStore::new();
        store
            .create_policy_with_evidence(new_policy("First"), vec![], vec![])
            .await
            .unwrap();
        let mut draft = new_policy("Second");
        draft.status = PolicyStatus::Draft;
        store
            .create_policy_with_evidence(draft, vec![], vec![])
            .await
            .unwrap();
        store
            .create_policy_with_evidence(new_policy("Third"), vec![], vec![])
            .await
            .unwrap();

        let all = store.list_policies(&PolicyFilter::default()).await.unwrap();
        let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Third", "Second", "First"]);

        let top = store.top_opportunities(3).await.unwrap();
        let names: Vec<_> = top.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Third", "First"]);

        let limited = store
            .list_policies(&PolicyFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn activity_flushes_are_counted() {
        let store = MemoryStore::new();
        let run = store.create_run(new_run()).await.unwrap();
        let events: Vec<_> = [ActivityEventType::PhaseStarted, ActivityEventType::QuerySent]
            .into_iter()
            .map(|t| EventDraft::new(Phase::SignalHunter, t).into_event(run.id, Utc::now()))
            .collect();
        store.insert_activities(&events).await.unwrap();

        assert_eq!(store.activity_flushes(run.id), 1);
        let stored = store.run_activities(run.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].event_type, ActivityEventType::PhaseStarted);
    }
}
