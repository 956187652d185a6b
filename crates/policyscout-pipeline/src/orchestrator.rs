//! Run lifecycle: create the run, drive the four phases, and always finish
//! with a terminal status and one activity flush.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use policyscout_core::{
    ActivityEventType, AnalyzedPolicy, EventDraft, NewRun, OpportunityValue, Phase,
    PipelineConfig, Policy, PolicyInterpretation, PolicySignal, Run, RunStatus, RunType,
    canonical_peer,
};
use policyscout_search::SearchClient;
use policyscout_store::{RecordStore, StoreError};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::activity::ActivityCollector;
use crate::context::PhaseContext;
use crate::error::PipelineError;
use crate::gap::analyze_gaps;
use crate::interpret::interpret_policy_idea;
use crate::report::generate_reports;
use crate::signal_hunter::{HuntStrategy, discover_signals, hunt_signals};
use crate::vetting::vet_signals;

// ── Cancellation ──

/// Cooperative cancellation flags keyed by run id, polled between phases.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    cancelled: Mutex<HashSet<Uuid>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, run_id: Uuid) {
        info!(run_id = %run_id, "cancellation requested");
        self.lock().insert(run_id);
    }

    pub fn is_cancelled(&self, run_id: Uuid) -> bool {
        self.lock().contains(&run_id)
    }

    pub fn clear(&self, run_id: Uuid) {
        self.lock().remove(&run_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Pipeline ──

/// Outcome of one run. `error` is set whenever `success` is false.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run: Run,
    pub policies: Vec<Policy>,
    pub success: bool,
    pub error: Option<String>,
}

enum Source {
    Hunt {
        countries: Vec<String>,
        strategy: HuntStrategy,
    },
    Discovery,
}

impl Source {
    /// Discovery reports only high-value opportunities.
    fn reports(&self, policy: &AnalyzedPolicy) -> bool {
        match self {
            Self::Hunt { .. } => policy.is_reportable(),
            Self::Discovery => policy.opportunity_value() == Some(OpportunityValue::High),
        }
    }
}

/// A phase-level failure and the phase it happened in.
struct Failure {
    phase: Phase,
    error: PipelineError,
}

fn at<E: Into<PipelineError>>(phase: Phase) -> impl FnOnce(E) -> Failure {
    move |e| Failure {
        phase,
        error: e.into(),
    }
}

pub struct Pipeline {
    store: Arc<dyn RecordStore>,
    search: Arc<SearchClient>,
    config: PipelineConfig,
    cancel: Arc<CancelRegistry>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        search: Arc<SearchClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            search,
            config,
            cancel: Arc::new(CancelRegistry::new()),
        }
    }

    /// Share a registry with whoever issues cancellations.
    pub fn with_cancel_registry(mut self, registry: Arc<CancelRegistry>) -> Self {
        self.cancel = registry;
        self
    }

    pub fn cancel_registry(&self) -> Arc<CancelRegistry> {
        self.cancel.clone()
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn interpret(&self, idea: &str) -> Result<PolicyInterpretation, PipelineError> {
        interpret_policy_idea(&self.search, idea).await
    }

    /// Research `countries`, which must be peer countries. Unknown names
    /// are dropped; none left is an error.
    pub async fn run_research(
        &self,
        countries: &[String],
        strategy: HuntStrategy,
    ) -> Result<PipelineResult, PipelineError> {
        let countries = valid_countries(countries, |c| canonical_peer(c).map(str::to_string))?;
        self.research(countries, strategy).await
    }

    async fn research(
        &self,
        countries: Vec<String>,
        strategy: HuntStrategy,
    ) -> Result<PipelineResult, PipelineError> {
        let new = NewRun {
            run_type: RunType::Manual,
            countries: countries.clone(),
            search_mode: Some(strategy.search_mode()),
            search_query: strategy.search_query(),
            interpretation: strategy.interpretation().cloned(),
        };
        self.execute(new, Source::Hunt { countries, strategy }).await
    }

    /// Country-agnostic discovery run.
    pub async fn run_discovery(&self) -> Result<PipelineResult, PipelineError> {
        let new = NewRun {
            run_type: RunType::Discovery,
            countries: Vec::new(),
            search_mode: None,
            search_query: None,
            interpretation: None,
        };
        self.execute(new, Source::Discovery).await
    }

    /// Re-run a stored interpretation against new countries. The domestic
    /// country is accepted here as well as the peers.
    pub async fn clone_run(
        &self,
        run_id: Uuid,
        countries: &[String],
    ) -> Result<PipelineResult, PipelineError> {
        let source = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(PipelineError::RunNotFound(run_id))?;
        let interpretation = source.interpretation.ok_or_else(|| {
            PipelineError::InvalidInput(format!("run {run_id} has no policy interpretation"))
        })?;
        let profile = &self.config.domestic;
        let countries = valid_countries(countries, |c| profile.searchable(c))?;
        info!(source = %run_id, countries = ?countries, "cloning run");
        self.research(countries, HuntStrategy::Interpretation(interpretation))
            .await
    }

    async fn execute(&self, new: NewRun, source: Source) -> Result<PipelineResult, PipelineError> {
        let run = self.store.create_run(new).await?;
        let run_id = run.id;
        let activity = ActivityCollector::new(run_id, &self.config.domestic.country);
        info!(run_id = %run_id, run_type = run.run_type.as_str(), "run started");

        let (policies, success, message) = match self.drive(&run, &activity, &source).await {
            Ok(policies) => (policies, true, None),
            Err(Failure {
                error: PipelineError::Cancelled,
                phase,
            }) => {
                info!(run_id = %run_id, phase = phase.as_str(), "run cancelled");
                self.settle(run_id, RunStatus::Cancelled, None).await;
                (Vec::new(), false, Some(PipelineError::Cancelled.to_string()))
            }
            Err(Failure { error: e, phase }) => {
                let message = e.to_string();
                error!(run_id = %run_id, phase = phase.as_str(), error = %message, "run failed");
                activity.emit(EventDraft::new(phase, ActivityEventType::ApiError).error(&message));
                self.settle(run_id, RunStatus::Failed, Some(&message)).await;
                (Vec::new(), false, Some(message))
            }
        };

        if let Err(e) = activity.finalize(self.store.as_ref()).await {
            warn!(run_id = %run_id, error = %e, "failed to flush activity");
        }
        self.cancel.clear(run_id);

        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(PipelineError::RunNotFound(run_id))?;
        Ok(PipelineResult {
            run,
            policies,
            success,
            error: message,
        })
    }

    async fn drive(
        &self,
        run: &Run,
        activity: &ActivityCollector,
        source: &Source,
    ) -> Result<Vec<Policy>, Failure> {
        let ctx = PhaseContext::new(&self.search, activity, &self.config);
        let run_id = run.id;

        self.enter(run_id, Phase::SignalHunter, activity).await?;
        let signals: Vec<PolicySignal> = match source {
            Source::Hunt {
                countries,
                strategy,
            } => hunt_signals(ctx, countries, strategy).await,
            Source::Discovery => discover_signals(ctx).await,
        };
        leave(Phase::SignalHunter, activity, signals.len());
        if signals.is_empty() {
            info!(run_id = %run_id, "no signals found");
            self.complete(run_id, Phase::SignalHunter, &[]).await?;
            return Ok(Vec::new());
        }

        self.enter(run_id, Phase::GlobalVetting, activity).await?;
        let vetted = vet_signals(ctx, signals).await;
        leave(Phase::GlobalVetting, activity, vetted.len());
        if vetted.is_empty() {
            info!(run_id = %run_id, "no signals survived vetting");
            self.complete(run_id, Phase::GlobalVetting, &[]).await?;
            return Ok(Vec::new());
        }

        self.enter(run_id, Phase::GapAnalysis, activity).await?;
        let analyzed = analyze_gaps(ctx, vetted).await;
        leave(Phase::GapAnalysis, activity, analyzed.len());

        self.enter(run_id, Phase::ReportGeneration, activity).await?;
        let mut reportable = Vec::new();
        for policy in analyzed {
            if source.reports(&policy) {
                reportable.push(policy);
            } else if policy.is_reportable() {
                activity.emit(
                    EventDraft::new(Phase::ReportGeneration, ActivityEventType::ItemFiltered)
                        .item(policy.name.clone())
                        .country(policy.source_country.clone())
                        .reason("Medium opportunity value excluded from discovery"),
                );
            }
        }
        let policies =
            generate_reports(ctx, self.store.as_ref(), Some(run_id), reportable).await;
        leave(Phase::ReportGeneration, activity, policies.len());

        self.complete(run_id, Phase::ReportGeneration, &policies).await?;
        Ok(policies)
    }

    /// Poll cancellation, record the phase on the run, and mark its start.
    async fn enter(
        &self,
        run_id: Uuid,
        phase: Phase,
        activity: &ActivityCollector,
    ) -> Result<(), Failure> {
        if self.cancel.is_cancelled(run_id) {
            return Err(Failure {
                phase,
                error: PipelineError::Cancelled,
            });
        }
        self.store
            .update_run_phase(run_id, phase)
            .await
            .map_err(at::<StoreError>(phase))?;
        activity.emit(EventDraft::new(phase, ActivityEventType::PhaseStarted));
        info!(run_id = %run_id, phase = phase.as_str(), "phase started");
        Ok(())
    }

    /// Persist the counts and mark the run completed.
    async fn complete(
        &self,
        run_id: Uuid,
        phase: Phase,
        policies: &[Policy],
    ) -> Result<(), Failure> {
        let found = u32::try_from(policies.len()).unwrap_or(u32::MAX);
        let high = u32::try_from(
            policies
                .iter()
                .filter(|p| p.opportunity_value == Some(OpportunityValue::High))
                .count(),
        )
        .unwrap_or(u32::MAX);
        self.store
            .update_run_counts(run_id, found, high)
            .await
            .map_err(at::<StoreError>(phase))?;
        self.store
            .set_run_status(run_id, RunStatus::Completed, None)
            .await
            .map_err(at::<StoreError>(phase))?;
        info!(run_id = %run_id, found, high, "run completed");
        Ok(())
    }

    /// Best-effort terminal status on the failure and cancel paths.
    async fn settle(&self, run_id: Uuid, status: RunStatus, message: Option<&str>) {
        if let Err(e) = self.store.set_run_status(run_id, status, message).await {
            warn!(run_id = %run_id, status = status.as_str(), error = %e, "failed to set run status");
        }
    }
}

fn leave(phase: Phase, activity: &ActivityCollector, count: usize) {
    activity.emit(EventDraft::new(phase, ActivityEventType::PhaseCompleted).count(count));
    info!(phase = phase.as_str(), count, "phase completed");
}

/// Canonicalise and deduplicate country names, dropping unknown ones.
fn valid_countries(
    input: &[String],
    canonical: impl Fn(&str) -> Option<String>,
) -> Result<Vec<String>, PipelineError> {
    let mut out: Vec<String> = Vec::new();
    for raw in input {
        match canonical(raw) {
            Some(c) if !out.contains(&c) => out.push(c),
            Some(_) => {}
            None => warn!(country = %raw, "ignoring unsupported country"),
        }
    }
    if out.is_empty() {
        return Err(PipelineError::InvalidInput(
            "no supported countries given".into(),
        ));
    }
    Ok(out)
}
