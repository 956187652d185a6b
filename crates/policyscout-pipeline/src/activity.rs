//! Per-run activity buffer and the summary computed from it.
//!
//! Events are held in memory for the life of one run and written to the
//! store in a single batch by [`ActivityCollector::finalize`].

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use policyscout_core::{
    ActivityEvent, ActivityEventType, ActivityOutcome, ActivitySummary, ApiMetrics, EventDraft,
    FunnelMetrics, Phase, PhaseTiming, RejectionMetrics, SourceMetrics, TimingSummary,
};
use policyscout_store::{RecordStore, StoreError};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Default)]
struct Buffer {
    events: Vec<ActivityEvent>,
    finalized: bool,
}

/// Event buffer owned by one run.
pub struct ActivityCollector {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    domestic_country: String,
    buffer: Mutex<Buffer>,
}

impl ActivityCollector {
    pub fn new(run_id: Uuid, domestic_country: impl Into<String>) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            domestic_country: domestic_country.into(),
            buffer: Mutex::new(Buffer::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stamp and append an event.
    pub fn emit(&self, draft: EventDraft) {
        let event = draft.into_event(self.run_id, Utc::now());
        self.lock().events.push(event);
    }

    /// A copy of the events so far, in emission order.
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.lock().events.clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }

    pub fn summary(&self) -> ActivitySummary {
        summarize(&self.lock().events, self.started_at, &self.domestic_country)
    }

    /// Persist the events and the summary. Only the first call writes;
    /// later calls return `Ok(None)`.
    pub async fn finalize(
        &self,
        store: &dyn RecordStore,
    ) -> Result<Option<ActivitySummary>, StoreError> {
        let (events, summary) = {
            let mut buf = self.lock();
            if buf.finalized {
                debug!(run_id = %self.run_id, "activity already finalized");
                return Ok(None);
            }
            buf.finalized = true;
            let summary = summarize(&buf.events, self.started_at, &self.domestic_country);
            (buf.events.clone(), summary)
        };

        if !events.is_empty() {
            store.insert_activities(&events).await?;
        }
        store.update_run_summary(self.run_id, &summary).await?;
        debug!(
            run_id = %self.run_id,
            events = events.len(),
            outcome = summary.outcome.as_str(),
            "activity finalized"
        );
        Ok(Some(summary))
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(|e| {
            warn!("activity buffer lock poisoned");
            PoisonError::into_inner(e)
        })
    }
}

// ── Summary ──

fn count(events: &[ActivityEvent], pred: impl Fn(&ActivityEvent) -> bool) -> u32 {
    u32::try_from(events.iter().filter(|e| pred(e)).count()).unwrap_or(u32::MAX)
}

fn is(e: &ActivityEvent, phase: Phase, kinds: &[ActivityEventType]) -> bool {
    e.phase == phase && kinds.contains(&e.event_type)
}

/// Compute the run summary from its events. Pure: the same events always
/// give the same summary.
pub fn summarize(
    events: &[ActivityEvent],
    started_at: DateTime<Utc>,
    domestic_country: &str,
) -> ActivitySummary {
    use ActivityEventType as T;

    let rejected_at_vetting = count(events, |e| {
        is(e, Phase::GlobalVetting, &[T::SignalRejected, T::ItemFiltered])
    });
    let filtered_at_gap = count(events, |e| is(e, Phase::GapAnalysis, &[T::ItemFiltered]));

    let signals_found = count(events, |e| is(e, Phase::SignalHunter, &[T::SignalFound]));
    let signals_vetted = signals_found.saturating_sub(rejected_at_vetting);
    let funnel = FunnelMetrics {
        signals_found,
        signals_vetted,
        signals_analyzed: signals_vetted.saturating_sub(filtered_at_gap),
        policies_reported: count(events, |e| {
            is(e, Phase::ReportGeneration, &[T::SignalFound])
        }),
    };

    let api_metrics = ApiMetrics {
        total_calls: count(events, |e| e.event_type == T::QuerySent),
        cache_hits: count(events, |e| e.event_type == T::CacheHit),
        cache_misses: count(events, |e| e.event_type == T::CacheMiss),
        total_tokens_used: events
            .iter()
            .map(|e| u64::from(e.tokens_used.unwrap_or(0)))
            .sum(),
    };

    let mut sources = SourceMetrics::default();
    for e in events.iter().filter(|e| e.event_type == T::EvidenceFound) {
        sources.total += 1;
        if let Some(st) = e.source_type() {
            *sources.by_type.entry(st).or_default() += 1;
        }
        if let Some(c) = &e.target_country {
            *sources.by_country.entry(c.clone()).or_default() += 1;
        }
    }

    let rejections = RejectionMetrics {
        at_vetting: rejected_at_vetting,
        at_gap_analysis: filtered_at_gap,
        low_opportunity: count(events, |e| {
            is(e, Phase::ReportGeneration, &[T::ItemFiltered])
                && e
                    .rejection_reason
                    .as_deref()
                    .is_some_and(|r| r.contains("opportunity"))
        }),
    };

    let (outcome, outcome_reason) = classify_outcome(events, &funnel, domestic_country);

    ActivitySummary {
        timing: timings(events, started_at),
        funnel,
        api_metrics,
        sources_discovered: sources,
        rejections,
        outcome,
        outcome_reason,
    }
}

fn timings(events: &[ActivityEvent], started_at: DateTime<Utc>) -> TimingSummary {
    let mut phase_timings: BTreeMap<Phase, PhaseTiming> = BTreeMap::new();
    for e in events {
        match e.event_type {
            ActivityEventType::PhaseStarted => {
                phase_timings.insert(
                    e.phase,
                    PhaseTiming {
                        started_at: e.timestamp,
                        ended_at: None,
                        duration_ms: None,
                    },
                );
            }
            ActivityEventType::PhaseCompleted => {
                if let Some(t) = phase_timings.get_mut(&e.phase) {
                    t.ended_at = Some(e.timestamp);
                    t.duration_ms = Some(millis_between(t.started_at, e.timestamp));
                }
            }
            _ => {}
        }
    }

    TimingSummary {
        total_duration_ms: events
            .last()
            .map_or(0, |e| millis_between(started_at, e.timestamp)),
        phase_timings,
    }
}

fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

fn plural<'a>(n: u32, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}

/// First match wins: errors, then reports, then the earliest empty stage.
fn classify_outcome(
    events: &[ActivityEvent],
    funnel: &FunnelMetrics,
    country: &str,
) -> (ActivityOutcome, String) {
    if let Some(last_error) = events
        .iter()
        .rev()
        .find(|e| e.event_type == ActivityEventType::ApiError)
    {
        return (
            ActivityOutcome::Error,
            format!(
                "Pipeline encountered an error: {}",
                last_error.error_message().unwrap_or("Unknown error")
            ),
        );
    }

    let FunnelMetrics {
        signals_found: found,
        signals_vetted: vetted,
        signals_analyzed: analyzed,
        policies_reported: reported,
    } = *funnel;

    if reported > 0 {
        return (
            ActivityOutcome::PoliciesFound,
            format!(
                "Found {reported} policy {} worth reporting.",
                plural(reported, "implementation", "implementations")
            ),
        );
    }
    if found == 0 {
        return (
            ActivityOutcome::NoImplementations,
            "No implementations of this policy concept were found in the selected countries. \
             Try expanding your search to more countries or refining your policy description."
                .to_string(),
        );
    }
    let reason = if vetted == 0 {
        format!(
            "Found {found} potential {}, but none passed evidence quality thresholds. \
             The sources may lack sufficient documentation of outcomes.",
            plural(found, "signal", "signals")
        )
    } else if analyzed == 0 {
        format!(
            "Found {vetted} vetted {}, but none had sufficient data for {country} gap analysis.",
            plural(vetted, "policy", "policies")
        )
    } else {
        format!(
            "Analyzed {analyzed} {}, but none represented high-value opportunities for \
             {country} (either already exists or low success evidence).",
            plural(analyzed, "policy", "policies")
        )
    };
    (ActivityOutcome::NoEvidence, reason)
}
