//! Activity events recorded during a run and the summary derived from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::SourceType;
use crate::run::Phase;

str_enum! {
    pub enum ActivityEventType {
        PhaseStarted => "phase_started",
        PhaseCompleted => "phase_completed",
        QuerySent => "query_sent",
        SignalFound => "signal_found",
        SignalRejected => "signal_rejected",
        EvidenceFound => "evidence_found",
        CacheHit => "cache_hit",
        CacheMiss => "cache_miss",
        ApiError => "api_error",
        ItemFiltered => "item_filtered",
    }
}

str_enum! {
    pub enum ActivityOutcome {
        PoliciesFound => "policies_found",
        NoImplementations => "no_implementations",
        NoEvidence => "no_evidence",
        Error => "error",
    }
}

/// One immutable pipeline action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub run_id: Uuid,
    pub phase: Phase,
    pub event_type: ActivityEventType,
    pub timestamp: DateTime<Utc>,
    pub query_text: Option<String>,
    pub target_country: Option<String>,
    pub item_name: Option<String>,
    pub item_count: Option<u32>,
    pub rejection_reason: Option<String>,
    pub api_call_duration_ms: Option<u64>,
    pub tokens_used: Option<u32>,
    pub cache_hit: bool,
    pub metadata: Option<serde_json::Value>,
}

impl ActivityEvent {
    /// The error message carried by an `api_error` event.
    pub fn error_message(&self) -> Option<&str> {
        self.meta_str("error")
    }

    /// The source type carried by an `evidence_found` event.
    pub fn source_type(&self) -> Option<SourceType> {
        self.meta_str("source_type")?.parse().ok()
    }

    fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}

/// An event before the collector stamps it with run id and time.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub phase: Phase,
    pub event_type: ActivityEventType,
    pub query_text: Option<String>,
    pub target_country: Option<String>,
    pub item_name: Option<String>,
    pub item_count: Option<u32>,
    pub rejection_reason: Option<String>,
    pub api_call_duration_ms: Option<u64>,
    pub tokens_used: Option<u32>,
    pub cache_hit: bool,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EventDraft {
    pub fn new(phase: Phase, event_type: ActivityEventType) -> Self {
        Self {
            phase,
            event_type,
            query_text: None,
            target_country: None,
            item_name: None,
            item_count: None,
            rejection_reason: None,
            api_call_duration_ms: None,
            tokens_used: None,
            cache_hit: event_type == ActivityEventType::CacheHit,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn query(mut self, q: impl Into<String>) -> Self {
        self.query_text = Some(q.into());
        self
    }

    pub fn country(mut self, c: impl Into<String>) -> Self {
        self.target_country = Some(c.into());
        self
    }

    pub fn item(mut self, name: impl Into<String>) -> Self {
        self.item_name = Some(name.into());
        self
    }

    pub fn count(mut self, n: usize) -> Self {
        self.item_count = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    pub fn reason(mut self, r: impl Into<String>) -> Self {
        self.rejection_reason = Some(r.into());
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.api_call_duration_ms = Some(ms);
        self
    }

    pub fn tokens(mut self, t: u32) -> Self {
        self.tokens_used = Some(t);
        self
    }

    pub fn error(self, message: impl Into<String>) -> Self {
        self.meta("error", message.into())
    }

    pub fn source_type(self, st: SourceType) -> Self {
        self.meta("source_type", st.as_str())
    }

    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Stamp the draft with its run and time.
    pub fn into_event(self, run_id: Uuid, timestamp: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent {
            id: Uuid::new_v4(),
            run_id,
            phase: self.phase,
            event_type: self.event_type,
            timestamp,
            query_text: self.query_text,
            target_country: self.target_country,
            item_name: self.item_name,
            item_count: self.item_count,
            rejection_reason: self.rejection_reason,
            api_call_duration_ms: self.api_call_duration_ms,
            tokens_used: self.tokens_used,
            cache_hit: self.cache_hit,
            metadata: (!self.metadata.is_empty())
                .then(|| serde_json::Value::Object(self.metadata)),
        }
    }
}

// ── Summary ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub total_duration_ms: u64,
    pub phase_timings: BTreeMap<Phase, PhaseTiming>,
}

/// Items surviving each phase: found, vetted, analyzed, reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelMetrics {
    pub signals_found: u32,
    pub signals_vetted: u32,
    pub signals_analyzed: u32,
    pub policies_reported: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_calls: u32,
    pub cache_hits: u32,
    pub cache_misses: u32,
    pub total_tokens_used: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub total: u32,
    pub by_type: BTreeMap<SourceType, u32>,
    pub by_country: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionMetrics {
    pub at_vetting: u32,
    pub at_gap_analysis: u32,
    pub low_opportunity: u32,
}

/// Aggregate view of a run's events, snapshotted onto the run at finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub timing: TimingSummary,
    pub funnel: FunnelMetrics,
    pub api_metrics: ApiMetrics,
    pub sources_discovered: SourceMetrics,
    pub rejections: RejectionMetrics,
    pub outcome: ActivityOutcome,
    pub outcome_reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_builder_fills_fields() {
        let run_id = Uuid::new_v4();
        let ev = EventDraft::new(Phase::GlobalVetting, ActivityEventType::EvidenceFound)
            .item("Startup Visa")
            .country("Estonia")
            .source_type(SourceType::GovDoc)
            .into_event(run_id, Utc::now());
        assert_eq!(ev.run_id, run_id);
        assert_eq!(ev.item_name.as_deref(), Some("Startup Visa"));
        assert_eq!(ev.source_type(), Some(SourceType::GovDoc));
        assert!(!ev.cache_hit);
    }

    #[test]
    fn cache_hit_flag_follows_type() {
        let ev = EventDraft::new(Phase::SignalHunter, ActivityEventType::CacheHit)
            .into_event(Uuid::new_v4(), Utc::now());
        assert!(ev.cache_hit);
        assert!(ev.metadata.is_none());
    }

    #[test]
    fn error_message_from_metadata() {
        let ev = EventDraft::new(Phase::GapAnalysis, ActivityEventType::ApiError)
            .error("timeout")
            .into_event(Uuid::new_v4(), Utc::now());
        assert_eq!(ev.error_message(), Some("timeout"));
    }

    #[test]
    fn summary_maps_serialize_with_wire_keys() {
        let mut by_type = BTreeMap::new();
        by_type.insert(SourceType::OecdReport, 2);
        let metrics = SourceMetrics {
            total: 2,
            by_type,
            by_country: BTreeMap::new(),
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["by_type"]["oecd_report"], 2);
    }
}
