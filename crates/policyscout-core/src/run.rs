//! Research runs and the policy interpretation that seeds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::ActivitySummary;

str_enum! {
    /// How a run was started.
    pub enum RunType {
        Manual => "manual",
        Discovery => "discovery",
    }
}

str_enum! {
    pub enum RunStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl RunStatus {
    /// Terminal states are set once and carry a completion timestamp.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

str_enum! {
    /// Pipeline phases in execution order.
    pub enum Phase {
        SignalHunter => "signal_hunter",
        GlobalVetting => "global_vetting",
        GapAnalysis => "gap_analysis",
        ReportGeneration => "report_generation",
    }
}

str_enum! {
    /// Query strategy recorded on a run.
    pub enum SearchMode {
        Broad => "broad",
        Topic => "topic",
        Reverse => "reverse",
        Interpretation => "interpretation",
    }
}

/// Structured levers extracted from a policy idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyLevers {
    /// e.g. "Early-stage startups"
    pub target_group: String,
    /// e.g. "Tax credit", "Direct grant"
    pub mechanism: String,
    /// `None` when the idea is sector-agnostic.
    #[serde(default)]
    pub sector: Option<String>,
    pub intended_outcome: String,
}

/// A user's policy idea after interpretation by the research service.
///
/// Field names are camelCase because the interpretation prompt asks the
/// model for exactly this JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInterpretation {
    pub policy_name: String,
    #[serde(default)]
    pub also_known_as: Vec<String>,
    pub category: String,
    pub summary: String,
    #[serde(default)]
    pub original_input: String,
    pub levers: PolicyLevers,
}

impl PolicyInterpretation {
    /// The policy name followed by its aliases, blanks and duplicates removed.
    pub fn name_variants(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in std::iter::once(&self.policy_name).chain(&self.also_known_as) {
            let name = name.trim();
            if name.is_empty() || out.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                continue;
            }
            out.push(name.to_string());
        }
        out
    }
}

/// One research execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub run_type: RunType,
    pub status: RunStatus,
    pub phase: Option<Phase>,
    pub countries: Vec<String>,
    pub search_mode: Option<SearchMode>,
    pub search_query: Option<String>,
    pub interpretation: Option<PolicyInterpretation>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub policies_found: u32,
    pub high_value_count: u32,
    pub error_message: Option<String>,
    pub activity_summary: Option<ActivitySummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Build the record a store persists for a freshly started run.
    pub fn start(new: NewRun, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_type: new.run_type,
            status: RunStatus::Running,
            phase: None,
            countries: new.countries,
            search_mode: new.search_mode,
            search_query: new.search_query,
            interpretation: new.interpretation,
            started_at: Some(now),
            completed_at: None,
            policies_found: 0,
            high_value_count: 0,
            error_message: None,
            activity_summary: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Parameters for creating a run record.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub run_type: RunType,
    pub countries: Vec<String>,
    pub search_mode: Option<SearchMode>,
    pub search_query: Option<String>,
    pub interpretation: Option<PolicyInterpretation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpretation() -> PolicyInterpretation {
        PolicyInterpretation {
            policy_name: "R&D Tax Credit".into(),
            also_known_as: vec![
                "research tax credit".into(),
                "R&D TAX CREDIT".into(),
                "  ".into(),
            ],
            category: "Tax Incentive".into(),
            summary: "Credit against corporation tax for qualifying R&D spend.".into(),
            original_input: "tax credit for research".into(),
            levers: PolicyLevers {
                target_group: "R&D-intensive SMEs".into(),
                mechanism: "Tax credit".into(),
                sector: None,
                intended_outcome: "Increase private R&D spending".into(),
            },
        }
    }

    #[test]
    fn interpretation_parses_camel_case() {
        let json = r#"{
            "policyName": "Startup Visa",
            "alsoKnownAs": ["Founder visa"],
            "category": "Talent Visa",
            "summary": "Residence route for founders.",
            "levers": {
                "targetGroup": "Foreign founders",
                "mechanism": "Visa",
                "sector": null,
                "intendedOutcome": "Attract founders"
            }
        }"#;
        let parsed: PolicyInterpretation = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.policy_name, "Startup Visa");
        assert_eq!(parsed.also_known_as, vec!["Founder visa"]);
        assert_eq!(parsed.levers.sector, None);
        assert_eq!(parsed.original_input, "");
    }

    #[test]
    fn name_variants_dedup_case_insensitively() {
        let names = interpretation().name_variants();
        assert_eq!(names, vec!["R&D Tax Credit", "research tax credit"]);
    }

    #[test]
    fn start_sets_running_and_started_at() {
        let now = Utc::now();
        let run = Run::start(
            NewRun {
                run_type: RunType::Manual,
                countries: vec!["Estonia".into()],
                search_mode: Some(SearchMode::Interpretation),
                search_query: None,
                interpretation: Some(interpretation()),
            },
            now,
        );
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.started_at, Some(now));
        assert!(run.completed_at.is_none());
        assert_eq!(run.policies_found, 0);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }
}
