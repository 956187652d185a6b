//! Vertical card display for runs, policies, and interpretations.
//!
//! Cards are grouped into sections; a section with no populated rows is
//! skipped entirely.

use chrono::{DateTime, Utc};
use policyscout_core::{ActivityEvent, Evidence, Policy, PolicyClaim, PolicyInterpretation, Run};

const MAX_LIST_ITEMS: usize = 10;
const MAX_TEXT_CHARS: usize = 96;

type Row<'a> = (&'a str, Option<String>);

// ── Public API ──

pub fn print_interpretation(i: &PolicyInterpretation) {
    println!("=== {} ===", i.policy_name);
    println!("{}", i.summary);
    println!();

    print_section(
        "Identity",
        &[
            ("category", Some(i.category.clone())),
            ("also_known_as", joined(&i.also_known_as)),
            ("original_input", non_empty(&i.original_input)),
        ],
    );
    print_section(
        "Levers",
        &[
            ("target_group", Some(i.levers.target_group.clone())),
            ("mechanism", Some(i.levers.mechanism.clone())),
            ("sector", i.levers.sector.clone()),
            ("intended_outcome", Some(i.levers.intended_outcome.clone())),
        ],
    );
}

/// Print a run with its activity summary, if one was recorded.
pub fn print_run(run: &Run) {
    println!("=== Run {} ===", run.id);
    println!();

    print_section(
        "Run",
        &[
            ("type", Some(run.run_type.to_string())),
            ("status", Some(run.status.to_string())),
            ("phase", run.phase.map(|p| p.to_string())),
            ("countries", joined(&run.countries)),
            ("search_mode", run.search_mode.map(|m| m.to_string())),
            ("search_query", run.search_query.clone()),
            (
                "interpretation",
                run.interpretation.as_ref().map(|i| i.policy_name.clone()),
            ),
            ("error", run.error_message.clone()),
        ],
    );
    print_section(
        "Results",
        &[
            ("policies_found", Some(run.policies_found.to_string())),
            ("high_value_count", Some(run.high_value_count.to_string())),
        ],
    );
    print_section(
        "Timestamps",
        &[
            ("started_at", run.started_at.map(timestamp)),
            ("completed_at", run.completed_at.map(timestamp)),
        ],
    );

    let Some(summary) = &run.activity_summary else {
        return;
    };
    print_section(
        "Outcome",
        &[
            ("outcome", Some(summary.outcome.to_string())),
            ("reason", Some(summary.outcome_reason.clone())),
            (
                "total_duration",
                Some(format!("{} ms", summary.timing.total_duration_ms)),
            ),
        ],
    );
    let f = &summary.funnel;
    print_section(
        "Funnel",
        &[
            ("signals_found", Some(f.signals_found.to_string())),
            ("signals_vetted", Some(f.signals_vetted.to_string())),
            ("signals_analyzed", Some(f.signals_analyzed.to_string())),
            ("policies_reported", Some(f.policies_reported.to_string())),
        ],
    );
    let api = &summary.api_metrics;
    let r = &summary.rejections;
    print_section(
        "API & Rejections",
        &[
            ("api_calls", Some(api.total_calls.to_string())),
            (
                "cache_hit/miss",
                Some(format!("{}/{}", api.cache_hits, api.cache_misses)),
            ),
            ("tokens_used", Some(api.total_tokens_used.to_string())),
            ("rejected_at_vetting", Some(r.at_vetting.to_string())),
            ("rejected_at_gap", Some(r.at_gap_analysis.to_string())),
            ("low_opportunity", Some(r.low_opportunity.to_string())),
        ],
    );
    let src = &summary.sources_discovered;
    let by_type: Vec<String> = src
        .by_type
        .iter()
        .map(|(t, n)| format!("{t}={n}"))
        .collect();
    let by_country: Vec<String> = src
        .by_country
        .iter()
        .map(|(c, n)| format!("{c}={n}"))
        .collect();
    print_section(
        "Sources",
        &[
            ("total", Some(src.total.to_string())),
            ("by_type", joined(&by_type)),
            ("by_country", joined(&by_country)),
        ],
    );
    let phases: Vec<String> = summary
        .timing
        .phase_timings
        .iter()
        .map(|(phase, t)| match t.duration_ms {
            Some(ms) => format!("{phase} {ms} ms"),
            None => format!("{phase} (unfinished)"),
        })
        .collect();
    print_section("Phases", &[("timings", joined(&phases))]);
}

pub fn print_run_rows(runs: &[Run]) {
    if runs.is_empty() {
        println!("No runs.");
        return;
    }
    println!(
        "{:<36}  {:<12} {:<10} {:>5} {:>5}  {}",
        "id", "type", "status", "found", "high", "started"
    );
    for run in runs {
        println!(
            "{:<36}  {:<12} {:<10} {:>5} {:>5}  {}",
            run.id,
            run.run_type,
            run.status,
            run.policies_found,
            run.high_value_count,
            run.started_at.map(timestamp).unwrap_or_default()
        );
    }
}

pub fn print_policy_rows(policies: &[Policy]) {
    if policies.is_empty() {
        println!("No policies.");
        return;
    }
    for p in policies {
        let value = p
            .opportunity_value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<6} {:<20} {:<14} {}  ({})",
            value, p.domestic_status, p.source_country, p.name, p.slug
        );
    }
}

/// Print a policy record with its evidence and claims.
pub fn print_policy_card(policy: &Policy, evidence: &[Evidence], claims: &[PolicyClaim]) {
    println!("=== {} ===", policy.name);
    if let Some(hook) = &policy.concept_hook {
        println!("{hook}");
    }
    println!();

    print_section(
        "Identity",
        &[
            ("slug", Some(policy.slug.clone())),
            ("category", Some(policy.category.clone())),
            ("source_country", Some(policy.source_country.clone())),
            ("source_url", Some(policy.original_source_url.clone())),
            ("source_title", policy.original_source_title.clone()),
            ("discovery_context", policy.discovery_context.clone()),
            ("run_id", policy.run_id.map(|id| id.to_string())),
        ],
    );
    print_section(
        "Assessment",
        &[
            ("status", Some(policy.status.to_string())),
            ("vetting_status", Some(policy.vetting_status.to_string())),
            ("success_score", policy.success_score.map(score)),
            ("criticism_score", policy.criticism_score.map(score)),
            ("domestic_status", Some(policy.domestic_status.to_string())),
            ("domestic_notes", policy.domestic_notes.clone()),
            (
                "opportunity_value",
                policy.opportunity_value.map(|v| v.to_string()),
            ),
        ],
    );
    print_section(
        "Report",
        &[
            ("case_study", policy.case_study_summary.as_deref().map(clip)),
            ("gap_statement", policy.gap_statement.as_deref().map(clip)),
            ("pilot_proposal", policy.pilot_proposal.as_deref().map(clip)),
        ],
    );
    if let Some(ra) = &policy.risk_assessment {
        let rows: Vec<(String, Option<String>)> = ra
            .risks
            .iter()
            .map(|r| {
                let mitigation = ra
                    .mitigations
                    .iter()
                    .find(|m| m.risk == r.risk)
                    .map(|m| format!(" -> {}", m.mitigation))
                    .unwrap_or_default();
                (
                    r.risk.to_lowercase(),
                    Some(format!(
                        "severity {}, likelihood {}{}",
                        r.severity, r.likelihood, mitigation
                    )),
                )
            })
            .collect();
        let rows: Vec<Row> = rows.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        print_section("Risks", &rows);
    }

    print_evidence(evidence);
    print_claims(claims, evidence);
    print_section(
        "Timestamps",
        &[
            ("created_at", Some(timestamp(policy.created_at))),
            ("updated_at", Some(timestamp(policy.updated_at))),
        ],
    );
}

pub fn print_events(events: &[ActivityEvent]) {
    if events.is_empty() {
        return;
    }
    println!("Events");
    for e in events {
        let mut line = format!(
            "  {} {:<18} {:<18}",
            e.timestamp.format("%H:%M:%S%.3f"),
            e.phase,
            e.event_type
        );
        for part in [&e.target_country, &e.item_name, &e.rejection_reason]
            .into_iter()
            .flatten()
        {
            line.push(' ');
            line.push_str(part);
        }
        if let Some(query) = &e.query_text {
            line.push_str(&format!(" \"{}\"", clip(query)));
        }
        if let Some(msg) = e.error_message() {
            line.push_str(&format!(" error: {msg}"));
        }
        println!("{line}");
    }
    println!();
}

// ── Section rendering ──

fn print_section(header: &str, rows: &[Row]) {
    if rows.iter().all(|(_, v)| v.is_none()) {
        return;
    }
    println!("{header}");
    for (name, value) in rows {
        if let Some(value) = value {
            println!("  {:<26} {}", name, value);
        }
    }
    println!();
}

fn print_evidence(evidence: &[Evidence]) {
    if evidence.is_empty() {
        return;
    }
    println!("Evidence ({})", evidence.len());
    for (i, e) in evidence.iter().take(MAX_LIST_ITEMS).enumerate() {
        let domestic = if e.is_domestic_source { " domestic" } else { "" };
        println!(
            "  [{}] {} {}{}",
            i + 1,
            e.evidence_type,
            e.source_type,
            domestic
        );
        println!("      {}", clip(&e.claim));
        println!("      {}", e.url);
    }
    if evidence.len() > MAX_LIST_ITEMS {
        println!("  ... and {} more", evidence.len() - MAX_LIST_ITEMS);
    }
    println!();
}

fn print_claims(claims: &[PolicyClaim], evidence: &[Evidence]) {
    if claims.is_empty() {
        return;
    }
    println!("Claims");
    for c in claims {
        let cites: Vec<String> = c
            .evidence_ids
            .iter()
            .filter_map(|id| evidence.iter().position(|e| e.id == *id))
            .map(|i| format!("[{}]", i + 1))
            .collect();
        println!("  {:<26} {} {}", c.claim_type, clip(&c.claim_text), cites.join(""));
    }
    println!();
}

// ── Formatting ──

fn joined(items: &[String]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let mut out = items
        .iter()
        .take(MAX_LIST_ITEMS)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > MAX_LIST_ITEMS {
        out.push_str(&format!(" (+{} more)", items.len() - MAX_LIST_ITEMS));
    }
    Some(out)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.trim().is_empty()).then(|| s.to_string())
}

fn score(v: f64) -> String {
    format!("{v:.2}")
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// First line of `text`, cut to a terminal-friendly width.
fn clip(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.chars().count() <= MAX_TEXT_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(MAX_TEXT_CHARS - 3).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_takes_first_line_and_truncates() {
        assert_eq!(clip("\n  Short hook.\nSecond line"), "Short hook.");
        let long = "é".repeat(200);
        let c = clip(&long);
        assert_eq!(c.chars().count(), MAX_TEXT_CHARS);
        assert!(c.ends_with("..."));
    }

    #[test]
    fn joined_caps_long_lists() {
        assert_eq!(joined(&[]), None);
        let items: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        let s = joined(&items).unwrap();
        assert!(s.starts_with("0, 1, 2"));
        assert!(s.ends_with("(+2 more)"));
    }
}
