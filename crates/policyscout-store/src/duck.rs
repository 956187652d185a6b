//! DuckDB record store.
//!
//! Timestamps are stored as RFC 3339 strings with microsecond precision so
//! that lexicographic `ORDER BY` matches chronological order. Nested values
//! (interpretation, activity summary, risk assessment, metadata) are stored
//! as JSON text.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{Connection, Row, params, params_from_iter};
use policyscout_core::{
    ActivityEvent, ActivitySummary, Evidence, NewPolicy, NewPolicyClaim, NewRun, Phase, Policy,
    PolicyClaim, Run, RunStatus, slugify, unique_slug,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{PolicyFilter, RecordStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id                VARCHAR PRIMARY KEY,
    run_type          VARCHAR NOT NULL,
    status            VARCHAR NOT NULL,
    phase             VARCHAR,
    countries         VARCHAR NOT NULL,
    search_mode       VARCHAR,
    search_query      VARCHAR,
    interpretation    VARCHAR,
    started_at        VARCHAR,
    completed_at      VARCHAR,
    policies_found    BIGINT  NOT NULL DEFAULT 0,
    high_value_count  BIGINT  NOT NULL DEFAULT 0,
    error_message     VARCHAR,
    activity_summary  VARCHAR,
    created_at        VARCHAR NOT NULL,
    updated_at        VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS policies (
    id                    VARCHAR PRIMARY KEY,
    run_id                VARCHAR,
    name                  VARCHAR NOT NULL,
    slug                  VARCHAR NOT NULL UNIQUE,
    category              VARCHAR NOT NULL,
    source_country        VARCHAR NOT NULL,
    original_source_url   VARCHAR NOT NULL,
    original_source_title VARCHAR,
    discovery_context     VARCHAR,
    vetting_status        VARCHAR NOT NULL,
    success_score         DOUBLE,
    criticism_score       DOUBLE,
    domestic_status       VARCHAR NOT NULL,
    domestic_notes        VARCHAR,
    opportunity_value     VARCHAR,
    concept_hook          VARCHAR,
    case_study_summary    VARCHAR,
    gap_statement         VARCHAR,
    pilot_proposal        VARCHAR,
    risk_assessment       VARCHAR,
    status                VARCHAR NOT NULL,
    created_at            VARCHAR NOT NULL,
    updated_at            VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS evidence (
    id                 VARCHAR PRIMARY KEY,
    policy_id          VARCHAR NOT NULL REFERENCES policies(id),
    position           BIGINT  NOT NULL,
    url                VARCHAR NOT NULL CHECK (length(trim(url)) > 0),
    title              VARCHAR,
    publisher          VARCHAR,
    retrieved_at       VARCHAR,
    source_type        VARCHAR NOT NULL,
    publication_date   VARCHAR,
    evidence_type      VARCHAR NOT NULL,
    claim              VARCHAR NOT NULL CHECK (length(claim) <= 500),
    excerpt            VARCHAR,
    sentiment          VARCHAR,
    confidence         DOUBLE  CHECK (confidence IS NULL OR (confidence >= 0 AND confidence <= 1)),
    is_domestic_source BOOLEAN NOT NULL,
    domestic_domain    VARCHAR,
    created_at         VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS policy_claims (
    id           VARCHAR PRIMARY KEY,
    policy_id    VARCHAR NOT NULL REFERENCES policies(id),
    claim_type   VARCHAR NOT NULL,
    claim_text   VARCHAR NOT NULL,
    evidence_ids VARCHAR NOT NULL,
    created_at   VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS run_activities (
    id                   VARCHAR PRIMARY KEY,
    run_id               VARCHAR NOT NULL,
    seq                  BIGINT  NOT NULL,
    phase                VARCHAR NOT NULL,
    event_type           VARCHAR NOT NULL,
    event_ts             VARCHAR NOT NULL,
    query_text           VARCHAR,
    target_country       VARCHAR,
    item_name            VARCHAR,
    item_count           BIGINT,
    rejection_reason     VARCHAR,
    api_call_duration_ms BIGINT,
    tokens_used          BIGINT,
    cache_hit            BOOLEAN NOT NULL,
    metadata             VARCHAR
);
";

const RUN_COLUMNS: &str = "id, run_type, status, phase, countries, search_mode, search_query, \
    interpretation, started_at, completed_at, policies_found, high_value_count, error_message, \
    activity_summary, created_at, updated_at";

const POLICY_COLUMNS: &str = "id, run_id, name, slug, category, source_country, \
    original_source_url, original_source_title, discovery_context, vetting_status, \
    success_score, criticism_score, domestic_status, domestic_notes, opportunity_value, \
    concept_hook, case_study_summary, gap_statement, pilot_proposal, risk_assessment, status, \
    created_at, updated_at";

const EVIDENCE_COLUMNS: &str = "id, policy_id, url, title, publisher, retrieved_at, source_type, \
    publication_date, evidence_type, claim, excerpt, sentiment, confidence, is_domestic_source, \
    domestic_domain, created_at";

const ACTIVITY_COLUMNS: &str = "id, run_id, phase, event_type, event_ts, query_text, \
    target_country, item_name, item_count, rejection_reason, api_call_duration_ms, tokens_used, \
    cache_hit, metadata";

/// DuckDB-backed [`RecordStore`].
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// The schema is created on open and is idempotent, so reopening an existing
/// file keeps its runs and policies.
pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "opened policy database");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Counts ──

    /// Number of rows in the `policies` table.
    pub fn policy_count(&self) -> Result<usize, StoreError> {
        self.count_table("policies")
    }

    /// Number of rows in the `evidence` table.
    pub fn evidence_count(&self) -> Result<usize, StoreError> {
        self.count_table("evidence")
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT FROM {table}");
        let n: i64 = self.lock().query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn update_run(&self, id: Uuid, set: &str, values: Vec<Option<String>>) -> Result<(), StoreError> {
        let sql = format!("UPDATE runs SET {set}, updated_at = ? WHERE id = ?");
        let mut values = values;
        values.push(Some(ts(Utc::now())));
        values.push(Some(id.to_string()));
        let changed = self.lock().execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Err(StoreError::run_not_found(id));
        }
        Ok(())
    }

    fn query_runs(&self, where_clause: &str, args: Vec<String>) -> Result<Vec<Run>, StoreError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs {where_clause}");
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), RunRow::read)?;
        rows.map(|r| Run::try_from(r?)).collect()
    }

    fn query_policies(
        &self,
        where_clause: &str,
        args: Vec<String>,
    ) -> Result<Vec<Policy>, StoreError> {
        let sql = format!("SELECT {POLICY_COLUMNS} FROM policies {where_clause}");
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), PolicyRow::read)?;
        rows.map(|r| Policy::try_from(r?)).collect()
    }
}

#[async_trait]
impl RecordStore for DuckStore {
    async fn create_run(&self, new: NewRun) -> Result<Run, StoreError> {
        let run = Run::start(new, Utc::now());
        self.lock().execute(
            &format!(
                "INSERT INTO runs ({RUN_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                run.id.to_string(),
                run.run_type.as_str(),
                run.status.as_str(),
                run.phase.map(|p| p.as_str().to_string()),
                serde_json::to_string(&run.countries)?,
                run.search_mode.map(|m| m.as_str().to_string()),
                run.search_query.clone(),
                run.interpretation.as_ref().map(serde_json::to_string).transpose()?,
                run.started_at.map(ts),
                run.completed_at.map(ts),
                i64::from(run.policies_found),
                i64::from(run.high_value_count),
                run.error_message.clone(),
                Option::<String>::None,
                ts(run.created_at),
                ts(run.updated_at),
            ],
        )?;
        debug!(run_id = %run.id, "created run");
        Ok(run)
    }

    async fn update_run_phase(&self, id: Uuid, phase: Phase) -> Result<(), StoreError> {
        self.update_run(id, "phase = ?", vec![Some(phase.as_str().to_string())])
    }

    async fn set_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let current = self
            .get_run(id)
            .await?
            .ok_or_else(|| StoreError::run_not_found(id))?;
        if current.status.is_terminal() {
            return Err(StoreError::RunFinished(id));
        }
        let completed_at = status.is_terminal().then(|| ts(Utc::now()));
        self.update_run(
            id,
            "status = ?, completed_at = coalesce(?, completed_at), \
             error_message = coalesce(?, error_message)",
            vec![
                Some(status.as_str().to_string()),
                completed_at,
                error_message.map(str::to_string),
            ],
        )
    }

    async fn update_run_counts(
        &self,
        id: Uuid,
        policies_found: u32,
        high_value_count: u32,
    ) -> Result<(), StoreError> {
        self.update_run(
            id,
            "policies_found = CAST(? AS BIGINT), high_value_count = CAST(? AS BIGINT)",
            vec![
                Some(policies_found.to_string()),
                Some(high_value_count.to_string()),
            ],
        )
    }

    async fn update_run_summary(
        &self,
        id: Uuid,
        summary: &ActivitySummary,
    ) -> Result<(), StoreError> {
        self.update_run(
            id,
            "activity_summary = ?",
            vec![Some(serde_json::to_string(summary)?)],
        )
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>, StoreError> {
        Ok(self
            .query_runs("WHERE id = ?", vec![id.to_string()])?
            .into_iter()
            .next())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<Run>, StoreError> {
        self.query_runs(&format!("ORDER BY created_at DESC LIMIT {limit}"), vec![])
    }

    async fn active_run(&self) -> Result<Option<Run>, StoreError> {
        Ok(self
            .query_runs(
                "WHERE status = ? ORDER BY created_at DESC LIMIT 1",
                vec![RunStatus::Running.as_str().to_string()],
            )?
            .into_iter()
            .next())
    }

    async fn create_policy_with_evidence(
        &self,
        policy: NewPolicy,
        evidence: Vec<Evidence>,
        claims: Vec<NewPolicyClaim>,
    ) -> Result<Policy, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let base = slugify(&policy.name);
        let taken: HashSet<String> = {
            let mut stmt =
                tx.prepare("SELECT slug FROM policies WHERE slug = ? OR starts_with(slug, ?)")?;
            let rows = stmt.query_map(params![base.clone(), format!("{base}-")], |row| {
                row.get::<_, String>(0)
            })?;
            rows.collect::<Result<_, _>>()?
        };
        let now = Utc::now();
        let saved = Policy::from_new(policy, unique_slug(&base, |s| taken.contains(s)), now);

        tx.execute(
            &format!(
                "INSERT INTO policies ({POLICY_COLUMNS}) VALUES \
                 (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                saved.id.to_string(),
                saved.run_id.map(|id| id.to_string()),
                saved.name.clone(),
                saved.slug.clone(),
                saved.category.clone(),
                saved.source_country.clone(),
                saved.original_source_url.clone(),
                saved.original_source_title.clone(),
                saved.discovery_context.clone(),
                saved.vetting_status.as_str(),
                saved.success_score,
                saved.criticism_score,
                saved.domestic_status.as_str(),
                saved.domestic_notes.clone(),
                saved.opportunity_value.map(|v| v.as_str().to_string()),
                saved.concept_hook.clone(),
                saved.case_study_summary.clone(),
                saved.gap_statement.clone(),
                saved.pilot_proposal.clone(),
                saved.risk_assessment.as_ref().map(serde_json::to_string).transpose()?,
                saved.status.as_str(),
                ts(saved.created_at),
                ts(saved.updated_at),
            ],
        )?;

        let mut evidence_ids = Vec::with_capacity(evidence.len());
        for (position, e) in evidence.iter().enumerate() {
            tx.execute(
                &format!(
                    "INSERT INTO evidence ({EVIDENCE_COLUMNS}, position) VALUES \
                     (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    e.id.to_string(),
                    saved.id.to_string(),
                    e.url.clone(),
                    e.title.clone(),
                    e.publisher.clone(),
                    e.retrieved_at.map(ts),
                    e.source_type.as_str(),
                    e.publication_date.clone(),
                    e.evidence_type.as_str(),
                    e.claim.clone(),
                    e.excerpt.clone(),
                    e.sentiment.map(|s| s.as_str().to_string()),
                    e.confidence,
                    e.is_domestic_source,
                    e.domestic_domain.clone(),
                    ts(e.created_at),
                    i64::try_from(position).unwrap_or(i64::MAX),
                ],
            )?;
            evidence_ids.push(e.id);
        }

        for claim in &claims {
            let mut cited = Vec::with_capacity(claim.evidence_indexes.len());
            for &index in &claim.evidence_indexes {
                let id = evidence_ids.get(index).ok_or(StoreError::ClaimIndex {
                    index,
                    count: evidence_ids.len(),
                })?;
                cited.push(*id);
            }
            tx.execute(
                "INSERT INTO policy_claims \
                 (id, policy_id, claim_type, claim_text, evidence_ids, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    Uuid::new_v4().to_string(),
                    saved.id.to_string(),
                    claim.claim_type.as_str(),
                    claim.claim_text.clone(),
                    serde_json::to_string(&cited)?,
                    ts(now),
                ],
            )?;
        }

        tx.commit()?;
        debug!(slug = %saved.slug, evidence = evidence.len(), claims = claims.len(), "stored policy");
        Ok(saved)
    }

    async fn get_policy(&self, id: Uuid) -> Result<Option<Policy>, StoreError> {
        Ok(self
            .query_policies("WHERE id = ?", vec![id.to_string()])?
            .into_iter()
            .next())
    }

    async fn get_policy_by_slug(&self, slug: &str) -> Result<Option<Policy>, StoreError> {
        Ok(self
            .query_policies("WHERE slug = ?", vec![slug.to_string()])?
            .into_iter()
            .next())
    }

    async fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, StoreError> {
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        if let Some(s) = filter.status {
            clauses.push("status = ?");
            args.push(s.as_str().to_string());
        }
        if let Some(s) = filter.domestic_status {
            clauses.push("domestic_status = ?");
            args.push(s.as_str().to_string());
        }
        if let Some(v) = filter.opportunity_value {
            clauses.push("opportunity_value = ?");
            args.push(v.as_str().to_string());
        }
        if let Some(c) = &filter.source_country {
            clauses.push("source_country = ?");
            args.push(c.clone());
        }

        let mut sql = String::new();
        if !clauses.is_empty() {
            sql.push_str("WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(n) = filter.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        self.query_policies(&sql, args)
    }

    async fn evidence_for_policy(&self, policy_id: Uuid) -> Result<Vec<Evidence>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE policy_id = ? ORDER BY position"
        ))?;
        let rows = stmt.query_map(params![policy_id.to_string()], EvidenceRow::read)?;
        rows.map(|r| Evidence::try_from(r?)).collect()
    }

    async fn claims_for_policy(&self, policy_id: Uuid) -> Result<Vec<PolicyClaim>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, policy_id, claim_type, claim_text, evidence_ids, created_at \
             FROM policy_claims WHERE policy_id = ? ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![policy_id.to_string()], |row| {
            Ok([
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ])
        })?;
        rows.map(|r| {
            let [id, policy_id, claim_type, claim_text, evidence_ids, created_at] = r?;
            Ok(PolicyClaim {
                id: parse_uuid(&id)?,
                policy_id: parse_uuid(&policy_id)?,
                claim_type: claim_type.parse()?,
                claim_text,
                evidence_ids: serde_json::from_str(&evidence_ids)?,
                created_at: parse_ts(&created_at)?,
            })
        })
        .collect()
    }

    async fn insert_activities(&self, events: &[ActivityEvent]) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for (seq, e) in events.iter().enumerate() {
            tx.execute(
                &format!(
                    "INSERT INTO run_activities ({ACTIVITY_COLUMNS}, seq) VALUES \
                     (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    e.id.to_string(),
                    e.run_id.to_string(),
                    e.phase.as_str(),
                    e.event_type.as_str(),
                    ts(e.timestamp),
                    e.query_text.clone(),
                    e.target_country.clone(),
                    e.item_name.clone(),
                    e.item_count.map(i64::from),
                    e.rejection_reason.clone(),
                    e.api_call_duration_ms
                        .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
                    e.tokens_used.map(i64::from),
                    e.cache_hit,
                    e.metadata.as_ref().map(serde_json::to_string).transpose()?,
                    i64::try_from(seq).unwrap_or(i64::MAX),
                ],
            )?;
        }
        tx.commit()?;
        debug!(count = events.len(), "flushed activity events");
        Ok(())
    }

    async fn run_activities(&self, run_id: Uuid) -> Result<Vec<ActivityEvent>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM run_activities WHERE run_id = ? ORDER BY event_ts, seq"
        ))?;
        let rows = stmt.query_map(params![run_id.to_string()], ActivityRow::read)?;
        rows.map(|r| ActivityEvent::try_from(r?)).collect()
    }
}

// ── Row conversion ──

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {s:?}: {e}")))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("uuid {s:?}: {e}")))
}

fn parse_json<T: serde::de::DeserializeOwned>(s: Option<String>) -> Result<Option<T>, StoreError> {
    Ok(s.as_deref().map(serde_json::from_str).transpose()?)
}

fn to_u32(n: i64) -> u32 {
    u32::try_from(n).unwrap_or(0)
}

struct RunRow {
    id: String,
    run_type: String,
    status: String,
    phase: Option<String>,
    countries: String,
    search_mode: Option<String>,
    search_query: Option<String>,
    interpretation: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    policies_found: i64,
    high_value_count: i64,
    error_message: Option<String>,
    activity_summary: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RunRow {
    fn read(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            run_type: row.get(1)?,
            status: row.get(2)?,
            phase: row.get(3)?,
            countries: row.get(4)?,
            search_mode: row.get(5)?,
            search_query: row.get(6)?,
            interpretation: row.get(7)?,
            started_at: row.get(8)?,
            completed_at: row.get(9)?,
            policies_found: row.get(10)?,
            high_value_count: row.get(11)?,
            error_message: row.get(12)?,
            activity_summary: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl TryFrom<RunRow> for Run {
    type Error = StoreError;

    fn try_from(r: RunRow) -> Result<Self, StoreError> {
        Ok(Run {
            id: parse_uuid(&r.id)?,
            run_type: r.run_type.parse()?,
            status: r.status.parse()?,
            phase: r.phase.as_deref().map(str::parse).transpose()?,
            countries: serde_json::from_str(&r.countries)?,
            search_mode: r.search_mode.as_deref().map(str::parse).transpose()?,
            search_query: r.search_query,
            interpretation: parse_json(r.interpretation)?,
            started_at: parse_opt_ts(r.started_at)?,
            completed_at: parse_opt_ts(r.completed_at)?,
            policies_found: to_u32(r.policies_found),
            high_value_count: to_u32(r.high_value_count),
            error_message: r.error_message,
            activity_summary: parse_json(r.activity_summary)?,
            created_at: parse_ts(&r.created_at)?,
            updated_at: parse_ts(&r.updated_at)?,
        })
    }
}

struct PolicyRow {
    id: String,
    run_id: Option<String>,
    name: String,
    slug: String,
    category: String,
    source_country: String,
    original_source_url: String,
    original_source_title: Option<String>,
    discovery_context: Option<String>,
    vetting_status: String,
    success_score: Option<f64>,
    criticism_score: Option<f64>,
    domestic_status: String,
    domestic_notes: Option<String>,
    opportunity_value: Option<String>,
    concept_hook: Option<String>,
    case_study_summary: Option<String>,
    gap_statement: Option<String>,
    pilot_proposal: Option<String>,
    risk_assessment: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl PolicyRow {
    fn read(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            run_id: row.get(1)?,
            name: row.get(2)?,
            slug: row.get(3)?,
            category: row.get(4)?,
            source_country: row.get(5)?,
            original_source_url: row.get(6)?,
            original_source_title: row.get(7)?,
            discovery_context: row.get(8)?,
            vetting_status: row.get(9)?,
            success_score: row.get(10)?,
            criticism_score: row.get(11)?,
            domestic_status: row.get(12)?,
            domestic_notes: row.get(13)?,
            opportunity_value: row.get(14)?,
            concept_hook: row.get(15)?,
            case_study_summary: row.get(16)?,
            gap_statement: row.get(17)?,
            pilot_proposal: row.get(18)?,
            risk_assessment: row.get(19)?,
            status: row.get(20)?,
            created_at: row.get(21)?,
            updated_at: row.get(22)?,
        })
    }
}

impl TryFrom<PolicyRow> for Policy {
    type Error = StoreError;

    fn try_from(r: PolicyRow) -> Result<Self, StoreError> {
        Ok(Policy {
            id: parse_uuid(&r.id)?,
            run_id: r.run_id.as_deref().map(parse_uuid).transpose()?,
            name: r.name,
            slug: r.slug,
            category: r.category,
            source_country: r.source_country,
            original_source_url: r.original_source_url,
            original_source_title: r.original_source_title,
            discovery_context: r.discovery_context,
            vetting_status: r.vetting_status.parse()?,
            success_score: r.success_score,
            criticism_score: r.criticism_score,
            domestic_status: r.domestic_status.parse()?,
            domestic_notes: r.domestic_notes,
            opportunity_value: r.opportunity_value.as_deref().map(str::parse).transpose()?,
            concept_hook: r.concept_hook,
            case_study_summary: r.case_study_summary,
            gap_statement: r.gap_statement,
            pilot_proposal: r.pilot_proposal,
            risk_assessment: parse_json(r.risk_assessment)?,
            status: r.status.parse()?,
            created_at: parse_ts(&r.created_at)?,
            updated_at: parse_ts(&r.updated_at)?,
        })
    }
}

struct EvidenceRow {
    id: String,
    policy_id: String,
    url: String,
    title: Option<String>,
    publisher: Option<String>,
    retrieved_at: Option<String>,
    source_type: String,
    publication_date: Option<String>,
    evidence_type: String,
    claim: String,
    excerpt: Option<String>,
    sentiment: Option<String>,
    confidence: Option<f64>,
    is_domestic_source: bool,
    domestic_domain: Option<String>,
    created_at: String,
}

impl EvidenceRow {
    fn read(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            policy_id: row.get(1)?,
            url: row.get(2)?,
            title: row.get(3)?,
            publisher: row.get(4)?,
            retrieved_at: row.get(5)?,
            source_type: row.get(6)?,
            publication_date: row.get(7)?,
            evidence_type: row.get(8)?,
            claim: row.get(9)?,
            excerpt: row.get(10)?,
            sentiment: row.get(11)?,
            confidence: row.get(12)?,
            is_domestic_source: row.get(13)?,
            domestic_domain: row.get(14)?,
            created_at: row.get(15)?,
        })
    }
}

impl TryFrom<EvidenceRow> for Evidence {
    type Error = StoreError;

    fn try_from(r: EvidenceRow) -> Result<Self, StoreError> {
        Ok(Evidence {
            id: parse_uuid(&r.id)?,
            policy_id: Some(parse_uuid(&r.policy_id)?),
            url: r.url,
            title: r.title,
            publisher: r.publisher,
            retrieved_at: parse_opt_ts(r.retrieved_at)?,
            source_type: r.source_type.parse()?,
            publication_date: r.publication_date,
            evidence_type: r.evidence_type.parse()?,
            claim: r.claim,
            excerpt: r.excerpt,
            sentiment: r.sentiment.as_deref().map(str::parse).transpose()?,
            confidence: r.confidence,
            is_domestic_source: r.is_domestic_source,
            domestic_domain: r.domestic_domain,
            created_at: parse_ts(&r.created_at)?,
        })
    }
}

struct ActivityRow {
    id: String,
    run_id: String,
    phase: String,
    event_type: String,
    event_ts: String,
    query_text: Option<String>,
    target_country: Option<String>,
    item_name: Option<String>,
    item_count: Option<i64>,
    rejection_reason: Option<String>,
    api_call_duration_ms: Option<i64>,
    tokens_used: Option<i64>,
    cache_hit: bool,
    metadata: Option<String>,
}

impl ActivityRow {
    fn read(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            run_id: row.get(1)?,
            phase: row.get(2)?,
            event_type: row.get(3)?,
            event_ts: row.get(4)?,
            query_text: row.get(5)?,
            target_country: row.get(6)?,
            item_name: row.get(7)?,
            item_count: row.get(8)?,
            rejection_reason: row.get(9)?,
            api_call_duration_ms: row.get(10)?,
            tokens_used: row.get(11)?,
            cache_hit: row.get(12)?,
            metadata: row.get(13)?,
        })
    }
}

impl TryFrom<ActivityRow> for ActivityEvent {
    type Error = StoreError;

    fn try_from(r: ActivityRow) -> Result<Self, StoreError> {
        Ok(ActivityEvent {
            id: parse_uuid(&r.id)?,
            run_id: parse_uuid(&r.run_id)?,
            phase: r.phase.parse()?,
            event_type: r.event_type.parse()?,
            timestamp: parse_ts(&r.event_ts)?,
            query_text: r.query_text,
            target_country: r.target_country,
            item_name: r.item_name,
            item_count: r.item_count.map(to_u32),
            rejection_reason: r.rejection_reason,
            api_call_duration_ms: r.api_call_duration_ms.map(|ms| u64::try_from(ms).unwrap_or(0)),
            tokens_used: r.tokens_used.map(to_u32),
            cache_hit: r.cache_hit,
            metadata: parse_json(r.metadata)?,
        })
    }
}
