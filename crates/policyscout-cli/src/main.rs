//! `policyscout`: research foreign innovation policies and report the ones
//! worth piloting at home.

mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use policyscout_core::{
    DomesticStatus, OpportunityValue, PipelineConfig, Policy, PolicyStatus, RunStatus,
};
use policyscout_pipeline::{HuntStrategy, Pipeline, PipelineResult};
use policyscout_search::{MemoryCache, PerplexityBackend, SearchClient, SearchConfig};
use policyscout_store::{MemoryStore, PolicyFilter, RecordStore};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "policyscout", version, about = "Innovation policy research pipeline")]
struct Cli {
    /// DuckDB database file. Runs are kept in memory when omitted.
    #[arg(long, global = true, env = "POLICYSCOUT_DB")]
    db: Option<PathBuf>,

    /// Research service API key
    #[arg(long, global = true, env = "PERPLEXITY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, global = true, env = "POLICYSCOUT_API_URL")]
    api_url: Option<String>,

    #[arg(long, global = true, env = "POLICYSCOUT_MODEL")]
    model: Option<String>,

    /// JSON settings file: pipeline settings plus an optional "search" object
    #[arg(long, global = true, env = "POLICYSCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Print JSON instead of cards
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interpret a free-text policy idea
    Interpret { idea: String },
    /// Research peer countries for a policy idea, topic, or problem
    Research {
        #[arg(required = true)]
        countries: Vec<String>,
        /// Free-text policy idea, interpreted before the run
        #[arg(long, conflicts_with_all = ["topic", "problem"])]
        idea: Option<String>,
        #[arg(long, conflicts_with = "problem")]
        topic: Option<String>,
        /// Problem statement to find programs addressing
        #[arg(long)]
        problem: Option<String>,
    },
    /// Explore globally without a country list
    Discover,
    /// Re-run a stored interpretation against other countries
    Clone {
        run_id: Uuid,
        #[arg(required = true)]
        countries: Vec<String>,
    },
    /// Recent runs, newest first
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// One run with its summary
    Run {
        id: Uuid,
        /// Also list the activity events
        #[arg(long)]
        events: bool,
    },
    /// List stored policies
    Policies {
        #[arg(long)]
        status: Option<PolicyStatus>,
        #[arg(long)]
        domestic_status: Option<DomesticStatus>,
        #[arg(long)]
        opportunity: Option<OpportunityValue>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        /// Active high-value policies only
        #[arg(long, conflicts_with_all = ["status", "opportunity"])]
        top: bool,
    },
    /// One policy by id or slug, with evidence and claims
    Policy { key: String },
}

/// Contents of the settings file.
#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(flatten)]
    pipeline: PipelineConfig,
    #[serde(default)]
    search: SearchConfig,
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid settings in {}", path.display()))
}

fn open_store(db: Option<&Path>) -> Result<Arc<dyn RecordStore>> {
    match db {
        #[cfg(feature = "duckdb")]
        Some(path) => {
            let store = policyscout_store::DuckStore::open_persistent(path)
                .with_context(|| format!("failed to open database {}", path.display()))?;
            info!(path = %path.display(), "opened DuckDB store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "duckdb"))]
        Some(path) => bail!(
            "cannot open {}: built without the duckdb feature",
            path.display()
        ),
        None => {
            info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn search_client(cli: &Cli, mut config: SearchConfig) -> Result<SearchClient> {
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    let backend = PerplexityBackend::new(&config, cli.api_key.clone().unwrap_or_default())
        .context("set PERPLEXITY_API_KEY or pass --api-key")?;
    let cache = MemoryCache::new(config.cache_capacity);
    Ok(SearchClient::new(Arc::new(backend), config).with_cache(Arc::new(cache)))
}

/// Cancel every running run on Ctrl-C. The orchestrator stops at the next
/// phase boundary.
fn cancel_on_ctrl_c(pipeline: &Pipeline) {
    let registry = pipeline.cancel_registry();
    let store = pipeline.store().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("interrupt received, cancelling running runs");
        match store.recent_runs(50).await {
            Ok(runs) => runs
                .iter()
                .filter(|r| r.status == RunStatus::Running)
                .for_each(|r| registry.cancel(r.id)),
            Err(e) => warn!(error = %e, "could not list runs to cancel"),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = load_settings(cli.config.as_deref())?;
    let store = open_store(cli.db.as_deref())?;

    match &cli.command {
        Command::Interpret { .. }
        | Command::Research { .. }
        | Command::Discover
        | Command::Clone { .. } => {
            if !matches!(cli.command, Command::Interpret { .. }) {
                ensure_idle(store.as_ref()).await?;
            }
            let search = search_client(&cli, settings.search)?;
            let pipeline = Pipeline::new(store, Arc::new(search), settings.pipeline);
            run_pipeline(&cli, &pipeline).await
        }
        _ => read(&cli, store.as_ref()).await,
    }
}

/// Refuse to start a run while another is still `running`.
async fn ensure_idle(store: &dyn RecordStore) -> Result<()> {
    if let Some(active) = store.active_run().await? {
        bail!(
            "run {} is still running (started {})",
            active.id,
            active
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "at an unknown time".into())
        );
    }
    Ok(())
}

async fn run_pipeline(cli: &Cli, pipeline: &Pipeline) -> Result<()> {
    let result = match &cli.command {
        Command::Interpret { idea } => {
            let interpretation = pipeline.interpret(idea).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&interpretation)?);
            } else {
                display::print_interpretation(&interpretation);
            }
            return Ok(());
        }
        Command::Research {
            countries,
            idea,
            topic,
            problem,
        } => {
            let strategy = match (idea, topic, problem) {
                (Some(idea), _, _) => HuntStrategy::Interpretation(pipeline.interpret(idea).await?),
                (_, Some(topic), _) => HuntStrategy::Topic(topic.clone()),
                (_, _, Some(problem)) => HuntStrategy::Reverse(problem.clone()),
                _ => HuntStrategy::Broad,
            };
            cancel_on_ctrl_c(pipeline);
            pipeline.run_research(countries, strategy).await?
        }
        Command::Discover => {
            cancel_on_ctrl_c(pipeline);
            pipeline.run_discovery().await?
        }
        Command::Clone { run_id, countries } => {
            cancel_on_ctrl_c(pipeline);
            pipeline.clone_run(*run_id, countries).await?
        }
        _ => unreachable!("read-only commands are handled without a pipeline"),
    };
    report(cli, &result)
}

fn report(cli: &Cli, result: &PipelineResult) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        display::print_run(&result.run);
        display::print_policy_rows(&result.policies);
    }
    match (&result.error, result.run.status) {
        (_, RunStatus::Cancelled) => {
            info!(run_id = %result.run.id, "run cancelled");
            Ok(())
        }
        (Some(e), _) if !result.success => bail!("run {} failed: {e}", result.run.id),
        _ => Ok(()),
    }
}

async fn read(cli: &Cli, store: &dyn RecordStore) -> Result<()> {
    match &cli.command {
        Command::Runs { limit } => {
            let runs = store.recent_runs(*limit).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                display::print_run_rows(&runs);
            }
        }
        Command::Run { id, events } => {
            let run = store
                .get_run(*id)
                .await?
                .with_context(|| format!("run {id} not found"))?;
            let activity = if *events {
                store.run_activities(*id).await?
            } else {
                Vec::new()
            };
            if cli.json {
                let value = serde_json::json!({ "run": run, "events": activity });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                display::print_run(&run);
                display::print_events(&activity);
            }
        }
        Command::Policies {
            status,
            domestic_status,
            opportunity,
            country,
            limit,
            top,
        } => {
            let policies = if *top {
                store.top_opportunities(limit.unwrap_or(3)).await?
            } else {
                store
                    .list_policies(&PolicyFilter {
                        status: *status,
                        domestic_status: *domestic_status,
                        opportunity_value: *opportunity,
                        source_country: country.clone(),
                        limit: *limit,
                    })
                    .await?
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&policies)?);
            } else {
                display::print_policy_rows(&policies);
            }
        }
        Command::Policy { key } => {
            let policy = find_policy(store, key)
                .await?
                .with_context(|| format!("policy {key} not found"))?;
            let evidence = store.evidence_for_policy(policy.id).await?;
            let claims = store.claims_for_policy(policy.id).await?;
            if cli.json {
                let value = serde_json::json!({
                    "policy": policy,
                    "evidence": evidence,
                    "claims": claims,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                display::print_policy_card(&policy, &evidence, &claims);
            }
        }
        _ => unreachable!("pipeline commands are handled by run_pipeline"),
    }
    Ok(())
}

async fn find_policy(store: &dyn RecordStore, key: &str) -> Result<Option<Policy>> {
    if let Ok(id) = key.parse::<Uuid>() {
        return Ok(store.get_policy(id).await?);
    }
    Ok(store.get_policy_by_slug(key).await?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use policyscout_core::{NewRun, RunType};

    use super::*;

    #[test]
    fn research_flags_conflict() {
        let ok = Cli::try_parse_from(["policyscout", "research", "Estonia", "--topic", "visas"]);
        assert!(ok.is_ok());
        let clash = Cli::try_parse_from([
            "policyscout",
            "research",
            "Estonia",
            "--idea",
            "startup visas",
            "--topic",
            "visas",
        ]);
        assert!(clash.is_err());
        assert!(Cli::try_parse_from(["policyscout", "research"]).is_err());
    }

    #[test]
    fn policy_filters_parse_wire_names() {
        let cli = Cli::try_parse_from([
            "policyscout",
            "policies",
            "--domestic-status",
            "discussed_rejected",
            "--opportunity",
            "high",
        ])
        .unwrap();
        let Command::Policies {
            domestic_status,
            opportunity,
            ..
        } = cli.command
        else {
            panic!("expected policies");
        };
        assert_eq!(domestic_status, Some(DomesticStatus::DiscussedRejected));
        assert_eq!(opportunity, Some(OpportunityValue::High));
    }

    #[test]
    fn settings_file_is_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"batch_size": 5, "domestic": {{"country": "Portugal"}}, "search": {{"model": "sonar"}}}}"#
        )
        .unwrap();
        let settings = load_settings(Some(file.path())).unwrap();
        assert_eq!(settings.pipeline.batch_size, 5);
        assert_eq!(settings.pipeline.batch_pause_ms, 200);
        assert_eq!(settings.pipeline.domestic.country, "Portugal");
        assert_eq!(settings.search.model, "sonar");
        assert_eq!(settings.search.max_attempts, 3);
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/policyscout.json"))).unwrap_err();
        assert!(err.to_string().contains("failed to read settings"));
        assert_eq!(load_settings(None).unwrap().pipeline, PipelineConfig::default());
    }

    #[tokio::test]
    async fn new_runs_wait_for_the_active_one() {
        let store = MemoryStore::new();
        ensure_idle(&store).await.unwrap();

        let run = store
            .create_run(NewRun {
                run_type: RunType::Manual,
                countries: vec!["Estonia".into()],
                search_mode: None,
                search_query: None,
                interpretation: None,
            })
            .await
            .unwrap();
        let err = ensure_idle(&store).await.unwrap_err();
        assert!(err.to_string().contains(&run.id.to_string()));

        store
            .set_run_status(run.id, RunStatus::Completed, None)
            .await
            .unwrap();
        ensure_idle(&store).await.unwrap();
    }

    #[tokio::test]
    async fn policy_lookup_by_slug_or_id() {
        let store = MemoryStore::new();
        assert!(find_policy(&store, "startup-visa").await.unwrap().is_none());
        assert!(
            find_policy(&store, &Uuid::new_v4().to_string())
                .await
                .unwrap()
                .is_none()
        );
    }
}
