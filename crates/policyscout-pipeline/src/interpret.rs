//! Turn a free-text policy idea into a structured [`PolicyInterpretation`].

use std::sync::LazyLock;

use policyscout_core::PolicyInterpretation;
use policyscout_search::{SearchClient, SearchRequest};
use regex::Regex;
use tracing::{info, warn};

use crate::error::PipelineError;

const MIN_IDEA_CHARS: usize = 10;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("json object regex"));

const SYSTEM_PROMPT: &str = "You are an innovation policy expert. Identify the established \
    policy the user is describing and return ONLY a JSON object, no other text, with this \
    shape: {\"policyName\": \"canonical name\", \"alsoKnownAs\": [\"other names used in \
    different countries\"], \"category\": \"one of: R&D Incentives, Talent Visa, Startup \
    Support, Innovation Fund, Tax Incentive, Digital Policy\", \"summary\": \"one or two \
    sentences\", \"levers\": {\"targetGroup\": \"who benefits\", \"mechanism\": \"how it \
    works, e.g. tax credit, direct grant\", \"sector\": \"sector or null\", \
    \"intendedOutcome\": \"what it is meant to achieve\"}}";

/// Interpret `idea` with one search call.
///
/// Fails with `InvalidInput` for ideas under 10 characters and with
/// `Interpretation` when the answer holds no parseable JSON object.
pub async fn interpret_policy_idea(
    search: &SearchClient,
    idea: &str,
) -> Result<PolicyInterpretation, PipelineError> {
    let idea = idea.trim();
    if idea.chars().count() < MIN_IDEA_CHARS {
        return Err(PipelineError::InvalidInput(format!(
            "policy idea must be at least {MIN_IDEA_CHARS} characters"
        )));
    }

    let request = SearchRequest::new(format!("Interpret this policy idea: {idea}"))
        .system_prompt(SYSTEM_PROMPT)
        .temperature(0.1)
        .max_tokens(800);
    let response = search.search(request).await?;

    let mut interpretation = parse_interpretation(&response.content)?;
    interpretation.original_input = idea.to_string();
    info!(policy = %interpretation.policy_name, "idea interpreted");
    Ok(interpretation)
}

fn parse_interpretation(content: &str) -> Result<PolicyInterpretation, PipelineError> {
    let Some(m) = JSON_OBJECT.find(content) else {
        warn!("no JSON object in interpretation response");
        return Err(PipelineError::Interpretation(
            "response contained no JSON object".into(),
        ));
    };
    serde_json::from_str(m.as_str()).map_err(|e| {
        warn!(error = %e, "malformed interpretation JSON");
        PipelineError::Interpretation(e.to_string())
    })
}
