use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

use super::prompts::build_generation_prompt;
use super::types::{CandidateOrigin, SchemaSnapshot, SqlCandidate};
use crate::core::llm::{LlmManager, ResponseSchema};

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("think-block regex"));
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]*\n)?\s*(.*?)```").expect("code-fence regex")
});

/// Remove `<think>` reasoning blocks some models prepend to every reply.
pub fn strip_reasoning(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

/// Reduce a model reply to the bare SQL it contains.
pub fn clean_model_sql(text: &str) -> String {
    let text = strip_reasoning(text);
    let text = match CODE_FENCE.captures(&text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string(),
        None => text,
    };
    let text = text.trim();
    let text = text.strip_prefix("SQLQuery:").unwrap_or(text);
    text.trim().to_string()
}

fn query_field(value: &Value) -> Option<&str> {
    value
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
}

/// Ask the model for one SQL statement answering `question`.
///
/// Model errors, timeouts and empty output all produce an empty candidate;
/// the execution step reports that as a failure.
pub async fn generate_sql(
    llm: &LlmManager,
    question: &str,
    schema: &SchemaSnapshot,
    model_timeout: Duration,
) -> SqlCandidate {
    let prompt = build_generation_prompt(schema, question);
    let response_schema = ResponseSchema::sql_query();

    let structured =
        tokio::time::timeout(model_timeout, llm.complete_structured(&prompt, &response_schema))
            .await;
    let raw = match structured {
        Ok(Ok(value)) => match query_field(&value) {
            Some(query) => Some(query.to_string()),
            None => {
                warn!("Structured SQL generation returned no query field, falling back");
                None
            }
        },
        Ok(Err(e)) => {
            warn!("Structured SQL generation failed, falling back: {}", e);
            None
        }
        Err(_) => {
            warn!("Structured SQL generation timed out after {:?}", model_timeout);
            None
        }
    };

    let raw = match raw {
        Some(raw) => raw,
        None => match tokio::time::timeout(model_timeout, llm.complete(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("SQL generation failed: {}", e);
                String::new()
            }
            Err(_) => {
                warn!("SQL generation timed out after {:?}", model_timeout);
                String::new()
            }
        },
    };

    let candidate = SqlCandidate::new(&clean_model_sql(&raw), CandidateOrigin::Generated);
    info!("Generated SQL candidate: {:?}", candidate.text);
    candidate
}
