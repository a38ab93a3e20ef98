use std::time::Duration;
use tracing::{info, warn};

use super::generation::clean_model_sql;
use super::prompts::build_repair_prompt;
use super::types::{AgentError, CandidateOrigin, SqlCandidate};
use crate::core::llm::LlmManager;

/// Ask the model to correct `original` given the error it produced.
///
/// The result is an untrusted candidate and must go back through
/// [`super::execute`].
pub async fn repair_sql(
    llm: &LlmManager,
    original: &SqlCandidate,
    failure: &AgentError,
    model_timeout: Duration,
) -> SqlCandidate {
    let prompt = build_repair_prompt(&original.text, &failure.to_string());
    let raw = match tokio::time::timeout(model_timeout, llm.complete(&prompt)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!("SQL repair failed: {}", e);
            String::new()
        }
        Err(_) => {
            warn!("SQL repair timed out after {:?}", model_timeout);
            String::new()
        }
    };
    let candidate = SqlCandidate::new(&clean_model_sql(&raw), CandidateOrigin::Repaired);
    info!("Repaired SQL candidate: {:?}", candidate.text);
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::scripted::{ScriptStep, ScriptedProvider};

    fn manager(provider: ScriptedProvider) -> LlmManager {
        let mut m = LlmManager::new();
        m.register_provider(Box::new(provider));
        m.set_active("scripted", "test");
        m
    }

    #[tokio::test]
    async fn repair_prompt_carries_sql_and_error() {
        let provider = ScriptedProvider::new(["SELECT title FROM movies;"]);
        let log = provider.log();
        let original = SqlCandidate::new("SELECT titel FROM movies", CandidateOrigin::Generated);
        let failure = AgentError::Store("no such column: titel".to_string());

        let fixed = repair_sql(&manager(provider), &original, &failure, Duration::from_secs(5)).await;
        assert_eq!(fixed.text, "SELECT title FROM movies");
        assert_eq!(fixed.origin, CandidateOrigin::Repaired);

        let calls = log.lock().unwrap();
        let user = calls[0].iter().find(|m| m.role == "user").unwrap();
        assert!(user.content.contains("Original SQL: SELECT titel FROM movies"));
        assert!(user.content.contains("Error: no such column: titel"));
    }

    #[tokio::test]
    async fn failed_repair_is_an_empty_candidate() {
        let provider = ScriptedProvider::from_steps([ScriptStep::Fail("503".to_string())]);
        let original = SqlCandidate::new("SELECT 1", CandidateOrigin::Generated);
        let fixed = repair_sql(
            &manager(provider),
            &original,
            &AgentError::EmptyCandidate,
            Duration::from_secs(5),
        )
        .await;
        assert!(fixed.is_empty());
        assert_eq!(fixed.origin, CandidateOrigin::Repaired);
    }
}
