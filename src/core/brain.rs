use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{Instrument, info, info_span, warn};

use crate::core::llm::LlmManager;
use crate::core::sql::generation::strip_reasoning;
use crate::core::sql::prompts::{build_answer_prompt, build_apology_prompt};
use crate::core::sql::{
    AgentError, ConversationTurn, QueryResult, SchemaSnapshot, SqlCandidate, TurnRole, execute,
    generate_sql, repair_sql,
};
use crate::core::store::{SqlStore, StoreError};

/// Returned whenever no model-written answer is available.
pub const GENERIC_APOLOGY: &str = "Sorry, I couldn't answer that right now. \
Please try rephrasing your question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Start,
    Generating,
    Executing,
    Repairing,
    Answering,
    Done,
    Aborted,
}

impl AgentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentPhase::Start => "start",
            AgentPhase::Generating => "generating",
            AgentPhase::Executing => "executing",
            AgentPhase::Repairing => "repairing",
            AgentPhase::Answering => "answering",
            AgentPhase::Done => "done",
            AgentPhase::Aborted => "aborted",
        }
    }
}

pub fn can_transition(from: AgentPhase, to: AgentPhase) -> bool {
    use AgentPhase::*;
    matches!(
        (from, to),
        (Start, Generating)
            | (Generating, Executing)
            | (Generating, Aborted)
            | (Executing, Answering)
            | (Executing, Repairing)
            | (Executing, Aborted)
            | (Repairing, Executing)
            | (Answering, Done)
    )
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Repair budget per request; executions are bounded by `max_attempts + 1`.
    pub max_attempts: usize,
    pub max_rows: usize,
    /// Rows shown to the model when writing the answer.
    pub preview_rows: usize,
    pub model_timeout: Duration,
    pub store_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            max_rows: 200,
            preview_rows: 10,
            model_timeout: Duration::from_secs(60),
            store_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub request_id: String,
    pub answer: String,
    pub phase_trace: Vec<AgentPhase>,
    /// Repairs performed.
    pub attempts: usize,
    pub executions: usize,
    pub final_sql: Option<String>,
    pub final_result: Option<QueryResult>,
}

/// Helper to send a JSON SSE event if a stream sender is provided.
async fn emit(tx: &Option<mpsc::Sender<String>>, event: serde_json::Value) {
    if let Some(tx) = tx {
        let _ = tx.send(event.to_string()).await;
    }
}

/// Per-request bookkeeping. Never shared between requests.
struct AgentState {
    phase: AgentPhase,
    trace: Vec<AgentPhase>,
    attempt_count: usize,
    executions: usize,
    last_candidate: Option<SqlCandidate>,
    last_result: Option<QueryResult>,
    stream_tx: Option<mpsc::Sender<String>>,
}

impl AgentState {
    fn new(stream_tx: Option<mpsc::Sender<String>>) -> Self {
        Self {
            phase: AgentPhase::Start,
            trace: vec![AgentPhase::Start],
            attempt_count: 0,
            executions: 0,
            last_candidate: None,
            last_result: None,
            stream_tx,
        }
    }

    async fn advance(&mut self, to: AgentPhase) {
        if !can_transition(self.phase, to) {
            warn!(
                "Illegal phase transition {} -> {}",
                self.phase.as_str(),
                to.as_str()
            );
            debug_assert!(false, "illegal phase transition");
        }
        info!("Agent phase {} -> {}", self.phase.as_str(), to.as_str());
        self.phase = to;
        self.trace.push(to);
        emit(
            &self.stream_tx,
            serde_json::json!({ "type": "phase", "phase": to.as_str() }),
        )
        .await;
    }

    async fn finish(self, request_id: String, answer: String) -> AgentOutcome {
        emit(
            &self.stream_tx,
            serde_json::json!({ "type": "response", "text": answer }),
        )
        .await;
        emit(&self.stream_tx, serde_json::json!({ "type": "done" })).await;
        AgentOutcome {
            request_id,
            answer,
            phase_trace: self.trace,
            attempts: self.attempt_count,
            executions: self.executions,
            final_sql: self.last_candidate.map(|c| c.text),
            final_result: self.last_result,
        }
    }
}

/// The most recent user turn with non-blank text.
pub fn latest_user_question(turns: &[ConversationTurn]) -> Option<&str> {
    turns
        .iter()
        .rev()
        .filter(|t| t.role == TurnRole::User)
        .map(|t| t.text.trim())
        .find(|t| !t.is_empty())
}

/// Bounded generate / execute / repair / answer controller.
///
/// The model only ever proposes SQL text. Whether it runs, and how many
/// times the agent retries, is decided here.
pub struct SqlAgent {
    llm: Arc<LlmManager>,
    store: Arc<dyn SqlStore>,
    settings: AgentSettings,
}

impl SqlAgent {
    pub fn new(llm: Arc<LlmManager>, store: Arc<dyn SqlStore>, settings: AgentSettings) -> Self {
        Self {
            llm,
            store,
            settings,
        }
    }

    /// Introspect the store, bounded by the store timeout.
    pub async fn schema(&self) -> Result<SchemaSnapshot, StoreError> {
        tokio::time::timeout(self.settings.store_timeout, self.store.introspect_schema())
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "schema introspection timed out after {:?}",
                    self.settings.store_timeout
                ))
            })?
    }

    /// Answer the latest user turn. Always yields a reply; failures degrade
    /// into an apology instead of an error.
    pub async fn answer(
        &self,
        turns: &[ConversationTurn],
        stream_tx: Option<mpsc::Sender<String>>,
    ) -> AgentOutcome {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("agent", request_id = %request_id);
        self.run(request_id, turns, stream_tx).instrument(span).await
    }

    async fn run(
        &self,
        request_id: String,
        turns: &[ConversationTurn],
        stream_tx: Option<mpsc::Sender<String>>,
    ) -> AgentOutcome {
        let deadline = Instant::now() + self.settings.request_timeout;
        let mut state = AgentState::new(stream_tx);

        state.advance(AgentPhase::Generating).await;
        let Some(question) = latest_user_question(turns) else {
            warn!("No user question in {} turns, aborting", turns.len());
            state.advance(AgentPhase::Aborted).await;
            return state.finish(request_id, GENERIC_APOLOGY.to_string()).await;
        };
        info!("Agent activated: {}", question);

        let schema = self.load_schema().await;
        if Instant::now() >= deadline {
            warn!("Request deadline passed before generation");
            state.advance(AgentPhase::Aborted).await;
            return state.finish(request_id, GENERIC_APOLOGY.to_string()).await;
        }

        let mut candidate =
            generate_sql(&self.llm, question, &schema, self.settings.model_timeout).await;
        emit(
            &state.stream_tx,
            serde_json::json!({ "type": "sql", "origin": candidate.origin, "text": candidate.text }),
        )
        .await;

        state.advance(AgentPhase::Executing).await;
        let result = loop {
            if Instant::now() >= deadline {
                warn!(
                    "Request deadline passed after {} executions",
                    state.executions
                );
                state.last_candidate = Some(candidate);
                state.advance(AgentPhase::Aborted).await;
                return state.finish(request_id, GENERIC_APOLOGY.to_string()).await;
            }

            let result = execute(
                self.store.as_ref(),
                &candidate,
                self.settings.max_rows,
                self.settings.store_timeout,
            )
            .await;
            state.executions += 1;
            emit(
                &state.stream_tx,
                serde_json::json!({ "type": "sql_result", "result": result.to_event_json() }),
            )
            .await;

            let failure = match result.failure() {
                None => break result,
                Some(err) => err.clone(),
            };

            if state.attempt_count >= self.settings.max_attempts {
                let exhausted = AgentError::AttemptsExhausted {
                    attempts: state.attempt_count,
                };
                warn!("{} (last error: {})", exhausted, failure);
                break result;
            }

            state.advance(AgentPhase::Repairing).await;
            state.attempt_count += 1;
            info!(
                "Repair attempt {}/{} after {}: {}",
                state.attempt_count,
                self.settings.max_attempts,
                failure.kind(),
                failure
            );
            emit(
                &state.stream_tx,
                serde_json::json!({
                    "type": "repair",
                    "attempt": state.attempt_count,
                    "error": failure.to_string(),
                }),
            )
            .await;

            candidate =
                repair_sql(&self.llm, &candidate, &failure, self.settings.model_timeout).await;
            emit(
                &state.stream_tx,
                serde_json::json!({ "type": "sql", "origin": candidate.origin, "text": candidate.text }),
            )
            .await;
            state.advance(AgentPhase::Executing).await;
        };

        state.advance(AgentPhase::Answering).await;
        let answer = self.synthesize(question, &result).await;
        state.last_candidate = Some(candidate);
        state.last_result = Some(result);
        state.advance(AgentPhase::Done).await;
        state.finish(request_id, answer).await
    }

    async fn load_schema(&self) -> SchemaSnapshot {
        match self.schema().await {
            Ok(schema) => schema,
            Err(e) => {
                warn!("Schema introspection failed, continuing without schema: {}", e);
                SchemaSnapshot::new()
            }
        }
    }

    async fn synthesize(&self, question: &str, result: &QueryResult) -> String {
        let prompt = match result {
            QueryResult::Success {
                columns,
                rows,
                truncated,
            } => {
                let preview = &rows[..rows.len().min(self.settings.preview_rows)];
                build_answer_prompt(question, columns, preview, *truncated)
            }
            QueryResult::Failure(err) => build_apology_prompt(question, &err.to_string()),
        };

        match tokio::time::timeout(self.settings.model_timeout, self.llm.complete(&prompt)).await {
            Ok(Ok(text)) => {
                let text = strip_reasoning(&text);
                if text.is_empty() {
                    warn!("Answer synthesis returned empty text");
                    GENERIC_APOLOGY.to_string()
                } else {
                    text
                }
            }
            Ok(Err(e)) => {
                warn!("Answer synthesis failed: {}", e);
                GENERIC_APOLOGY.to_string()
            }
            Err(_) => {
                warn!("Answer synthesis timed out");
                GENERIC_APOLOGY.to_string()
            }
        }
    }
}
