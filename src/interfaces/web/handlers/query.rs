use axum::{
    Json,
    extract::State,
    response::IntoResponse,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tracing::info;

use super::super::AppState;
use crate::core::sql::{ConversationTurn, TurnRole};

#[derive(Debug, serde::Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    chat_history: Vec<HistoryEntry>,
}

impl QueryRequest {
    /// Entries with a role other than user/assistant are dropped.
    fn turns(&self) -> Vec<ConversationTurn> {
        self.chat_history
            .iter()
            .filter_map(|entry| {
                let role = match entry.role.trim().to_ascii_lowercase().as_str() {
                    "user" | "human" => TurnRole::User,
                    "assistant" | "ai" => TurnRole::Assistant,
                    _ => return None,
                };
                Some(ConversationTurn {
                    role,
                    text: entry.content.clone(),
                })
            })
            .collect()
    }

    fn session(&self) -> &str {
        self.session_id.as_deref().unwrap_or("-")
    }
}

pub async fn query_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Json<serde_json::Value> {
    let turns = payload.turns();
    let outcome = state.agent.answer(&turns, None).await;
    info!(
        "Query session={} request_id={} executions={} repairs={}",
        payload.session(),
        outcome.request_id,
        outcome.executions,
        outcome.attempts
    );
    Json(serde_json::json!({ "ai_message": outcome.answer }))
}

pub async fn query_stream_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> axum::response::Response {
    let (tx, rx) = tokio::sync::mpsc::channel::<String>(32);
    let turns = payload.turns();
    let session = payload.session().to_string();
    let agent = state.agent.clone();

    // The agent future lives only as long as the client keeps the stream open.
    let watch = tx.clone();
    tokio::spawn(async move {
        tokio::select! {
            outcome = agent.answer(&turns, Some(tx)) => {
                info!(
                    "Streamed query session={} request_id={} executions={}",
                    session, outcome.request_id, outcome.executions
                );
            }
            _ = watch.closed() => {
                info!("Stream client for session={} disconnected, cancelling query", session);
            }
        }
    });

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx)
        .map(|msg| Ok::<_, Infallible>(Event::default().data(msg)));

    Sse::new(stream).into_response()
}
