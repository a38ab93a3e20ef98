//! Deterministic provider for tests: replays a fixed script of replies.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ChatMessage, LlmProvider};

#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(String),
    Fail(String),
    Stall(Duration),
}

pub type CallLog = Arc<Mutex<Vec<Vec<ChatMessage>>>>;

pub struct ScriptedProvider {
    steps: Mutex<VecDeque<ScriptStep>>,
    log: CallLog,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_steps(replies.into_iter().map(|r| ScriptStep::Reply(r.into())))
    }

    pub fn from_steps<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = ScriptStep>,
    {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to every message list the provider has received.
    pub fn log(&self) -> CallLog {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _model_id: &str, messages: &[ChatMessage]) -> Result<String> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        let step = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match step {
            Some(ScriptStep::Reply(text)) => Ok(text),
            Some(ScriptStep::Fail(msg)) => Err(anyhow!(msg)),
            Some(ScriptStep::Stall(d)) => {
                tokio::time::sleep(d).await;
                Ok(String::new())
            }
            None => Err(anyhow!("script exhausted")),
        }
    }
}
