pub mod generic_provider;
pub mod registry;
#[cfg(test)]
pub mod scripted;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::config::LlmConfig;
use crate::core::sql::prompts::SYSTEM_PROMPT;
use generic_provider::GenericProvider;
use registry::ProviderRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// JSON schema the model is asked to fill for structured output.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    /// `{ "query": string }`, the shape SQL generation asks for.
    pub fn sql_query() -> Self {
        Self {
            name: "query_output".to_string(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Syntactically valid SQL query."
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    async fn generate(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String>;

    /// Providers without native structured output fall back to a JSON
    /// instruction and parse the first object out of the reply.
    async fn generate_structured(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        schema: &ResponseSchema,
    ) -> Result<Value> {
        let text = self
            .generate(model_id, &with_json_instruction(messages, schema))
            .await?;
        extract_json_object(&text)
    }
}

/// `messages` plus a trailing system turn asking for JSON matching `schema`.
/// For providers without a native structured-output mode.
pub fn with_json_instruction(
    messages: &[ChatMessage],
    schema: &ResponseSchema,
) -> Vec<ChatMessage> {
    let mut instructed = messages.to_vec();
    instructed.push(ChatMessage::system(format!(
        "Respond with only a JSON object matching this JSON schema:\n{}",
        schema.schema
    )));
    instructed
}

/// Parse the outermost `{...}` span of `text`.
pub fn extract_json_object(text: &str) -> Result<Value> {
    let start = text
        .find('{')
        .ok_or_else(|| anyhow!("model reply contains no JSON object"))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("model reply contains an unterminated JSON object"))?;
    Ok(serde_json::from_str(&text[start..=end])?)
}

pub struct LlmManager {
    providers: Vec<Box<dyn LlmProvider>>,
    selected_provider: Option<String>,
    selected_model: Option<String>,
    system_prompt: Option<String>,
}

impl LlmManager {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            selected_provider: None,
            selected_model: None,
            system_prompt: None,
        }
    }

    pub fn register_provider(&mut self, provider: Box<dyn LlmProvider>) {
        info!("Registered LLM Provider: {}", provider.provider_id());
        self.providers.push(provider);
    }

    pub fn set_active(&mut self, provider_id: &str, model_id: &str) {
        info!("Setting active LLM: {} ({})", provider_id, model_id);
        self.selected_provider = Some(provider_id.to_string());
        self.selected_model = Some(model_id.to_string());
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    pub fn get_active_info(&self) -> (Option<&str>, Option<&str>) {
        (
            self.selected_provider.as_deref(),
            self.selected_model.as_deref(),
        )
    }

    fn active(&self) -> Result<(&dyn LlmProvider, &str)> {
        let provider_id = self.selected_provider.as_deref().ok_or_else(|| {
            anyhow!("No LLM Provider selected. Set [llm] provider in moviebot.toml.")
        })?;
        let model_id = self
            .selected_model
            .as_deref()
            .ok_or_else(|| anyhow!("No LLM Model selected."))?;
        let provider = self
            .providers
            .iter()
            .find(|p| p.provider_id() == provider_id)
            .map(|p| p.as_ref())
            .ok_or_else(|| anyhow!("Selected provider '{}' not found in registry", provider_id))?;
        Ok((provider, model_id))
    }

    fn messages_for(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(prompt));
        messages
    }

    /// Free-text completion of a single prompt.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let (provider, model_id) = self.active()?;
        debug!("LLM complete via {} ({} chars)", provider.provider_id(), prompt.len());
        provider.generate(model_id, &self.messages_for(prompt)).await
    }

    /// Structured completion; the returned value is not validated against
    /// `schema` beyond being a JSON value.
    pub async fn complete_structured(&self, prompt: &str, schema: &ResponseSchema) -> Result<Value> {
        let (provider, model_id) = self.active()?;
        debug!(
            "LLM structured complete via {} schema={}",
            provider.provider_id(),
            schema.name
        );
        provider
            .generate_structured(model_id, &self.messages_for(prompt), schema)
            .await
    }
}

impl LlmManager {
    /// Builds a manager with the configured registry provider selected.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let registry = ProviderRegistry::load()?;
        let mut def = registry.get_provider(&config.provider).cloned().ok_or_else(|| {
            let known: Vec<&str> = registry.providers.iter().map(|p| p.id.as_str()).collect();
            anyhow!(
                "Unknown LLM provider '{}'. Known providers: {}",
                config.provider,
                known.join(", ")
            )
        })?;
        if let Some(url) = &config.base_url {
            def.base_url = url.clone();
        }
        let api_key = config
            .api_key_env
            .as_deref()
            .or(def.auth.api_key_env.as_deref())
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| def.default_model.clone());
        let provider_id = def.id.clone();
        let provider =
            GenericProvider::new(def, api_key, Duration::from_secs(config.timeout_secs))?;

        let mut manager = Self::new();
        manager.register_provider(Box::new(provider));
        manager.set_active(&provider_id, &model);
        manager.set_system_prompt(SYSTEM_PROMPT);
        Ok(manager)
    }
}

impl Default for LlmManager {
    fn default() -> Self {
        Self::new()
    }
}
