use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::registry::{AuthType, ProviderDef};
use super::{ChatMessage, LlmProvider, ResponseSchema, extract_json_object, with_json_instruction};

// ── OpenAI-compatible request/response ──

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageOwned,
}

#[derive(Deserialize)]
struct OpenAiMessageOwned {
    #[serde(default)]
    content: Option<String>,
}

// ── Generic Provider ──

pub struct GenericProvider {
    provider_def: ProviderDef,
    api_key: Option<String>,
    client: Client,
}

impl GenericProvider {
    pub fn new(
        provider_def: ProviderDef,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        if provider_def.auth.auth_type != AuthType::None && api_key.is_none() {
            return Err(anyhow!(
                "{} requires an API key (set {})",
                provider_def.name,
                provider_def
                    .auth
                    .api_key_env
                    .as_deref()
                    .unwrap_or("the configured api_key_env")
            ));
        }
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            provider_def,
            api_key,
            client,
        })
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.provider_def.extra_headers {
            request = request.header(name, value);
        }
        let Some(key) = &self.api_key else {
            return request;
        };
        match self.provider_def.auth.auth_type {
            AuthType::Bearer => request.header("Authorization", format!("Bearer {}", key)),
            AuthType::Header => {
                let header = self
                    .provider_def
                    .auth
                    .header_name
                    .as_deref()
                    .unwrap_or("Authorization");
                request.header(header, key)
            }
            AuthType::None => request,
        }
    }

    async fn chat(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        response_format: Option<Value>,
    ) -> Result<String> {
        let req = OpenAiRequest {
            model: model_id,
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            response_format,
        };

        let request = self
            .authorize(self.client.post(&self.provider_def.base_url))
            .json(&req);
        let res = request.send().await?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "{} API Error ({}): {}",
                self.provider_def.name,
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }
        let parsed: OpenAiResponse = res.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl LlmProvider for GenericProvider {
    fn provider_id(&self) -> &str {
        &self.provider_def.id
    }

    async fn generate(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String> {
        self.chat(model_id, messages, None).await
    }

    async fn generate_structured(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        schema: &ResponseSchema,
    ) -> Result<Value> {
        if !self.provider_def.structured_output {
            let instructed = with_json_instruction(messages, schema);
            let text = self.chat(model_id, &instructed, None).await?;
            return extract_json_object(&text);
        }

        let format = serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
                "strict": true
            }
        });
        let text = self.chat(model_id, messages, Some(format)).await?;
        extract_json_object(&text)
    }
}
