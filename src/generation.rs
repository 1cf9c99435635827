//! Answer generation via an Azure OpenAI chat-completions deployment.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{GenerationConfig, HttpConfig, OpenAiSettings};
use crate::error::{Error, Result};
use crate::http::ServiceClient;
use crate::models::ChatMessage;
use crate::traits::Generator;

pub struct AzureOpenAiGenerator {
    client: ServiceClient,
    deployment: String,
    temperature: f32,
    max_tokens: u32,
}

impl AzureOpenAiGenerator {
    pub fn new(settings: &OpenAiSettings, generation: &GenerationConfig, http: &HttpConfig) -> Result<Self> {
        let client = ServiceClient::new(
            "openai",
            &settings.endpoint,
            &settings.api_key,
            &settings.api_version,
            http,
        )?;
        Ok(Self::with_client(client, &settings.chat_deployment, generation))
    }

    pub fn with_client(client: ServiceClient, deployment: &str, generation: &GenerationConfig) -> Self {
        Self {
            client,
            deployment: deployment.to_string(),
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
        }
    }
}

#[async_trait]
impl Generator for AzureOpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.deployment
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        tracing::debug!(
            deployment = %self.deployment,
            messages = messages.len(),
            "sending chat completion request"
        );

        let resp = self
            .client
            .post(
                &format!("openai/deployments/{}/chat/completions", self.deployment),
                &body,
            )
            .await?;

        parse_completion(&resp.body)
    }
}

fn parse_completion(json: &Value) -> Result<String> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| Error::invalid_response("openai", "no choices in completion"))?;

    // content is null when the content filter stops generation
    match choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
    {
        Some(text) => Ok(text.to_string()),
        None => {
            let reason = choice
                .get("finish_reason")
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            Err(Error::invalid_response(
                "openai",
                format!("completion has no content (finish_reason: {})", reason),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_choice() {
        let resp = json!({
            "choices": [
                { "index": 0, "finish_reason": "stop", "message": { "role": "assistant", "content": "Cutoff is 5pm." } }
            ]
        });
        assert_eq!(parse_completion(&resp).unwrap(), "Cutoff is 5pm.");
    }

    #[test]
    fn filtered_completion_is_an_error() {
        let resp = json!({
            "choices": [
                { "index": 0, "finish_reason": "content_filter", "message": { "role": "assistant", "content": null } }
            ]
        });
        let err = parse_completion(&resp).unwrap_err();
        assert!(err.to_string().contains("content_filter"));
    }

    #[test]
    fn empty_choices_is_an_error() {
        assert!(parse_completion(&json!({ "choices": [] })).is_err());
    }
}
