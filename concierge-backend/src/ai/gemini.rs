//! Gemini generateContent client

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::ai::{MessageRole, RuntimeError, RuntimeResponse, TurnContext, UsageEvent};
use crate::models::TokenUsage;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    /// Model for session turns.
    agent_model: String,
    /// Cheaper model for one-shot generation (form extraction, FAQ drafts).
    general_model: String,
    base_url: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i64,
    #[serde(default)]
    candidates_token_count: i64,
    #[serde(default)]
    tool_use_prompt_token_count: i64,
    #[serde(default)]
    thoughts_token_count: i64,
    #[serde(default)]
    total_token_count: i64,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(meta: UsageMetadata) -> Self {
        TokenUsage {
            input_tokens: meta.prompt_token_count,
            output_tokens: meta.candidates_token_count,
            tool_tokens: meta.tool_use_prompt_token_count,
            thought_tokens: meta.thoughts_token_count,
            total_tokens: meta.total_token_count,
        }
    }
}

impl GeminiClient {
    pub fn new(api_key: &str, agent_model: &str, general_model: &str) -> Result<Self, String> {
        if api_key.is_empty() {
            return Err("Gemini API key is empty".to_string());
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(GeminiClient {
            client,
            api_key: api_key.to_string(),
            agent_model: agent_model.to_string(),
            general_model: general_model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub async fn run_turn(&self, context: &TurnContext) -> Result<RuntimeResponse, RuntimeError> {
        let mut contents: Vec<Value> = context
            .history
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();
        contents.push(json!({"role": "user", "parts": [{"text": context.user_message}]}));

        let body = json!({
            "system_instruction": {"parts": [{"text": context.system_instruction}]},
            "contents": contents,
        });

        self.generate_content(&self.agent_model, body).await
    }

    pub async fn generate(
        &self,
        system_instruction: &str,
        user_text: &str,
    ) -> Result<RuntimeResponse, RuntimeError> {
        let body = json!({
            "system_instruction": {"parts": [{"text": system_instruction}]},
            "contents": [{"role": "user", "parts": [{"text": user_text}]}],
        });
        self.generate_content(&self.general_model, body).await
    }

    async fn generate_content(
        &self,
        model: &str,
        body: Value,
    ) -> Result<RuntimeResponse, RuntimeError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RuntimeError::new(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| RuntimeError::new(format!("Gemini response was not JSON: {}", e)))?;

        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(RuntimeError::new(format!(
                "Gemini API error ({}): {}",
                status, detail
            )));
        }

        let raw_text = payload["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RuntimeError::new("Gemini response had no text candidate"))?;

        let usage: TokenUsage = serde_json::from_value::<UsageMetadata>(
            payload["usageMetadata"].clone(),
        )
        .unwrap_or_default()
        .into();

        Ok(RuntimeResponse {
            raw_text,
            usage_events: vec![UsageEvent {
                model: model.to_string(),
                usage,
            }],
        })
    }
}
