use std::time::Duration;

use reqwest::Client as Http;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("{0} not set")]
    MissingKey(&'static str),
}

#[derive(Clone, Debug)]
pub enum Provider {
    Groq, // OpenAI-compatible; add more later
}

#[derive(Clone, Debug)]
pub struct Client {
    http: Http,
    provider: Provider,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    /// If true, request JSON-only output (`json_object`) when the
    /// provider supports it.
    pub json_object: bool,
    /// Per-request deadline applied by the HTTP client.
    pub timeout: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            json_object: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Client {
    pub fn new(provider: Provider, api_key: String, model: String) -> Result<Self, LlmError> {
        let base_url = match provider {
            Provider::Groq => "https://api.groq.com/openai/v1".to_string(),
        };
        let http = Http::builder()
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            provider,
            api_key,
            model,
            base_url,
        })
    }

    /// Convenience: pick up GROQ_API_KEY from env for Groq.
    pub fn from_env_groq(model: &str) -> Result<Self, LlmError> {
        let key = std::env::var("GROQ_API_KEY").map_err(|_| LlmError::MissingKey("GROQ_API_KEY"))?;
        Self::new(Provider::Groq, key, model.to_string())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, messages: &[ChatMessage], opts: ChatOptions) -> Result<String, LlmError> {
        match self.provider {
            Provider::Groq => self.chat_openai_compatible(messages, opts).await,
        }
    }

    async fn chat_openai_compatible(
        &self,
        messages: &[ChatMessage],
        opts: ChatOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let msgs: Vec<Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": msgs,
            "temperature": opts.temperature.unwrap_or(0.0),
        });
        if opts.json_object {
            if let Some(obj) = body.as_object_mut() {
                obj.insert("response_format".into(), json!({ "type": "json_object" }));
            }
        }

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .timeout(opts.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        v.pointer("/choices/0/message/content")
            .and_then(|x| x.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".into()))
    }

    /// Simple helper for one-shot prompts.
    pub async fn simple(&self, prompt: &str) -> Result<String, LlmError> {
        let msgs = vec![ChatMessage::user(prompt)];
        self.chat(&msgs, ChatOptions::default()).await
    }
}
