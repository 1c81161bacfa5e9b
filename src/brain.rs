use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{PilotError, Result};
use crate::types::AGENT_EXCERPT_MAX_CHARS;

const AGENT: &str = "reasoning agent";

/// A text-in, text-out model endpoint. Implementations ask for JSON output
/// but the reply is only a string until `Brain::ask_json` parses it.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Front door to the reasoning agent for the pipeline.
#[derive(Clone)]
pub struct Brain {
    agent: Arc<dyn ReasoningAgent>,
}

impl Brain {
    pub fn new(agent: Arc<dyn ReasoningAgent>) -> Self {
        Self { agent }
    }

    /// Send `prompt` and parse the reply as JSON.
    pub async fn ask_json(&self, prompt: &str) -> Result<Value> {
        let reply = self.agent.complete(prompt).await?;
        debug!(reply = %reply, "agent replied");
        parse_reply(&reply)
    }
}

/// Parse an agent reply, tolerating a Markdown code fence around it.
pub fn parse_reply(reply: &str) -> Result<Value> {
    let cleaned = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).map_err(|e| {
        warn!(error = %e, "agent reply is not valid JSON");
        PilotError::MalformedAgentResponse {
            reason: e.to_string(),
            excerpt: cleaned.chars().take(AGENT_EXCERPT_MAX_CHARS).collect(),
        }
    })
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| PilotError::upstream(AGENT, format!("cannot build HTTP client: {e}")))
}

/// POST a JSON body and return the decoded JSON response, mapping transport
/// failures and non-2xx statuses to `UpstreamUnavailable`.
async fn post_json(client: &Client, url: &str, headers: &[(&str, String)], body: &Value) -> Result<Value> {
    let mut request = client.post(url).json(body);
    for (name, value) in headers {
        request = request.header(*name, value);
    }
    // Error text must not carry the request URL; it ends up in job results.
    let response = request
        .send()
        .await
        .map_err(|e| PilotError::upstream(AGENT, e.without_url()))?;

    let status = response.status();
    let payload: Value = response.json().await.map_err(|e| {
        PilotError::upstream(
            AGENT,
            format!("unreadable response ({status}): {}", e.without_url()),
        )
    })?;

    if !status.is_success() {
        let message = payload["error"]["message"]
            .as_str()
            .or_else(|| payload["error"].as_str())
            .unwrap_or("unknown API error");
        return Err(PilotError::upstream(AGENT, format!("API error ({status}): {message}")));
    }
    Ok(payload)
}

fn missing_content(payload: &Value) -> PilotError {
    PilotError::MalformedAgentResponse {
        reason: "no text content in agent response".to_string(),
        excerpt: payload.to_string().chars().take(AGENT_EXCERPT_MAX_CHARS).collect(),
    }
}

/// Google Gemini `generateContent` with a JSON response MIME type. The key
/// travels in the `x-goog-api-key` header, never in the URL.
pub struct GeminiAgent {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiAgent {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ReasoningAgent for GeminiAgent {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"responseMimeType": "application/json"},
        });
        debug!(model = %self.model, "calling Gemini");

        let headers = [("x-goog-api-key", self.api_key.clone())];
        let payload = post_json(&self.client, &url, &headers, &body).await?;
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| missing_content(&payload))
    }
}

/// A local Ollama server's `/api/generate` in JSON format mode.
pub struct OllamaAgent {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaAgent {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ReasoningAgent for OllamaAgent {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "format": "json",
            "stream": false,
        });
        debug!(model = %self.model, "calling Ollama");

        let payload = post_json(&self.client, &url, &[], &body).await?;
        payload["response"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| missing_content(&payload))
    }
}

/// OpenAI-compatible chat completions in JSON-object mode.
pub struct OpenAiAgent {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiAgent {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ReasoningAgent for OpenAiAgent {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You answer with a single JSON value and nothing else."},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.2,
            "response_format": {"type": "json_object"},
        });
        let headers = [("Authorization", format!("Bearer {}", self.api_key))];
        debug!(model = %self.model, "calling OpenAI");

        let payload = post_json(&self.client, &url, &headers, &body).await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| missing_content(&payload))
    }
}
