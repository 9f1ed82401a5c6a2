use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use warden_config::ModelConfig;
use warden_core::{ActionRequest, CapabilityHandler, HandlerOutput, WardenError};

/// Paid model invocation against an OpenAI-compatible chat endpoint.
///
/// Producers attach `estimated_cost_usd` to `invoke_model` requests; this
/// handler only runs once the ledger has admitted the charge.
pub struct ModelCapability {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ModelCapability {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for ModelCapability {
    fn name(&self) -> &str {
        "model"
    }

    async fn execute(&self, request: &ActionRequest) -> warden_core::Result<HandlerOutput> {
        let prompt = request.params["prompt"]
            .as_str()
            .ok_or_else(|| WardenError::Handler {
                kind: request.kind,
                reason: "missing 'prompt' parameter".into(),
            })?;
        let max_tokens = request.params["max_tokens"].as_u64().unwrap_or(2048);
        let temperature = request.params["temperature"].as_f64().unwrap_or(0.7);

        info!(model = %self.model, "invoking paid model");

        let body = json!({
            "model": &self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| WardenError::Handler {
            kind: request.kind,
            reason: format!("model endpoint unreachable: {e}"),
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(WardenError::Handler {
                kind: request.kind,
                reason: format!("model endpoint error ({status}): {text}"),
            });
        }

        let data: serde_json::Value = resp.json().await.map_err(|e| WardenError::Handler {
            kind: request.kind,
            reason: format!("malformed model response: {e}"),
        })?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(HandlerOutput::text(content).with_data(json!({ "model": &self.model })))
    }
}

/// Zero-cost model invocation against a local Ollama-style server. This is
/// the registered fallback for `invoke_model`: when the ledger rejects a
/// paid charge, the gateway downgrades here instead of blocking.
pub struct LocalModelCapability {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl LocalModelCapability {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.local_base_url.clone(),
            model: config.local_model.clone(),
        }
    }
}

#[async_trait]
impl CapabilityHandler for LocalModelCapability {
    fn name(&self) -> &str {
        "model_local"
    }

    async fn execute(&self, request: &ActionRequest) -> warden_core::Result<HandlerOutput> {
        let prompt = request.params["prompt"]
            .as_str()
            .ok_or_else(|| WardenError::Handler {
                kind: request.kind,
                reason: "missing 'prompt' parameter".into(),
            })?;

        info!(model = %self.model, "invoking local model");

        let body = json!({
            "model": &self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| WardenError::Handler {
                kind: request.kind,
                reason: format!("local model unreachable: {e}"),
            })?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(WardenError::Handler {
                kind: request.kind,
                reason: format!("local model error: {text}"),
            });
        }

        let data: serde_json::Value = resp.json().await.map_err(|e| WardenError::Handler {
            kind: request.kind,
            reason: format!("malformed local model response: {e}"),
        })?;

        let content = data["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(HandlerOutput::text(content).with_data(json!({ "model": &self.model, "cost_usd": 0.0 })))
    }
}
