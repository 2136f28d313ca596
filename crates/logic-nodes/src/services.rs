//! Collaborator service interfaces
//!
//! Nodes reach the outside world through two injected services: the
//! LLM-call service and the capability-invocation service. Hosts place
//! implementations into the engine's `Extensions` map under the keys below;
//! nodes resolve them at execution time.

use async_trait::async_trait;
use logic_engine::{CancellationToken, LogicEngineError, NodeContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Extension key for the [`LlmChatService`] implementation
pub const LLM_CHAT_SERVICE: &str = "llm-chat-service";

/// Extension key for the [`CapabilityService`] implementation
pub const CAPABILITY_SERVICE: &str = "capability-service";

/// One chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Request handed to the LLM-call service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Sampling settings, passed through opaquely
    #[serde(default)]
    pub settings: Value,
    /// Built-in tools the model may call
    #[serde(default)]
    pub allowed_tools: Vec<Value>,
    /// Ad hoc tool definitions
    #[serde(default)]
    pub custom_tools: Vec<Value>,
    /// Requested structured-output schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,
}

/// Response from the LLM-call service
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<Value>,
    pub structured_output: Option<Value>,
}

/// The LLM-call collaborator
#[async_trait]
pub trait LlmChatService: Send + Sync {
    /// Perform one chat call, honoring the cancellation token
    async fn call_llm_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse>;
}

/// The capability-invocation collaborator
#[async_trait]
pub trait CapabilityService: Send + Sync {
    async fn invoke(&self, capability_id: &str, args: Value) -> Result<Value>;
}

/// Resolve the LLM-call service from a node context
pub fn llm_chat_service(ctx: &NodeContext) -> Result<Arc<dyn LlmChatService>> {
    ctx.extensions
        .get::<Arc<dyn LlmChatService>>(LLM_CHAT_SERVICE)
        .cloned()
        .ok_or_else(|| LogicEngineError::failed("LlmChatService not configured"))
}

/// Resolve the capability service from a node context
pub fn capability_service(ctx: &NodeContext) -> Result<Arc<dyn CapabilityService>> {
    ctx.extensions
        .get::<Arc<dyn CapabilityService>>(CAPABILITY_SERVICE)
        .cloned()
        .ok_or_else(|| LogicEngineError::failed("CapabilityService not configured"))
}

/// HTTP chat-completions implementation of [`LlmChatService`]
///
/// Targets an OpenAI-compatible `/v1/chat/completions` endpoint. Dropping
/// the request future on cancellation aborts the underlying connection.
pub struct HttpLlmChatService {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl HttpLlmChatService {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmChatService for HttpLlmChatService {
    async fn call_llm_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse> {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
        });
        if let Some(settings) = request.settings.as_object() {
            for (key, value) in settings {
                body[key.as_str()] = value.clone();
            }
        }
        let tools: Vec<Value> = request
            .allowed_tools
            .iter()
            .chain(request.custom_tools.iter())
            .cloned()
            .collect();
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        if let Some(schema) = &request.structured_output {
            body["response_format"] = json!({"type": "json_schema", "json_schema": schema});
        }

        log::debug!("chat call to {} ({} message(s))", self.endpoint, request.messages.len());

        let send = self.client.post(&self.endpoint).json(&body).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LogicEngineError::Cancelled),
            response = send => response?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(LogicEngineError::failed(format!(
                "chat endpoint error ({status}): {detail}"
            )));
        }

        let payload: Value = response.json().await?;
        let message = &payload["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();
        let tool_calls = message["tool_calls"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let structured_output = if request.structured_output.is_some() {
            serde_json::from_str(&content).ok()
        } else {
            None
        };

        Ok(ChatResponse {
            content,
            tool_calls,
            structured_output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_wire_shape() {
        let request = ChatRequest {
            messages: vec![ChatMessage::new("user", "hi")],
            settings: json!({"temperature": 0.7}),
            allowed_tools: vec![json!({"name": "search"})],
            custom_tools: vec![],
            structured_output: None,
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["messages"][0]["role"], "user");
        assert_eq!(wire["allowedTools"][0]["name"], "search");
        assert!(wire.get("structuredOutput").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        // Unroutable endpoint: cancellation must win before any I/O error
        let service = HttpLlmChatService::new("http://127.0.0.1:9/v1/chat/completions", "m");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = service
            .call_llm_chat(ChatRequest::default(), cancel)
            .await;
        assert!(matches!(result, Err(LogicEngineError::Cancelled)));
    }
}
