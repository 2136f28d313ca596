//! LLM chat node
//!
//! Builds a chat request from its configuration and gathered prompt values,
//! calls the injected LLM service, and emits the assistant message plus any
//! tool calls. The `flow` input is a mandatory gate: wiring anything to it
//! makes the node wait for that value in addition to its prompt data.

use std::collections::HashMap;

use async_trait::async_trait;
use logic_engine::{NodeCategory, NodeContext, NodeHandler, NodePorts, PortDefinition, Result};
use serde_json::{json, Value};

use crate::services::{llm_chat_service, ChatMessage, ChatRequest};

/// LLM chat node
pub struct LlmChatNode;

impl LlmChatNode {
    /// Port ID for prompt inputs (accepts multiple edges)
    pub const PORT_PROMPT: &'static str = "prompt";
    /// Port ID for the flow gate input
    pub const PORT_FLOW: &'static str = "flow";
    /// Port ID for the assistant message output
    pub const PORT_MESSAGE: &'static str = "message";
    /// Port ID for the tool calls output
    pub const PORT_TOOL_CALLS: &'static str = "toolCalls";
}

/// Turn one gathered prompt value into a chat message
///
/// Accepts `{role, content}` objects as-is; anything else becomes a user
/// message with its text.
fn to_message(value: &Value) -> ChatMessage {
    if let (Some(role), Some(content)) = (
        value.get("role").and_then(Value::as_str),
        value.get("content").and_then(Value::as_str),
    ) {
        return ChatMessage::new(role, content);
    }
    match value.as_str() {
        Some(s) => ChatMessage::new("user", s),
        None => ChatMessage::new("user", value.to_string()),
    }
}

#[async_trait]
impl NodeHandler for LlmChatNode {
    fn node_type(&self) -> &'static str {
        "llm-chat"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Process
    }

    fn ports(&self) -> NodePorts {
        NodePorts {
            inputs: vec![
                PortDefinition::new(Self::PORT_PROMPT, "Prompt"),
                PortDefinition::new(Self::PORT_FLOW, "Flow").gate(),
            ],
            outputs: vec![
                PortDefinition::new(Self::PORT_MESSAGE, "Message"),
                PortDefinition::new(Self::PORT_TOOL_CALLS, "Tool Calls"),
            ],
        }
    }

    fn default_data(&self) -> Value {
        json!({"settings": {}, "systemPrompt": ""})
    }

    fn should_run(&self, ctx: &NodeContext) -> bool {
        // Without any prompt material there is nothing to ask
        ctx.inputs.has(Self::PORT_PROMPT)
            || !ctx
                .data
                .get("systemPrompt")
                .and_then(Value::as_str)
                .unwrap_or("")
                .is_empty()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
        let service = llm_chat_service(&ctx)?;

        let mut messages = Vec::new();
        if let Some(system) = ctx
            .data
            .get("systemPrompt")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            messages.push(ChatMessage::new("system", system));
        }
        for value in ctx.inputs.all(Self::PORT_PROMPT) {
            messages.push(to_message(value));
        }

        let request = ChatRequest {
            messages,
            settings: ctx.data.get("settings").cloned().unwrap_or(json!({})),
            allowed_tools: ctx
                .data
                .get("allowedTools")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            custom_tools: ctx
                .data
                .get("customTools")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            structured_output: ctx.data.get("structuredOutput").cloned().filter(|v| !v.is_null()),
        };

        let response = service.call_llm_chat(request, ctx.cancel.clone()).await?;

        let mut outputs = HashMap::new();
        let message = match response.structured_output {
            Some(structured) => json!({"role": "assistant", "content": response.content, "structured": structured}),
            None => json!({"role": "assistant", "content": response.content}),
        };
        outputs.insert(Self::PORT_MESSAGE.to_string(), message);
        outputs.insert(Self::PORT_TOOL_CALLS.to_string(), json!(response.tool_calls));
        Ok(outputs)
    }
}
