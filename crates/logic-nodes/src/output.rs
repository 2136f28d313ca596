//! Text output node
//!
//! Terminal sink of a flow. Accepts either plain text or an assistant
//! message object and passes the text through so observers can read the
//! final value off the run state.

use std::collections::HashMap;

use async_trait::async_trait;
use logic_engine::{NodeCategory, NodeContext, NodeHandler, NodePorts, PortDefinition, Result};
use serde_json::{json, Value};

/// Text output node
pub struct TextOutputNode;

impl TextOutputNode {
    /// Port ID for the text input and passthrough output
    pub const PORT_TEXT: &'static str = "text";
}

/// Extract readable text from a plain string or a `{role, content}` message
fn text_of(value: &Value) -> String {
    if let Some(s) = value.as_str() {
        return s.to_string();
    }
    if let Some(content) = value.get("content").and_then(Value::as_str) {
        return content.to_string();
    }
    value.to_string()
}

#[async_trait]
impl NodeHandler for TextOutputNode {
    fn node_type(&self) -> &'static str {
        "text-output"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Output
    }

    fn ports(&self) -> NodePorts {
        NodePorts {
            inputs: vec![PortDefinition::new(Self::PORT_TEXT, "Text")],
            outputs: vec![PortDefinition::new(Self::PORT_TEXT, "Text")],
        }
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
        let text = ctx
            .inputs
            .first(Self::PORT_TEXT)
            .map(text_of)
            .unwrap_or_default();

        let mut outputs = HashMap::new();
        outputs.insert(Self::PORT_TEXT.to_string(), json!(text));
        Ok(outputs)
    }
}
