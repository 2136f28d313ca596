//! Text prompt node
//!
//! Emits configured text, the simplest data source. The text lives in the
//! node's `data` and is editable in place by the host UI.

use std::collections::HashMap;

use async_trait::async_trait;
use logic_engine::{NodeCategory, NodeContext, NodeHandler, NodePorts, PortDefinition, Result};
use serde_json::{json, Value};

/// Text prompt node
pub struct TextPromptNode;

impl TextPromptNode {
    /// Port ID for the text output
    pub const PORT_TEXT: &'static str = "text";
}

#[async_trait]
impl NodeHandler for TextPromptNode {
    fn node_type(&self) -> &'static str {
        "text-prompt"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Input
    }

    fn ports(&self) -> NodePorts {
        NodePorts {
            inputs: vec![],
            outputs: vec![PortDefinition::new(Self::PORT_TEXT, "Text")],
        }
    }

    fn default_data(&self) -> Value {
        json!({"text": ""})
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
        let text = ctx
            .data
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("");

        let mut outputs = HashMap::new();
        outputs.insert(Self::PORT_TEXT.to_string(), json!(text));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context_with;

    #[tokio::test]
    async fn test_emits_configured_text() {
        let ctx = context_with(json!({"text": "You are a helpful assistant."}), &[]);
        let outputs = TextPromptNode.execute(ctx).await.unwrap();
        assert_eq!(outputs["text"], "You are a helpful assistant.");
    }

    #[tokio::test]
    async fn test_missing_text_emits_empty() {
        let ctx = context_with(json!({}), &[]);
        let outputs = TextPromptNode.execute(ctx).await.unwrap();
        assert_eq!(outputs["text"], "");
    }
}
