//! Join node
//!
//! Concatenates every value arriving on its input port, in edge priority
//! order, with a configurable separator. The ordered-list gather contract
//! means reordering edges reorders the joined text without touching nodes.

use std::collections::HashMap;

use async_trait::async_trait;
use logic_engine::{NodeCategory, NodeContext, NodeHandler, NodePorts, PortDefinition, Result};
use serde_json::{json, Value};

/// Join node
pub struct JoinNode;

impl JoinNode {
    /// Port ID for the aggregated inputs
    pub const PORT_ITEMS: &'static str = "items";
    /// Port ID for the joined text output
    pub const PORT_TEXT: &'static str = "text";
    /// Port ID for the item count output
    pub const PORT_COUNT: &'static str = "count";
}

fn as_text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

#[async_trait]
impl NodeHandler for JoinNode {
    fn node_type(&self) -> &'static str {
        "join"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Process
    }

    fn ports(&self) -> NodePorts {
        NodePorts {
            inputs: vec![PortDefinition::new(Self::PORT_ITEMS, "Items")],
            outputs: vec![
                PortDefinition::new(Self::PORT_TEXT, "Text"),
                PortDefinition::new(Self::PORT_COUNT, "Count"),
            ],
        }
    }

    fn default_data(&self) -> Value {
        json!({"separator": "\n"})
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
        let separator = ctx
            .data
            .get("separator")
            .and_then(Value::as_str)
            .unwrap_or("\n");

        let items: Vec<String> = ctx
            .inputs
            .all(Self::PORT_ITEMS)
            .iter()
            .map(as_text)
            .filter(|s| !s.trim().is_empty())
            .collect();

        let mut outputs = HashMap::new();
        outputs.insert(Self::PORT_TEXT.to_string(), json!(items.join(separator)));
        outputs.insert(Self::PORT_COUNT.to_string(), json!(items.len()));
        Ok(outputs)
    }
}
