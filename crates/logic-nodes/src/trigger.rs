//! Trigger node
//!
//! The entry point of a flow: emits a pulse (or a configured payload) that
//! downstream nodes hang off. Separate triggers end up in separate flows
//! after partitioning, which is what makes branches independently runnable.

use std::collections::HashMap;

use async_trait::async_trait;
use logic_engine::{NodeCategory, NodeContext, NodeHandler, NodePorts, PortDefinition, Result};
use serde_json::{json, Value};

/// Trigger node
pub struct TriggerNode;

impl TriggerNode {
    /// Port ID for the trigger output
    pub const PORT_TRIGGER: &'static str = "trigger";
}

#[async_trait]
impl NodeHandler for TriggerNode {
    fn node_type(&self) -> &'static str {
        "trigger"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Input
    }

    fn ports(&self) -> NodePorts {
        NodePorts {
            inputs: vec![],
            outputs: vec![PortDefinition::new(Self::PORT_TRIGGER, "Trigger")],
        }
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
        let payload = ctx.data.get("payload").cloned().unwrap_or(json!(true));

        let mut outputs = HashMap::new();
        outputs.insert(Self::PORT_TRIGGER.to_string(), payload);
        Ok(outputs)
    }
}
