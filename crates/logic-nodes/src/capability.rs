//! Capability node
//!
//! Invokes one registered capability through the injected capability
//! service, passing either the gathered `args` input or the arguments
//! configured on the node.

use std::collections::HashMap;

use async_trait::async_trait;
use logic_engine::{
    LogicEngineError, NodeCategory, NodeContext, NodeHandler, NodePorts, PortDefinition, Result,
};
use serde_json::{json, Value};

use crate::services::capability_service;

/// Capability node
pub struct CapabilityNode;

impl CapabilityNode {
    /// Port ID for the arguments input
    pub const PORT_ARGS: &'static str = "args";
    /// Port ID for the invocation result output
    pub const PORT_RESULT: &'static str = "result";
}

#[async_trait]
impl NodeHandler for CapabilityNode {
    fn node_type(&self) -> &'static str {
        "capability"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Process
    }

    fn ports(&self) -> NodePorts {
        NodePorts {
            inputs: vec![PortDefinition::new(Self::PORT_ARGS, "Arguments")],
            outputs: vec![PortDefinition::new(Self::PORT_RESULT, "Result")],
        }
    }

    fn default_data(&self) -> Value {
        json!({"capabilityId": "", "args": {}})
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
        let capability_id = ctx
            .data
            .get("capabilityId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| LogicEngineError::MissingInput("capabilityId".to_string()))?
            .to_string();

        let args = ctx
            .inputs
            .first(Self::PORT_ARGS)
            .cloned()
            .or_else(|| ctx.data.get("args").cloned())
            .unwrap_or(json!({}));

        let service = capability_service(&ctx)?;
        log::debug!("capability {}: invoking '{}'", ctx.node_id, capability_id);
        let result = service.invoke(&capability_id, args).await?;

        let mut outputs = HashMap::new();
        outputs.insert(Self::PORT_RESULT.to_string(), result);
        Ok(outputs)
    }
}
