//! Preset loader node
//!
//! Emits a stored preset payload. Nominally an input node, but when its
//! configuration sets `execute` it joins stage scheduling like a process
//! node, and the payload is then produced mid-run, after its upstream
//! dependencies.

use std::collections::HashMap;

use async_trait::async_trait;
use logic_engine::{NodeCategory, NodeContext, NodeHandler, NodePorts, PortDefinition, Result};
use serde_json::{json, Value};

/// Preset loader node
pub struct PresetLoaderNode;

impl PresetLoaderNode {
    /// Port ID for the trigger input
    pub const PORT_TRIGGER: &'static str = "trigger";
    /// Port ID for the preset output
    pub const PORT_PRESET: &'static str = "preset";
}

#[async_trait]
impl NodeHandler for PresetLoaderNode {
    fn node_type(&self) -> &'static str {
        "preset-loader"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Input
    }

    fn ports(&self) -> NodePorts {
        NodePorts {
            inputs: vec![PortDefinition::new(Self::PORT_TRIGGER, "Trigger")],
            outputs: vec![PortDefinition::new(Self::PORT_PRESET, "Preset")],
        }
    }

    fn default_data(&self) -> Value {
        json!({"preset": {}, "execute": false})
    }

    fn acts_as_process(&self, data: &Value) -> bool {
        data.get("execute").and_then(Value::as_bool).unwrap_or(false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
        let preset = ctx.data.get("preset").cloned().unwrap_or(json!({}));

        let mut outputs = HashMap::new();
        outputs.insert(Self::PORT_PRESET.to_string(), preset);
        Ok(outputs)
    }
}
