//! Choice node
//!
//! Routes its input down exactly one of N downstream paths. The single
//! `match` output is a branching port: the emitted flow signal names the
//! branch ordinal whose edge should activate, and the engine suppresses the
//! rest.

use std::collections::HashMap;

use async_trait::async_trait;
use logic_engine::{
    FlowSignal, NodeCategory, NodeContext, NodeHandler, NodePorts, PortDefinition, Result,
};
use serde_json::{json, Value};

/// Choice node
pub struct ChoiceNode;

impl ChoiceNode {
    /// Port ID for the value input
    pub const PORT_VALUE: &'static str = "value";
    /// Port ID for the branching output
    pub const PORT_MATCH: &'static str = "match";
}

/// Extract the text a rule matches against
fn match_text(value: &Value) -> String {
    if let Some(s) = value.as_str() {
        return s.to_string();
    }
    if let Some(content) = value.get("content").and_then(Value::as_str) {
        return content.to_string();
    }
    value.to_string()
}

/// Whether one rule matches the routed value
fn rule_matches(rule: &Value, value: &Value, text: &str) -> bool {
    if let Some(expected) = rule.get("equals") {
        return expected == value || expected.as_str() == Some(text);
    }
    if let Some(needle) = rule.get("contains").and_then(Value::as_str) {
        return text.to_lowercase().contains(&needle.to_lowercase());
    }
    false
}

#[async_trait]
impl NodeHandler for ChoiceNode {
    fn node_type(&self) -> &'static str {
        "choice"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Process
    }

    fn ports(&self) -> NodePorts {
        NodePorts {
            inputs: vec![PortDefinition::new(Self::PORT_VALUE, "Value")],
            outputs: vec![PortDefinition::new(Self::PORT_MATCH, "Match").branching()],
        }
    }

    fn default_data(&self) -> Value {
        json!({"rules": []})
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
        let value = ctx
            .inputs
            .first(Self::PORT_VALUE)
            .cloned()
            .unwrap_or(Value::Null);
        let text = match_text(&value);

        let rules = ctx
            .data
            .get("rules")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let matched = rules
            .iter()
            .position(|rule| rule_matches(rule, &value, &text));

        let signal = match matched {
            Some(branch) => FlowSignal::single(branch as u32, value),
            None => match ctx.data.get("defaultBranch").and_then(Value::as_u64) {
                Some(branch) => FlowSignal::single(branch as u32, value),
                // No match, no default: activate nothing
                None => FlowSignal::new(vec![], value),
            },
        };

        log::debug!("choice {}: activating {:?}", ctx.node_id, signal.indexes);

        let mut outputs = HashMap::new();
        outputs.insert(Self::PORT_MATCH.to_string(), signal.to_value());
        Ok(outputs)
    }
}
