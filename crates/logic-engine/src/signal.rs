//! Branching flow signals
//!
//! A branching output port carries `{"indexes": [...], "value": ...}`
//! instead of a plain value. The engine parses that shape here and uses the
//! index list to decide which downstream edges activate. Keeping the
//! structural sniffing in one place means the engine never pattern-matches
//! raw JSON itself.

use serde_json::{json, Value};

/// A parsed branching payload
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSignal {
    /// Branch numbers that activate
    pub indexes: Vec<u32>,
    /// The value delivered to activated edges
    pub value: Value,
}

impl FlowSignal {
    /// Create a signal activating the given branches
    pub fn new(indexes: Vec<u32>, value: Value) -> Self {
        Self { indexes, value }
    }

    /// Create a signal activating exactly one branch
    pub fn single(index: u32, value: Value) -> Self {
        Self::new(vec![index], value)
    }

    /// Parse a value as a flow signal
    ///
    /// Requires an object with an `indexes` array and a `value` key; extra
    /// keys are tolerated. Anything else is not a signal.
    pub fn parse(value: &Value) -> Option<FlowSignal> {
        let obj = value.as_object()?;
        let indexes = obj.get("indexes")?.as_array()?;
        let payload = obj.get("value")?;
        let indexes = indexes
            .iter()
            .filter_map(Value::as_u64)
            .map(|i| i as u32)
            .collect();
        Some(FlowSignal {
            indexes,
            value: payload.clone(),
        })
    }

    /// Whether the given branch number activates
    pub fn activates(&self, branch: u32) -> bool {
        self.indexes.contains(&branch)
    }

    /// Serialize back into the wire shape
    pub fn to_value(&self) -> Value {
        json!({"indexes": self.indexes, "value": self.value})
    }
}
