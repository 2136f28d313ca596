//! Node type registry and handler contract
//!
//! Every node type is described by a [`NodeHandler`]: its ports, category,
//! default configuration, gating predicate, and async executor. Handlers are
//! registered in a [`NodeRegistry`] that is passed explicitly into the store
//! and engine; there is no ambient global registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::extensions::Extensions;
use crate::types::{NodeCategory, NodeId, NodePorts};

/// Inputs gathered for one node, keyed by input-port id
///
/// Each port maps to the ordered list of upstream values produced by the
/// edges feeding it, in priority order. Merging multiple values is the
/// executor's decision, not the engine's.
#[derive(Debug, Clone, Default)]
pub struct GatheredInputs {
    values: HashMap<String, Vec<Value>>,
}

impl GatheredInputs {
    /// Record the gathered values for a port
    pub fn insert(&mut self, port: impl Into<String>, values: Vec<Value>) {
        self.values.insert(port.into(), values);
    }

    /// All values gathered for a port, in priority order
    pub fn all(&self, port: &str) -> &[Value] {
        self.values.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The highest-priority value for a port, if any
    pub fn first(&self, port: &str) -> Option<&Value> {
        self.all(port).first()
    }

    /// Whether at least one value arrived on the port
    pub fn has(&self, port: &str) -> bool {
        !self.all(port).is_empty()
    }
}

/// Callback stateful nodes use to persist their own `data`
///
/// This is the only side effect an executor may have besides returning
/// outputs. Implementations serialize writes so two in-flight runs cannot
/// interleave mutations of the same node.
pub trait NodeDataSink: Send + Sync {
    fn persist(&self, node_id: NodeId, data: &Value);
}

/// Data sink that discards all writes
pub struct NullDataSink;

impl NodeDataSink for NullDataSink {
    fn persist(&self, _node_id: NodeId, _data: &Value) {}
}

/// Data sink that collects writes, for tests
pub struct VecDataSink {
    writes: std::sync::Mutex<Vec<(NodeId, Value)>>,
}

impl VecDataSink {
    pub fn new() -> Self {
        Self {
            writes: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// All recorded writes
    pub fn writes(&self) -> Vec<(NodeId, Value)> {
        self.writes.lock().unwrap().clone()
    }
}

impl Default for VecDataSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeDataSink for VecDataSink {
    fn persist(&self, node_id: NodeId, data: &Value) {
        self.writes.lock().unwrap().push((node_id, data.clone()));
    }
}

/// Execution context handed to a node's executor
pub struct NodeContext {
    /// Id of the node being executed
    pub node_id: NodeId,
    /// Id of the surrounding run
    pub run_id: String,
    /// The node's configuration
    pub data: Value,
    /// Gathered upstream values, per input port
    pub inputs: GatheredInputs,
    /// Injected collaborator services
    pub extensions: Arc<Extensions>,
    /// Cancelled when a superseding run aborts this one; executors must
    /// forward it into outbound async calls
    pub cancel: CancellationToken,
    /// Persistence callback for node-local state
    pub data_sink: Arc<dyn NodeDataSink>,
}

/// Behavior and metadata of one node type
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Unique type key (e.g. "llm-chat")
    fn node_type(&self) -> &'static str;

    /// Category for scheduling and palette grouping
    fn category(&self) -> NodeCategory;

    /// Declared input and output ports
    fn ports(&self) -> NodePorts;

    /// Configuration a freshly created node starts with
    fn default_data(&self) -> Value {
        json!({})
    }

    /// Whether this node participates in stage scheduling
    ///
    /// Process nodes always do; other categories may opt in through their
    /// configuration (e.g. a loader set to execute).
    fn acts_as_process(&self, _data: &Value) -> bool {
        self.category() == NodeCategory::Process
    }

    /// Gating predicate consulted before execution (default: run)
    fn should_run(&self, _ctx: &NodeContext) -> bool {
        true
    }

    /// Execute the node, returning a map from output-port id to value
    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>>;
}

/// Registry of node types
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its declared type key
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(handler.node_type().to_string(), handler);
    }

    /// Look up the handler for a node type
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }

    /// Whether a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// All registered type keys, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Registered handlers grouped by category, for palette listings
    pub fn by_category(&self) -> HashMap<NodeCategory, Vec<Arc<dyn NodeHandler>>> {
        let mut grouped: HashMap<NodeCategory, Vec<Arc<dyn NodeHandler>>> = HashMap::new();
        for handler in self.handlers.values() {
            grouped
                .entry(handler.category())
                .or_default()
                .push(handler.clone());
        }
        grouped
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override same-key entries in `self`.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.handlers.extend(other.handlers);
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
