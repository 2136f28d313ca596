//! Stage-driven execution of logic graphs
//!
//! A run is driven by a host trigger naming a stage (or a single node). For
//! every targeted node the engine gathers upstream values along the edge
//! priority order, consults the gating predicate, invokes the node's
//! executor, and records its outputs for the next stage. Failures are
//! isolated per node: a throwing executor becomes an error-shaped value on
//! its primary output, and siblings keep running.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{LogicEngineError, Result};
use crate::events::{NullEventSink, RunEvent, RunEventSink};
use crate::extensions::Extensions;
use crate::index;
use crate::registry::{GatheredInputs, NodeContext, NodeDataSink, NodeRegistry, NullDataSink};
use crate::signal::FlowSignal;
use crate::stages;
use crate::types::{FlowId, GraphEdge, LogicGraph, NodeCategory, NodeId, NodePorts};

/// Mutable state of one run
///
/// Holds the outputs every executed node produced, keyed by node id and
/// output-port id. Reads during input gathering see stable snapshots; a
/// node's outputs are recorded in one step after its executor returns.
pub struct RunState {
    /// Identifier shared by all events of this run
    pub run_id: String,
    /// Cancelled to abort in-flight executors of a superseded run
    pub cancel: CancellationToken,
    outputs: HashMap<NodeId, HashMap<String, Value>>,
    executed: u32,
}

impl RunState {
    /// Create a fresh run with a unique id
    pub fn new() -> Self {
        Self {
            run_id: format!("run-{}", Uuid::new_v4()),
            cancel: CancellationToken::new(),
            outputs: HashMap::new(),
            executed: 0,
        }
    }

    /// The recorded outputs of a node, if it executed
    pub fn outputs_for(&self, node_id: NodeId) -> Option<&HashMap<String, Value>> {
        self.outputs.get(&node_id)
    }

    /// Record the outputs of an executed node
    pub fn record(&mut self, node_id: NodeId, outputs: HashMap<String, Value>) {
        self.outputs.insert(node_id, outputs);
    }

    /// Number of nodes executed so far
    pub fn executed(&self) -> u32 {
        self.executed
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates stage and node execution over a logic graph
pub struct ExecutionEngine {
    registry: Arc<NodeRegistry>,
    events: Arc<dyn RunEventSink>,
    extensions: Arc<Extensions>,
    data_sink: Arc<dyn NodeDataSink>,
    /// Upper bound on executed nodes per run (runaway protection)
    max_nodes: u32,
}

impl ExecutionEngine {
    /// Create an engine over the given registry
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            events: Arc::new(NullEventSink),
            extensions: Arc::new(Extensions::new()),
            data_sink: Arc::new(NullDataSink),
            max_nodes: 1000,
        }
    }

    /// Set the event sink observing this engine's runs
    pub fn with_events(mut self, events: Arc<dyn RunEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Inject collaborator services available to executors
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    /// Set the persistence callback for stateful nodes
    pub fn with_data_sink(mut self, data_sink: Arc<dyn NodeDataSink>) -> Self {
        self.data_sink = data_sink;
        self
    }

    /// Set the executed-node cap per run
    pub fn with_max_nodes(mut self, max_nodes: u32) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// The registry this engine dispatches against
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Gather the inputs of a node from upstream outputs
    ///
    /// Every declared input port maps to the ordered list of values produced
    /// by the edges terminating there, in priority order. Values behind a
    /// branching source port are filtered by the flow signal's branch list.
    pub fn gather_inputs(
        &self,
        graph: &LogicGraph,
        node_id: NodeId,
        state: &RunState,
    ) -> GatheredInputs {
        let mut gathered = GatheredInputs::default();
        let Some(node) = graph.find_node(node_id) else {
            return gathered;
        };
        let Some(handler) = self.registry.get(&node.node_type) else {
            return gathered;
        };

        for (port_index, port) in handler.ports().inputs.iter().enumerate() {
            let mut values = Vec::new();
            for edge in index::ordered_inputs(graph, &self.registry, node_id, port_index as u32) {
                if let Some(value) = self.upstream_value(graph, edge, state) {
                    values.push(value);
                }
            }
            gathered.insert(port.id.clone(), values);
        }
        gathered
    }

    /// Execute all nodes of one stage, sequentially in node order
    pub async fn run_stage(
        &self,
        graph: &LogicGraph,
        schedule: &HashMap<NodeId, u32>,
        stage: u32,
        state: &mut RunState,
    ) -> Result<()> {
        let targets: Vec<NodeId> = graph
            .nodes
            .iter()
            .filter(|n| schedule.get(&n.id) == Some(&stage))
            .map(|n| n.id)
            .collect();

        log::debug!("run {}: stage {} with {} node(s)", state.run_id, stage, targets.len());
        for node_id in targets {
            self.run_node(graph, node_id, state).await?;
        }
        Ok(())
    }

    /// Execute a single node
    ///
    /// Executor failures are captured into an error-shaped output; only
    /// engine-level problems (unknown type, run cap) surface as errors.
    pub async fn run_node(
        &self,
        graph: &LogicGraph,
        node_id: NodeId,
        state: &mut RunState,
    ) -> Result<()> {
        let node = graph
            .find_node(node_id)
            .ok_or_else(|| LogicEngineError::failed(format!("node {node_id} not in graph")))?;
        let handler = self
            .registry
            .get(&node.node_type)
            .ok_or_else(|| LogicEngineError::UnknownNodeType(node.node_type.clone()))?;

        if state.executed >= self.max_nodes {
            return Err(LogicEngineError::failed(format!(
                "execution limit reached ({} nodes)",
                self.max_nodes
            )));
        }
        state.executed += 1;

        let ports = handler.ports();
        let inputs = self.gather_inputs(graph, node_id, state);

        if self.gated(graph, node_id, &ports, &inputs) {
            log::debug!("run {}: node {} gated, skipping", state.run_id, node_id);
            return Ok(());
        }

        let ctx = NodeContext {
            node_id,
            run_id: state.run_id.clone(),
            data: node.data.clone(),
            inputs,
            extensions: self.extensions.clone(),
            cancel: state.cancel.child_token(),
            data_sink: self.data_sink.clone(),
        };

        if !handler.should_run(&ctx) {
            log::debug!("run {}: node {} declined to run", state.run_id, node_id);
            return Ok(());
        }

        self.emit(RunEvent::NodeRunStart {
            node_id,
            run_id: state.run_id.clone(),
        });

        let outputs = match handler.execute(ctx).await {
            Ok(outputs) => outputs,
            Err(err) => {
                log::warn!("run {}: node {} failed: {}", state.run_id, node_id, err);
                error_outputs(&ports, &err)
            }
        };
        state.record(node_id, outputs);

        self.emit(RunEvent::NodeRunEnd {
            node_id,
            run_id: state.run_id.clone(),
        });
        Ok(())
    }

    /// Run one flow end to end: input nodes, then every stage, then outputs
    pub async fn run_flow(&self, graph: &LogicGraph, flow_id: FlowId) -> Result<RunState> {
        let mut state = RunState::new();
        let schedule = stages::compute_stages(graph, &self.registry);

        let in_flow = |node: &crate::types::GraphNode| node.flow_id == flow_id;

        // Seed: unscheduled input-category nodes produce their values first
        let seeds: Vec<NodeId> = graph
            .nodes
            .iter()
            .filter(|n| in_flow(n) && !schedule.contains_key(&n.id))
            .filter(|n| {
                self.registry
                    .get(&n.node_type)
                    .map(|h| h.category() == NodeCategory::Input)
                    .unwrap_or(false)
            })
            .map(|n| n.id)
            .collect();
        for node_id in seeds {
            self.run_node(graph, node_id, &mut state).await?;
        }

        for stage in 1..=stages::max_stage(&schedule) {
            let targets: Vec<NodeId> = graph
                .nodes
                .iter()
                .filter(|n| in_flow(n) && schedule.get(&n.id) == Some(&stage))
                .map(|n| n.id)
                .collect();
            for node_id in targets {
                self.run_node(graph, node_id, &mut state).await?;
            }
        }

        // Drain: output-category sinks
        let sinks: Vec<NodeId> = graph
            .nodes
            .iter()
            .filter(|n| in_flow(n))
            .filter(|n| {
                self.registry
                    .get(&n.node_type)
                    .map(|h| h.category() == NodeCategory::Output)
                    .unwrap_or(false)
            })
            .map(|n| n.id)
            .collect();
        for node_id in sinks {
            self.run_node(graph, node_id, &mut state).await?;
        }

        Ok(state)
    }

    /// Whether a mandatory gate blocks this node
    ///
    /// A gate port only binds once something is wired to it; then a gathered
    /// value must be present.
    fn gated(
        &self,
        graph: &LogicGraph,
        node_id: NodeId,
        ports: &NodePorts,
        inputs: &GatheredInputs,
    ) -> bool {
        ports.inputs.iter().enumerate().any(|(port_index, port)| {
            port.gate
                && !index::ordered_inputs(graph, &self.registry, node_id, port_index as u32)
                    .is_empty()
                && !inputs.has(&port.id)
        })
    }

    /// The value an edge delivers, honoring branching on its source port
    fn upstream_value(
        &self,
        graph: &LogicGraph,
        edge: &GraphEdge,
        state: &RunState,
    ) -> Option<Value> {
        let from = graph.find_node(edge.from_node_id)?;
        let handler = self.registry.get(&from.node_type)?;
        let outputs = handler.ports().outputs;
        let port = outputs.get(edge.from_port as usize)?;
        let value = state.outputs_for(edge.from_node_id)?.get(&port.id)?;

        if !port.branching {
            return Some(value.clone());
        }
        match FlowSignal::parse(value) {
            Some(signal) => {
                if signal.activates(branch_number(graph, edge)) {
                    Some(signal.value)
                } else {
                    None
                }
            }
            // Not a signal: tolerated, delivered to every edge
            None => Some(value.clone()),
        }
    }

    fn emit(&self, event: RunEvent) {
        let _ = self.events.send(event);
    }
}

/// The branch number of an edge leaving a branching output port
///
/// Edges of one `(from_node_id, from_port)` group are numbered 0-based in
/// edge-id order.
fn branch_number(graph: &LogicGraph, edge: &GraphEdge) -> u32 {
    let mut siblings: Vec<i64> = graph
        .edges
        .iter()
        .filter(|e| e.from_node_id == edge.from_node_id && e.from_port == edge.from_port)
        .map(|e| e.id)
        .collect();
    siblings.sort_unstable();
    siblings.iter().position(|&id| id == edge.id).unwrap_or(0) as u32
}

/// The well-formed output a failed node still delivers downstream
fn error_outputs(ports: &NodePorts, err: &LogicEngineError) -> HashMap<String, Value> {
    let message = match err {
        LogicEngineError::ExecutionFailed(msg) => msg.clone(),
        other => other.to_string(),
    };
    let mut outputs = HashMap::new();
    if let Some(primary) = ports.outputs.first() {
        outputs.insert(
            primary.id.clone(),
            json!({"role": "assistant", "content": format!("(Error: {message})")}),
        );
    }
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecEventSink;
    use crate::index::normalize_indices;
    use crate::partition::assign_flows_per_branch;
    use crate::registry::NodeHandler;
    use crate::types::PortDefinition;
    use async_trait::async_trait;

    struct SourceNode;

    #[async_trait]
    impl NodeHandler for SourceNode {
        fn node_type(&self) -> &'static str {
            "source"
        }
        fn category(&self) -> NodeCategory {
            NodeCategory::Input
        }
        fn ports(&self) -> NodePorts {
            NodePorts {
                inputs: vec![],
                outputs: vec![PortDefinition::new("out", "Out")],
            }
        }
        async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
            let mut outputs = HashMap::new();
            outputs.insert(
                "out".to_string(),
                ctx.data.get("value").cloned().unwrap_or(Value::Null),
            );
            Ok(outputs)
        }
    }

    struct CollectNode;

    #[async_trait]
    impl NodeHandler for CollectNode {
        fn node_type(&self) -> &'static str {
            "collect"
        }
        fn category(&self) -> NodeCategory {
            NodeCategory::Process
        }
        fn ports(&self) -> NodePorts {
            NodePorts {
                inputs: vec![
                    PortDefinition::new("items", "Items"),
                    PortDefinition::new("flow", "Flow").gate(),
                ],
                outputs: vec![PortDefinition::new("list", "List")],
            }
        }
        async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
            let mut outputs = HashMap::new();
            outputs.insert("list".to_string(), json!(ctx.inputs.all("items")));
            Ok(outputs)
        }
    }

    struct FailingNode;

    #[async_trait]
    impl NodeHandler for FailingNode {
        fn node_type(&self) -> &'static str {
            "failing"
        }
        fn category(&self) -> NodeCategory {
            NodeCategory::Process
        }
        fn ports(&self) -> NodePorts {
            NodePorts {
                inputs: vec![PortDefinition::new("in", "In")],
                outputs: vec![
                    PortDefinition::new("message", "Message"),
                    PortDefinition::new("extra", "Extra"),
                ],
            }
        }
        async fn execute(&self, _ctx: NodeContext) -> Result<HashMap<String, Value>> {
            Err(LogicEngineError::failed("network timeout"))
        }
    }

    struct SplitterNode;

    #[async_trait]
    impl NodeHandler for SplitterNode {
        fn node_type(&self) -> &'static str {
            "splitter"
        }
        fn category(&self) -> NodeCategory {
            NodeCategory::Process
        }
        fn ports(&self) -> NodePorts {
            NodePorts {
                inputs: vec![],
                outputs: vec![PortDefinition::new("match", "Match").branching()],
            }
        }
        async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
            let branch = ctx.data.get("branch").and_then(Value::as_u64).unwrap_or(0) as u32;
            let mut outputs = HashMap::new();
            outputs.insert(
                "match".to_string(),
                FlowSignal::single(branch, json!("chosen")).to_value(),
            );
            Ok(outputs)
        }
    }

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(SourceNode));
        registry.register(Arc::new(CollectNode));
        registry.register(Arc::new(FailingNode));
        registry.register(Arc::new(SplitterNode));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_gather_respects_priority_order() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("source", json!({"value": "first-created"}));
        let b = graph.add_node("source", json!({"value": "second-created"}));
        let sink = graph.add_node("collect", json!({}));
        graph.add_edge(a, 0, sink, 0);
        graph.add_edge(b, 0, sink, 0);
        // Stored indices [2, 1]: the later edge outranks the earlier one
        graph.edges[0].index = Some(2);
        graph.edges[1].index = Some(1);
        normalize_indices(&mut graph);

        let engine = ExecutionEngine::new(registry());
        let mut state = RunState::new();
        engine.run_node(&graph, a, &mut state).await.unwrap();
        engine.run_node(&graph, b, &mut state).await.unwrap();

        let inputs = engine.gather_inputs(&graph, sink, &state);
        assert_eq!(
            inputs.all("items"),
            &[json!("second-created"), json!("first-created")]
        );
    }

    #[tokio::test]
    async fn test_failure_isolated_to_one_node() {
        let mut graph = LogicGraph::default();
        let bad = graph.add_node("failing", json!({}));
        let good = graph.add_node("collect", json!({}));

        let engine = ExecutionEngine::new(registry());
        let mut state = RunState::new();
        let schedule = stages::compute_stages(&graph, engine.registry());
        engine
            .run_stage(&graph, &schedule, 1, &mut state)
            .await
            .unwrap();

        // Failed node produced a well-formed error payload on its primary port
        let outputs = state.outputs_for(bad).unwrap();
        assert_eq!(
            outputs.get("message"),
            Some(&json!({"role": "assistant", "content": "(Error: network timeout)"}))
        );
        assert!(outputs.get("extra").is_none());

        // The sibling still executed
        assert!(state.outputs_for(good).is_some());
    }

    #[tokio::test]
    async fn test_branching_activates_only_matching_edge() {
        let mut graph = LogicGraph::default();
        let splitter = graph.add_node("splitter", json!({"branch": 2}));
        let t0 = graph.add_node("collect", json!({}));
        let t1 = graph.add_node("collect", json!({}));
        let t2 = graph.add_node("collect", json!({}));
        graph.add_edge(splitter, 0, t0, 0);
        graph.add_edge(splitter, 0, t1, 0);
        graph.add_edge(splitter, 0, t2, 0);

        let engine = ExecutionEngine::new(registry());
        let mut state = RunState::new();
        engine.run_node(&graph, splitter, &mut state).await.unwrap();

        assert!(engine.gather_inputs(&graph, t0, &state).all("items").is_empty());
        assert!(engine.gather_inputs(&graph, t1, &state).all("items").is_empty());
        assert_eq!(
            engine.gather_inputs(&graph, t2, &state).all("items"),
            &[json!("chosen")]
        );
    }

    #[tokio::test]
    async fn test_non_signal_on_branching_port_passes_through() {
        struct RawSplitter;

        #[async_trait]
        impl NodeHandler for RawSplitter {
            fn node_type(&self) -> &'static str {
                "raw-splitter"
            }
            fn category(&self) -> NodeCategory {
                NodeCategory::Process
            }
            fn ports(&self) -> NodePorts {
                NodePorts {
                    inputs: vec![],
                    outputs: vec![PortDefinition::new("match", "Match").branching()],
                }
            }
            async fn execute(&self, _ctx: NodeContext) -> Result<HashMap<String, Value>> {
                let mut outputs = HashMap::new();
                outputs.insert("match".to_string(), json!("plain"));
                Ok(outputs)
            }
        }

        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(RawSplitter));
        registry.register(Arc::new(CollectNode));

        let mut graph = LogicGraph::default();
        let splitter = graph.add_node("raw-splitter", json!({}));
        let t0 = graph.add_node("collect", json!({}));
        let t1 = graph.add_node("collect", json!({}));
        graph.add_edge(splitter, 0, t0, 0);
        graph.add_edge(splitter, 0, t1, 0);

        let engine = ExecutionEngine::new(Arc::new(registry));
        let mut state = RunState::new();
        engine.run_node(&graph, splitter, &mut state).await.unwrap();

        assert_eq!(engine.gather_inputs(&graph, t0, &state).all("items"), &[json!("plain")]);
        assert_eq!(engine.gather_inputs(&graph, t1, &state).all("items"), &[json!("plain")]);
    }

    #[tokio::test]
    async fn test_wired_gate_blocks_until_value_arrives() {
        let mut graph = LogicGraph::default();
        let feeder = graph.add_node("source", json!({"value": "go"}));
        let item = graph.add_node("source", json!({"value": "x"}));
        let sink = graph.add_node("collect", json!({}));
        graph.add_edge(item, 0, sink, 0);
        graph.add_edge(feeder, 0, sink, 1); // wired to the gate port

        let engine = ExecutionEngine::new(registry());
        let mut state = RunState::new();
        engine.run_node(&graph, item, &mut state).await.unwrap();

        // Gate wired but the feeder has not produced yet: node skipped
        engine.run_node(&graph, sink, &mut state).await.unwrap();
        assert!(state.outputs_for(sink).is_none());

        // Once the gate value exists the node runs
        engine.run_node(&graph, feeder, &mut state).await.unwrap();
        engine.run_node(&graph, sink, &mut state).await.unwrap();
        assert!(state.outputs_for(sink).is_some());
    }

    #[tokio::test]
    async fn test_unwired_gate_does_not_block() {
        let mut graph = LogicGraph::default();
        let item = graph.add_node("source", json!({"value": "x"}));
        let sink = graph.add_node("collect", json!({}));
        graph.add_edge(item, 0, sink, 0);

        let engine = ExecutionEngine::new(registry());
        let mut state = RunState::new();
        engine.run_node(&graph, item, &mut state).await.unwrap();
        engine.run_node(&graph, sink, &mut state).await.unwrap();

        assert_eq!(
            state.outputs_for(sink).unwrap().get("list"),
            Some(&json!(["x"]))
        );
    }

    #[tokio::test]
    async fn test_run_flow_stays_inside_its_flow() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("source", json!({"value": "flow0"}));
        let sink_a = graph.add_node("collect", json!({}));
        graph.add_edge(a, 0, sink_a, 0);
        let b = graph.add_node("source", json!({"value": "flow1"}));
        let sink_b = graph.add_node("collect", json!({}));
        graph.add_edge(b, 0, sink_b, 0);
        assign_flows_per_branch(&mut graph);

        let engine = ExecutionEngine::new(registry());
        let state = engine.run_flow(&graph, 0).await.unwrap();

        assert!(state.outputs_for(a).is_some());
        assert!(state.outputs_for(sink_a).is_some());
        assert!(state.outputs_for(b).is_none());
        assert!(state.outputs_for(sink_b).is_none());
    }

    #[tokio::test]
    async fn test_events_emitted_per_node() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("source", json!({"value": 1}));

        let sink = Arc::new(VecEventSink::new());
        let engine = ExecutionEngine::new(registry()).with_events(sink.clone());
        let mut state = RunState::new();
        engine.run_node(&graph, a, &mut state).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RunEvent::NodeRunStart { node_id, .. } if node_id == a));
        assert!(matches!(events[1], RunEvent::NodeRunEnd { node_id, .. } if node_id == a));
    }

    #[tokio::test]
    async fn test_run_cap_enforced() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("source", json!({"value": 1}));
        let b = graph.add_node("source", json!({"value": 2}));

        let engine = ExecutionEngine::new(registry()).with_max_nodes(1);
        let mut state = RunState::new();
        engine.run_node(&graph, a, &mut state).await.unwrap();
        assert!(engine.run_node(&graph, b, &mut state).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_node_type_errors() {
        let mut graph = LogicGraph::default();
        let ghost = graph.add_node("not-registered", json!({}));

        let engine = ExecutionEngine::new(registry());
        let mut state = RunState::new();
        let result = engine.run_node(&graph, ghost, &mut state).await;
        assert!(matches!(result, Err(LogicEngineError::UnknownNodeType(_))));
    }
}
