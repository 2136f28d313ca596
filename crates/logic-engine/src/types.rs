//! Core types for logic graph documents
//!
//! These types define the persisted structure of a logic graph: nodes with
//! typed ports, edges with input-side priority ranks, and the flow ids
//! derived by the partitioner.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a node within a graph
pub type NodeId = i64;

/// Unique identifier for an edge within a graph
pub type EdgeId = i64;

/// Identifier of a flow (weakly-connected component), derived by the partitioner
pub type FlowId = i64;

/// Category of a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Data source nodes (triggers, prompts, loaders)
    Input,
    /// Computational nodes that participate in stage scheduling
    Process,
    /// Terminal sink nodes
    Output,
}

/// Definition of a single port on a node type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    /// Port identifier (used as the key in executor output maps)
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Output ports only: values on this port carry a flow signal that
    /// selects which downstream edges activate
    #[serde(default)]
    pub branching: bool,
    /// Input ports only: once at least one edge is wired here, a gathered
    /// value is required before the node may run
    #[serde(default)]
    pub gate: bool,
}

impl PortDefinition {
    /// Create a plain port
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            branching: false,
            gate: false,
        }
    }

    /// Mark this output port as branching
    pub fn branching(mut self) -> Self {
        self.branching = true;
        self
    }

    /// Mark this input port as a mandatory gate when wired
    pub fn gate(mut self) -> Self {
        self.gate = true;
        self
    }
}

/// Declared input and output ports of a node type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePorts {
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

/// A node instance in a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique identifier within the graph
    pub id: NodeId,
    /// Flow this node belongs to; recomputed by the partitioner, never hand-set
    #[serde(default)]
    pub flow_id: FlowId,
    /// Node type (key into the registry)
    #[serde(rename = "type")]
    pub node_type: String,
    /// Per-type configuration, opaque to the engine
    #[serde(default)]
    pub data: Value,
    /// Presentation fields (position, size, ...) the core does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// An edge connecting an output port to an input port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Unique identifier within the graph
    pub id: EdgeId,
    /// Source node
    pub from_node_id: NodeId,
    /// Source output-port index
    pub from_port: u32,
    /// Target node
    pub to_node_id: NodeId,
    /// Target input-port index
    pub to_port: u32,
    /// Priority rank within the `(to_node_id, to_port)` group, `1..N`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Presentation fields the core does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A complete logic graph document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogicGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl LogicGraph {
    /// Find a node by id
    pub fn find_node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by id (mutable)
    pub fn find_node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Find an edge by id
    pub fn find_edge(&self, id: EdgeId) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Edges terminating at the given node
    pub fn incoming_edges(&self, node_id: NodeId) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.to_node_id == node_id)
    }

    /// Edges originating at the given node
    pub fn outgoing_edges(&self, node_id: NodeId) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.from_node_id == node_id)
    }

    /// Next free node id (`max(existing) + 1`, starting at 1)
    pub fn next_node_id(&self) -> NodeId {
        self.nodes.iter().map(|n| n.id).max().unwrap_or(0) + 1
    }

    /// Next free edge id (`max(existing) + 1`, starting at 1)
    pub fn next_edge_id(&self) -> EdgeId {
        self.edges.iter().map(|e| e.id).max().unwrap_or(0) + 1
    }

    /// Add a node of the given type, returning its allocated id
    pub fn add_node(&mut self, node_type: impl Into<String>, data: Value) -> NodeId {
        let id = self.next_node_id();
        self.nodes.push(GraphNode {
            id,
            flow_id: 0,
            node_type: node_type.into(),
            data,
            extra: serde_json::Map::new(),
        });
        id
    }

    /// Add an edge, returning its allocated id
    ///
    /// The priority index is left unset; callers re-run index normalization
    /// after structural edits.
    pub fn add_edge(
        &mut self,
        from_node_id: NodeId,
        from_port: u32,
        to_node_id: NodeId,
        to_port: u32,
    ) -> EdgeId {
        let id = self.next_edge_id();
        self.edges.push(GraphEdge {
            id,
            from_node_id,
            from_port,
            to_node_id,
            to_port,
            index: None,
            extra: serde_json::Map::new(),
        });
        id
    }

    /// Remove a node and every edge attached to it
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<GraphNode> {
        let pos = self.nodes.iter().position(|n| n.id == node_id)?;
        let node = self.nodes.remove(pos);
        self.edges
            .retain(|e| e.from_node_id != node_id && e.to_node_id != node_id);
        Some(node)
    }

    /// Remove an edge by id
    pub fn remove_edge(&mut self, edge_id: EdgeId) -> Option<GraphEdge> {
        let pos = self.edges.iter().position(|e| e.id == edge_id)?;
        Some(self.edges.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_allocation() {
        let mut graph = LogicGraph::default();
        assert_eq!(graph.next_node_id(), 1);

        let a = graph.add_node("trigger", json!({}));
        let b = graph.add_node("llm-chat", json!({}));
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        // Removing a node never frees its id for reuse below the max
        graph.remove_node(a);
        assert_eq!(graph.add_node("trigger", json!({})), 3);
    }

    #[test]
    fn test_remove_node_drops_attached_edges() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("trigger", json!({}));
        let b = graph.add_node("text-output", json!({}));
        let c = graph.add_node("text-output", json!({}));
        graph.add_edge(a, 0, b, 0);
        graph.add_edge(a, 0, c, 0);

        graph.remove_node(a);
        assert!(graph.edges.is_empty());
        assert_eq!(graph.nodes.len(), 2);
    }

    #[test]
    fn test_incoming_outgoing() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("trigger", json!({}));
        let b = graph.add_node("join", json!({}));
        graph.add_edge(a, 0, b, 0);
        graph.add_edge(a, 0, b, 1);

        assert_eq!(graph.incoming_edges(b).count(), 2);
        assert_eq!(graph.outgoing_edges(a).count(), 2);
        assert_eq!(graph.incoming_edges(a).count(), 0);
    }

    #[test]
    fn test_wire_format() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("trigger", json!({}));
        let b = graph.add_node("text-output", json!({}));
        graph.add_edge(a, 0, b, 0);

        let doc = serde_json::to_value(&graph).unwrap();
        assert_eq!(doc["nodes"][0]["id"], 1);
        assert_eq!(doc["nodes"][0]["flow_id"], 0);
        assert_eq!(doc["nodes"][0]["type"], "trigger");
        assert_eq!(doc["edges"][0]["fromNodeId"], 1);
        assert_eq!(doc["edges"][0]["toNodeId"], 2);
        assert_eq!(doc["edges"][0]["fromPort"], 0);
    }

    #[test]
    fn test_presentation_fields_survive_roundtrip() {
        let raw = json!({
            "nodes": [
                {"id": 1, "flow_id": 0, "type": "trigger", "data": {},
                 "position": {"x": 40, "y": 80}, "width": 220}
            ],
            "edges": []
        });

        let graph: LogicGraph = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&graph).unwrap();
        assert_eq!(back["nodes"][0]["position"]["x"], 40);
        assert_eq!(back["nodes"][0]["width"], 220);
    }
}
