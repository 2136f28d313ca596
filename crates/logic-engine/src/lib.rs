//! Logic Engine - node-graph pipeline execution for Loomflow
//!
//! This crate models an LLM-orchestration pipeline as a typed dataflow
//! graph: nodes with multiple input/output ports, edges with priority
//! ordering and branching semantics, automatic partitioning into
//! independently-triggerable flows, and topological stage scheduling of
//! computational nodes.
//!
//! # Architecture
//!
//! - `GraphStore`: loads, migrates, and persists the graph document
//! - `assign_flows_per_branch`: labels weakly-connected components
//! - `normalize_indices` / `reindex`: edge priority ordering per input port
//! - `compute_stages`: Kahn leveling of process nodes
//! - `ExecutionEngine`: gathers inputs, dispatches node executors, handles
//!   branching and per-node failure
//! - `NodeRegistry`: explicit registry of [`registry::NodeHandler`]
//!   implementations, injected into store and engine (no ambient globals)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use logic_engine::{ExecutionEngine, GraphStore, MemoryStore, NodeRegistry};
//!
//! let mut registry = NodeRegistry::new();
//! // registry.register(Arc::new(MyNode)); ...
//!
//! let store = GraphStore::new(Arc::new(MemoryStore::new()), "preset-1");
//! let graph = store.load();
//! let engine = ExecutionEngine::new(Arc::new(registry));
//! let state = engine.run_flow(&graph, 0).await?;
//! ```

pub mod engine;
pub mod error;
pub mod events;
pub mod extensions;
pub mod index;
pub mod migrate;
pub mod partition;
pub mod registry;
pub mod signal;
pub mod stages;
pub mod store;
pub mod types;

// Re-export key types
pub use engine::{ExecutionEngine, RunState};
pub use error::{LogicEngineError, Result};
pub use events::{NullEventSink, RunEvent, RunEventSink, VecEventSink};
pub use extensions::Extensions;
pub use index::{normalize_indices, ordered_inputs, reindex};
pub use migrate::migrate;
pub use partition::assign_flows_per_branch;
pub use registry::{
    GatheredInputs, NodeContext, NodeDataSink, NodeHandler, NodeRegistry, NullDataSink,
    VecDataSink,
};
pub use signal::FlowSignal;
pub use stages::{compute_stages, max_stage, unscheduled_process_nodes};
pub use store::{
    seed_graph, FileStore, GraphStore, HttpPresetSync, KeyValueStore, MemoryStore,
    PresetSyncClient,
};
pub use types::{
    EdgeId, FlowId, GraphEdge, GraphNode, LogicGraph, NodeCategory, NodeId, NodePorts,
    PortDefinition,
};

// Re-export the cancellation token executors receive
pub use tokio_util::sync::CancellationToken;
