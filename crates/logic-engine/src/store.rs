//! Graph document persistence
//!
//! `GraphStore` owns loading, migrating, and saving logic graphs through a
//! pluggable key-value layer, with optional push to a remote preset
//! endpoint. Loading never fails: an absent or corrupt document falls back
//! to the seed template. Saving always re-partitions flows first, and a
//! full commit also re-normalizes edge priorities.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{LogicEngineError, Result};
use crate::index::normalize_indices;
use crate::migrate::migrate;
use crate::partition::assign_flows_per_branch;
use crate::registry::NodeDataSink;
use crate::types::{LogicGraph, NodeId};

/// Raw JSON persistence, keyed by preset id
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory key-value store
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Key-value store backed by JSON files in a directory
///
/// The directory is created on first write.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

/// Remote preset-save endpoint
#[async_trait]
pub trait PresetSyncClient: Send + Sync {
    async fn save_preset(&self, preset_id: &str, preset_name: &str, graph: &Value) -> Result<()>;
}

/// HTTP implementation of the preset-save endpoint
pub struct HttpPresetSync {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPresetSync {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PresetSyncClient for HttpPresetSync {
    async fn save_preset(&self, preset_id: &str, preset_name: &str, graph: &Value) -> Result<()> {
        let body = json!({
            "preset_id": preset_id,
            "preset_name": preset_name,
            "graph": graph,
            "client_ts": unix_millis(),
        });

        log::debug!("pushing preset '{}' to {}", preset_id, self.endpoint);
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(LogicEngineError::storage(format!(
                "preset endpoint error ({status}): {detail}"
            )));
        }
        Ok(())
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Loads, migrates, and persists one preset's logic graph
pub struct GraphStore {
    kv: Arc<dyn KeyValueStore>,
    preset_id: String,
    preset_name: String,
    sync: Option<Arc<dyn PresetSyncClient>>,
    /// Serializes save/update so concurrent runs cannot interleave writes
    write_lock: Mutex<()>,
}

impl GraphStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, preset_id: impl Into<String>) -> Self {
        let preset_id = preset_id.into();
        Self {
            preset_name: preset_id.clone(),
            kv,
            preset_id,
            sync: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Set the display name pushed with remote saves
    pub fn with_preset_name(mut self, name: impl Into<String>) -> Self {
        self.preset_name = name.into();
        self
    }

    /// Enable remote preset sync on commit
    pub fn with_sync(mut self, sync: Arc<dyn PresetSyncClient>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Load the stored graph, repairing older shapes
    ///
    /// Never fails: an absent, unreadable, or unparseable document yields
    /// the seed template.
    pub fn load(&self) -> LogicGraph {
        let raw = match self.kv.get(&self.preset_id) {
            Ok(Some(raw)) => raw,
            Ok(None) => return seed_graph(),
            Err(e) => {
                log::warn!("preset '{}' unreadable ({}), seeding", self.preset_id, e);
                return seed_graph();
            }
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("preset '{}' corrupt ({}), seeding", self.preset_id, e);
                return seed_graph();
            }
        };

        match serde_json::from_value::<LogicGraph>(migrate(&parsed)) {
            Ok(graph) => graph,
            Err(e) => {
                log::warn!("preset '{}' unmigratable ({}), seeding", self.preset_id, e);
                seed_graph()
            }
        }
    }

    /// Re-partition flows and write the graph
    pub fn save(&self, graph: &mut LogicGraph) -> Result<()> {
        assign_flows_per_branch(graph);
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.kv
            .set(&self.preset_id, &serde_json::to_string(graph)?)
    }

    /// Full post-edit commit: partition, normalize edge priorities, write,
    /// and push to the remote endpoint when configured
    pub async fn commit(&self, graph: &mut LogicGraph) -> Result<()> {
        normalize_indices(graph);
        self.save(graph)?;

        if let Some(sync) = &self.sync {
            sync.save_preset(
                &self.preset_id,
                &self.preset_name,
                &serde_json::to_value(&*graph)?,
            )
            .await?;
        }
        Ok(())
    }

    /// Replace one node's `data`, serialized against concurrent writers
    ///
    /// This is the write path behind the engine's on-data-change callback.
    pub fn update_node_data(&self, node_id: NodeId, data: &Value) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let raw = self
            .kv
            .get(&self.preset_id)?
            .ok_or_else(|| LogicEngineError::storage(format!("preset '{}' not saved yet", self.preset_id)))?;
        let mut graph: LogicGraph = serde_json::from_str(&raw)?;

        let node = graph.find_node_mut(node_id).ok_or_else(|| {
            LogicEngineError::storage(format!("node {node_id} missing from stored graph"))
        })?;
        node.data = data.clone();

        self.kv
            .set(&self.preset_id, &serde_json::to_string(&graph)?)
    }
}

impl NodeDataSink for GraphStore {
    fn persist(&self, node_id: NodeId, data: &Value) {
        if let Err(e) = self.update_node_data(node_id, data) {
            log::warn!("node {} data not persisted: {}", node_id, e);
        }
    }
}

/// The starter pipeline a fresh or unrecoverable preset begins with
pub fn seed_graph() -> LogicGraph {
    let mut graph = LogicGraph::default();
    let trigger = graph.add_node("trigger", json!({}));
    let chat = graph.add_node("llm-chat", json!({"settings": {}}));
    let output = graph.add_node("text-output", json!({}));
    graph.add_edge(trigger, 0, chat, 0);
    graph.add_edge(chat, 0, output, 0);
    assign_flows_per_branch(&mut graph);
    graph
}
