//! Tags manager node
//!
//! Tracks tag lists per `(category, component)` entry, synchronized from
//! upstream snapshots and mutated by add/remove commands extracted from
//! model output. Tag identity is a normalized key (lowercase, diacritics
//! stripped, whitespace/underscore/hyphen collapsed) while display keeps
//! the first-seen casing. The node persists its ledger through the engine's
//! data sink and re-emits the composed lists every run.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use logic_engine::{NodeCategory, NodeContext, NodeHandler, NodePorts, PortDefinition, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::command::{parse_tag_commands, TagAction, TagCommand};

/// Normalized identity key of a tag
///
/// `"Red Dress"`, `"red_dress"`, and `"RED-DRESS "` all map to
/// `"red dress"`; diacritics and stray punctuation are stripped.
pub fn normalize_tag_key(tag: &str) -> String {
    let mut key = String::with_capacity(tag.len());
    let mut pending_space = false;
    for c in tag.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_space && !key.is_empty() {
                key.push(' ');
            }
            pending_space = false;
            key.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '_' || c == '-' {
            pending_space = true;
        }
    }
    key
}

/// One tracked `(category, component)` entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEntry {
    pub category: String,
    pub component: String,
    /// Active tags (display casing)
    #[serde(default)]
    pub current: Vec<String>,
    /// Tags excluded from the upstream set
    #[serde(default)]
    pub removed: Vec<String>,
    /// Emit nothing while the preceding component in this category has tags
    #[serde(default)]
    pub only_when_above_empty: bool,
    /// Fallback tags contributed to the aggregate when this entry emits empty
    #[serde(default)]
    pub custom_list: Vec<String>,
}

/// Composed node outputs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposedTags {
    /// `{category: {component: [tags]}}`
    pub tags: Value,
    /// Same shape, mirroring the suppression of `tags`
    pub removed: Value,
    /// Aggregated fallback tags from entries that emitted empty
    pub custom: Vec<String>,
}

/// The tags state machine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagLedger {
    #[serde(default)]
    pub entries: Vec<TagEntry>,
}

impl TagLedger {
    /// Read the ledger out of a node's `data` (unknown fields ignored)
    pub fn from_data(data: &Value) -> Self {
        serde_json::from_value(data.clone()).unwrap_or_default()
    }

    /// Write the ledger back into a node's `data`
    pub fn apply_to(&self, data: &mut Value) {
        if let Value::Object(map) = data {
            map.insert(
                "entries".to_string(),
                serde_json::to_value(&self.entries).unwrap_or_default(),
            );
        }
    }

    /// Replace `current` lists from an upstream `{category: {component: [tags]}}` snapshot
    ///
    /// Inbound tags are deduplicated by key; tags still listed in `removed`
    /// stay excluded, and removals whose tag left the snapshot are pruned.
    pub fn sync(&mut self, snapshot: &Value) {
        let Some(categories) = snapshot.as_object() else {
            return;
        };

        for entry in &mut self.entries {
            let Some(inbound) = find_entry(categories, &entry.category)
                .and_then(Value::as_object)
                .and_then(|components| find_entry(components, &entry.component))
                .and_then(Value::as_array)
            else {
                continue;
            };

            let removed_keys: HashSet<String> =
                entry.removed.iter().map(|t| normalize_tag_key(t)).collect();

            // Keep the casing a tag was first seen with
            let mut known: HashMap<String, String> = HashMap::new();
            for tag in entry.current.iter().chain(entry.removed.iter()) {
                known
                    .entry(normalize_tag_key(tag))
                    .or_insert_with(|| tag.clone());
            }

            let mut seen = HashSet::new();
            let mut current = Vec::new();
            let mut inbound_keys = HashSet::new();
            for value in inbound {
                let Some(raw) = value.as_str() else { continue };
                let key = normalize_tag_key(raw);
                if key.is_empty() {
                    continue;
                }
                inbound_keys.insert(key.clone());
                if removed_keys.contains(&key) || !seen.insert(key.clone()) {
                    continue;
                }
                let display = known
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| raw.trim().to_string());
                current.push(display);
            }
            entry.current = current;
            entry
                .removed
                .retain(|t| inbound_keys.contains(&normalize_tag_key(t)));
        }
    }

    /// Apply one extracted command to every matching entry
    ///
    /// Remove moves a tag from `current` to `removed`; add reverses that.
    /// Both are no-ops when the tag is absent from the source list.
    pub fn apply(&mut self, command: &TagCommand) {
        for entry in &mut self.entries {
            if let Some(filter) = &command.component_filter {
                if normalize_tag_key(filter) != normalize_tag_key(&entry.component) {
                    continue;
                }
            }
            if let Some(filter) = &command.category_filter {
                if normalize_tag_key(filter) != normalize_tag_key(&entry.category) {
                    continue;
                }
            }

            for tag in &command.tags {
                let key = normalize_tag_key(tag);
                match command.action {
                    TagAction::Remove => move_tag(&mut entry.current, &mut entry.removed, &key),
                    TagAction::Add => move_tag(&mut entry.removed, &mut entry.current, &key),
                }
            }
        }
    }

    /// Compose the node's outputs
    ///
    /// Entries are grouped by category in list order. A component emits
    /// empty when `only_when_above_empty` is set and the immediately
    /// preceding component of its category has at least one active tag;
    /// `removed` mirrors that suppression. Entries that emitted empty
    /// contribute their `custom_list` to the deduplicated aggregate.
    pub fn compose(&self) -> ComposedTags {
        let mut tags = Map::new();
        let mut removed = Map::new();
        let mut custom = Vec::new();
        let mut custom_seen = HashSet::new();
        let mut above_filled: HashMap<String, bool> = HashMap::new();

        for entry in &self.entries {
            let category_key = normalize_tag_key(&entry.category);
            let suppressed = entry.only_when_above_empty
                && above_filled.get(&category_key).copied().unwrap_or(false);

            let emitted: &[String] = if suppressed { &[] } else { &entry.current };
            let emitted_removed: &[String] = if suppressed { &[] } else { &entry.removed };

            if emitted.is_empty() {
                for tag in &entry.custom_list {
                    if custom_seen.insert(normalize_tag_key(tag)) {
                        custom.push(tag.clone());
                    }
                }
            }

            insert_nested(&mut tags, &entry.category, &entry.component, emitted);
            insert_nested(
                &mut removed,
                &entry.category,
                &entry.component,
                emitted_removed,
            );
            above_filled.insert(category_key, !entry.current.is_empty());
        }

        ComposedTags {
            tags: Value::Object(tags),
            removed: Value::Object(removed),
            custom,
        }
    }
}

/// Case-insensitive lookup by normalized name
fn find_entry<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    let wanted = normalize_tag_key(name);
    map.iter()
        .find(|(key, _)| normalize_tag_key(key) == wanted)
        .map(|(_, value)| value)
}

fn move_tag(source: &mut Vec<String>, dest: &mut Vec<String>, key: &str) {
    if let Some(pos) = source.iter().position(|t| normalize_tag_key(t) == key) {
        let tag = source.remove(pos);
        if !dest.iter().any(|t| normalize_tag_key(t) == key) {
            dest.push(tag);
        }
    }
}

fn insert_nested(map: &mut Map<String, Value>, category: &str, component: &str, tags: &[String]) {
    let slot = map
        .entry(category.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(components) = slot {
        components.insert(component.to_string(), json!(tags));
    }
}

/// Tags manager node
pub struct TagsNode;

impl TagsNode {
    /// Port ID for the upstream tag snapshot input
    pub const PORT_TAGS: &'static str = "tags";
    /// Port ID for the command payload input
    pub const PORT_COMMANDS: &'static str = "commands";
    /// Port ID for the flow gate input
    pub const PORT_FLOW: &'static str = "flow";
    /// Port ID for the active tags output
    pub const PORT_OUT_TAGS: &'static str = "tags";
    /// Port ID for the removed tags output
    pub const PORT_OUT_REMOVED: &'static str = "removed";
    /// Port ID for the aggregated fallback output
    pub const PORT_OUT_CUSTOM: &'static str = "custom";

    const DEFAULT_ADD_ALIAS: &'static str = "add_tags";
    const DEFAULT_REMOVE_ALIAS: &'static str = "remove_tags";
}

#[async_trait]
impl NodeHandler for TagsNode {
    fn node_type(&self) -> &'static str {
        "tags"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Process
    }

    fn ports(&self) -> NodePorts {
        NodePorts {
            inputs: vec![
                PortDefinition::new(Self::PORT_TAGS, "Tag Snapshot"),
                PortDefinition::new(Self::PORT_COMMANDS, "Commands"),
                PortDefinition::new(Self::PORT_FLOW, "Flow").gate(),
            ],
            outputs: vec![
                PortDefinition::new(Self::PORT_OUT_TAGS, "Tags"),
                PortDefinition::new(Self::PORT_OUT_REMOVED, "Removed"),
                PortDefinition::new(Self::PORT_OUT_CUSTOM, "Custom"),
            ],
        }
    }

    fn default_data(&self) -> Value {
        json!({
            "entries": [],
            "addAlias": Self::DEFAULT_ADD_ALIAS,
            "removeAlias": Self::DEFAULT_REMOVE_ALIAS,
        })
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HashMap<String, Value>> {
        let mut data = ctx.data.clone();
        let mut ledger = TagLedger::from_data(&data);

        for snapshot in ctx.inputs.all(Self::PORT_TAGS) {
            ledger.sync(snapshot);
        }

        let add_alias = data
            .get("addAlias")
            .and_then(Value::as_str)
            .unwrap_or(Self::DEFAULT_ADD_ALIAS)
            .to_string();
        let remove_alias = data
            .get("removeAlias")
            .and_then(Value::as_str)
            .unwrap_or(Self::DEFAULT_REMOVE_ALIAS)
            .to_string();

        let mut commands = Vec::new();
        for payload in ctx.inputs.all(Self::PORT_COMMANDS) {
            commands.extend(parse_tag_commands(payload, &add_alias, &remove_alias));
        }
        for command in &commands {
            ledger.apply(command);
        }

        log::debug!(
            "tags {}: {} command(s), {} entr(ies)",
            ctx.node_id,
            commands.len(),
            ledger.entries.len()
        );

        ledger.apply_to(&mut data);
        ctx.data_sink.persist(ctx.node_id, &data);

        let composed = ledger.compose();
        let mut outputs = HashMap::new();
        outputs.insert(Self::PORT_OUT_TAGS.to_string(), composed.tags);
        outputs.insert(Self::PORT_OUT_REMOVED.to_string(), composed.removed);
        outputs.insert(Self::PORT_OUT_CUSTOM.to_string(), json!(composed.custom));
        Ok(outputs)
    }
}
