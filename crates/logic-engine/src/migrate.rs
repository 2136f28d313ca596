//! Non-destructive migration of persisted graph documents
//!
//! Older clients stored string node ids, port-less `{from, to}` edges, and
//! deprecated type names. [`migrate`] repairs those shapes on the raw JSON
//! document before the typed model parses it. It never removes nodes or
//! edges, and running it over already-migrated data is a no-op.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

/// Deprecated node type names and their current spellings
const TYPE_ALIASES: &[(&str, &str)] = &[
    ("llm", "llm-chat"),
    ("output", "text-output"),
    ("tag-manager", "tags"),
];

/// Repair an older graph document into the canonical shape
///
/// Node and edge ids are coerced to numbers through a remap table so legacy
/// string ids stay consistent between nodes and the edges referencing them.
/// Unrecognized fields are preserved untouched.
pub fn migrate(doc: &Value) -> Value {
    let mut root = match doc {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    let raw_nodes = take_array(root.get("nodes"));
    let raw_edges = take_array(root.get("edges"));

    let mut remap: HashMap<String, i64> = HashMap::new();
    let mut next_node_id = max_id(&raw_nodes) + 1;

    let mut nodes = Vec::with_capacity(raw_nodes.len());
    for raw in &raw_nodes {
        let mut node = raw.as_object().cloned().unwrap_or_default();

        let id = match coerce_id(node.get("id")) {
            Some(id) => id,
            None => {
                let id = next_node_id;
                next_node_id += 1;
                id
            }
        };
        if let Some(original) = raw.get("id") {
            remap.insert(original.to_string(), id);
        }
        node.insert("id".to_string(), json!(id));

        if coerce_id(node.get("flow_id")).is_none() {
            node.insert("flow_id".to_string(), json!(0));
        }

        match node.get("type").and_then(|t| t.as_str()) {
            Some(ty) => {
                if let Some((_, renamed)) = TYPE_ALIASES.iter().find(|(old, _)| *old == ty) {
                    node.insert("type".to_string(), json!(renamed));
                }
            }
            // Typeless nodes are kept inert rather than dropped
            None => {
                node.insert("type".to_string(), json!(""));
            }
        }

        if !node.contains_key("data") {
            node.insert("data".to_string(), json!({}));
        }

        nodes.push(Value::Object(node));
    }

    let mut next_edge_id = max_id(&raw_edges) + 1;
    let mut edges = Vec::with_capacity(raw_edges.len());
    for raw in &raw_edges {
        let mut edge = raw.as_object().cloned().unwrap_or_default();

        let id = match coerce_id(edge.get("id")) {
            Some(id) => id,
            None => {
                let id = next_edge_id;
                next_edge_id += 1;
                id
            }
        };
        edge.insert("id".to_string(), json!(id));

        // Legacy shape: {from, to} with no port indexes
        if !edge.contains_key("fromNodeId") {
            if let Some(from) = edge.remove("from") {
                edge.insert("fromNodeId".to_string(), from);
                edge.insert("fromPort".to_string(), json!(0));
            }
        }
        if !edge.contains_key("toNodeId") {
            if let Some(to) = edge.remove("to") {
                edge.insert("toNodeId".to_string(), to);
                edge.insert("toPort".to_string(), json!(0));
            }
        }

        for endpoint in ["fromNodeId", "toNodeId"] {
            let resolved = edge
                .get(endpoint)
                .and_then(|v| remap.get(&v.to_string()).copied())
                .or_else(|| coerce_id(edge.get(endpoint)))
                .unwrap_or_else(|| {
                    // Reference to a node this document never declared; keep
                    // the edge, pointing at a fresh id no node will claim.
                    let id = next_node_id;
                    next_node_id += 1;
                    id
                });
            edge.insert(endpoint.to_string(), json!(resolved));
        }

        for port in ["fromPort", "toPort"] {
            let resolved = coerce_id(edge.get(port)).filter(|&p| p >= 0).unwrap_or(0);
            edge.insert(port.to_string(), json!(resolved));
        }

        match coerce_id(edge.get("index")) {
            Some(index) if index >= 1 => {
                edge.insert("index".to_string(), json!(index));
            }
            _ => {
                edge.remove("index");
            }
        }

        edges.push(Value::Object(edge));
    }

    root.insert("nodes".to_string(), Value::Array(nodes));
    root.insert("edges".to_string(), Value::Array(edges));
    Value::Object(root)
}

fn take_array(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

fn coerce_id(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn max_id(items: &[Value]) -> i64 {
    items
        .iter()
        .filter_map(|item| coerce_id(item.get("id")))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogicGraph;

    #[test]
    fn test_string_ids_remapped_consistently() {
        let doc = json!({
            "nodes": [
                {"id": "start", "type": "trigger"},
                {"id": 7, "type": "llm-chat"}
            ],
            "edges": [
                {"id": "e1", "fromNodeId": "start", "fromPort": 0, "toNodeId": 7, "toPort": 0}
            ]
        });

        let migrated = migrate(&doc);
        let start_id = migrated["nodes"][0]["id"].as_i64().unwrap();
        assert_eq!(start_id, 8); // max numeric id 7, so "start" becomes 8
        assert_eq!(migrated["edges"][0]["fromNodeId"], start_id);
        assert_eq!(migrated["edges"][0]["toNodeId"], 7);

        // The repaired document parses into the typed model
        assert!(serde_json::from_value::<LogicGraph>(migrated).is_ok());
    }

    #[test]
    fn test_legacy_edge_shape_upgraded() {
        let doc = json!({
            "nodes": [{"id": 1, "type": "trigger"}, {"id": 2, "type": "text-output"}],
            "edges": [{"id": 1, "from": 1, "to": 2}]
        });

        let migrated = migrate(&doc);
        let edge = &migrated["edges"][0];
        assert_eq!(edge["fromNodeId"], 1);
        assert_eq!(edge["fromPort"], 0);
        assert_eq!(edge["toNodeId"], 2);
        assert_eq!(edge["toPort"], 0);
        assert!(edge.get("from").is_none());
    }

    #[test]
    fn test_type_aliases_renamed() {
        let doc = json!({
            "nodes": [
                {"id": 1, "type": "llm"},
                {"id": 2, "type": "tag-manager"},
                {"id": 3, "type": "output"}
            ],
            "edges": []
        });

        let migrated = migrate(&doc);
        assert_eq!(migrated["nodes"][0]["type"], "llm-chat");
        assert_eq!(migrated["nodes"][1]["type"], "tags");
        assert_eq!(migrated["nodes"][2]["type"], "text-output");
    }

    #[test]
    fn test_flow_id_defaults_to_zero() {
        let doc = json!({"nodes": [{"id": 1, "type": "trigger"}], "edges": []});
        let migrated = migrate(&doc);
        assert_eq!(migrated["nodes"][0]["flow_id"], 0);
    }

    #[test]
    fn test_idempotent() {
        let doc = json!({
            "nodes": [
                {"id": "a", "type": "llm", "position": {"x": 1, "y": 2}},
                {"id": "b", "type": "tag-manager"}
            ],
            "edges": [
                {"id": "e", "from": "a", "to": "b"},
                {"id": 9, "fromNodeId": "b", "fromPort": 1, "toNodeId": "a", "toPort": 2, "index": "3"}
            ],
            "meta": {"savedBy": "legacy-client"}
        });

        let once = migrate(&doc);
        let twice = migrate(&once);
        assert_eq!(once, twice);

        // Unknown fields are preserved through repair
        assert_eq!(once["meta"]["savedBy"], "legacy-client");
        assert_eq!(once["nodes"][0]["position"]["y"], 2);
    }

    #[test]
    fn test_typeless_node_kept_inert() {
        let doc = json!({"nodes": [{"id": 1}], "edges": []});
        let migrated = migrate(&doc);
        assert_eq!(migrated["nodes"][0]["type"], "");
        assert!(serde_json::from_value::<LogicGraph>(migrated).is_ok());
    }

    #[test]
    fn test_garbage_document_yields_empty_graph() {
        let migrated = migrate(&json!("not a graph"));
        assert_eq!(migrated["nodes"], json!([]));
        assert_eq!(migrated["edges"], json!([]));
    }

    #[test]
    fn test_never_drops_edges() {
        // Edge pointing at a node that does not exist is kept, not pruned
        let doc = json!({
            "nodes": [{"id": 1, "type": "trigger"}],
            "edges": [{"id": 1, "fromNodeId": 1, "fromPort": 0, "toNodeId": 99, "toPort": 0}]
        });

        let migrated = migrate(&doc);
        assert_eq!(migrated["edges"].as_array().unwrap().len(), 1);
        assert_eq!(migrated["edges"][0]["toNodeId"], 99);
    }
}
