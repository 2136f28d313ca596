//! Tag command extraction from arbitrary payloads
//!
//! Upstream nodes deliver tag mutations in whatever shape the model
//! produced: tool-call objects, nested JSON, even arguments serialized as
//! strings. This parser walks the payload recursively, matching keys and
//! tool names against the configured add/remove aliases
//! (case/underscore-insensitive), and yields flat [`TagCommand`] values the
//! state machine can apply.

use serde_json::Value;

/// What a command does to matching tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    Add,
    Remove,
}

/// One extracted tag mutation
#[derive(Debug, Clone, PartialEq)]
pub struct TagCommand {
    pub action: TagAction,
    pub tags: Vec<String>,
    /// Restrict application to one component, when given
    pub component_filter: Option<String>,
    /// Restrict application to one category, when given
    pub category_filter: Option<String>,
}

/// Canonical form used to compare alias names and payload keys
fn alias_key(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Extract every tag command from a payload
pub fn parse_tag_commands(payload: &Value, add_alias: &str, remove_alias: &str) -> Vec<TagCommand> {
    let mut commands = Vec::new();
    walk(
        payload,
        &alias_key(add_alias),
        &alias_key(remove_alias),
        &mut commands,
    );
    commands
}

fn walk(value: &Value, add: &str, remove: &str, out: &mut Vec<TagCommand>) {
    match value {
        Value::Object(map) => {
            // Tool-call shape: {"name": <alias>, "arguments": <body>}
            let mut consumed_arguments = false;
            if let (Some(name), Some(arguments)) =
                (map.get("name").and_then(Value::as_str), map.get("arguments"))
            {
                if let Some(action) = action_for(&alias_key(name), add, remove) {
                    if let Some(command) = command_body(action, arguments) {
                        out.push(command);
                        consumed_arguments = true;
                    }
                }
            }

            for (key, child) in map {
                if consumed_arguments && key == "arguments" {
                    continue;
                }
                match action_for(&alias_key(key), add, remove) {
                    Some(action) => {
                        if let Some(command) = command_body(action, child) {
                            out.push(command);
                        }
                    }
                    None => walk(child, add, remove, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, add, remove, out);
            }
        }
        // Tool arguments frequently arrive as a JSON string
        Value::String(s) => {
            let trimmed = s.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                if let Ok(nested) = serde_json::from_str::<Value>(s) {
                    walk(&nested, add, remove, out);
                }
            }
        }
        _ => {}
    }
}

fn action_for(key: &str, add: &str, remove: &str) -> Option<TagAction> {
    if key == add {
        Some(TagAction::Add)
    } else if key == remove {
        Some(TagAction::Remove)
    } else {
        None
    }
}

/// Interpret the value attached to a matched alias
fn command_body(action: TagAction, value: &Value) -> Option<TagCommand> {
    let (tags, component_filter, category_filter) = match value {
        Value::String(s) => {
            // Arguments serialized as a JSON string
            let trimmed = s.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                if let Ok(nested) = serde_json::from_str::<Value>(s) {
                    return command_body(action, &nested);
                }
            }
            (split_tags(s), None, None)
        }
        Value::Array(items) => (collect_tags(items), None, None),
        Value::Object(map) => {
            let tags = match field(map, "tags") {
                Some(Value::String(s)) => split_tags(s),
                Some(Value::Array(items)) => collect_tags(items),
                _ => Vec::new(),
            };
            (
                tags,
                field(map, "component")
                    .and_then(Value::as_str)
                    .map(String::from),
                field(map, "category")
                    .and_then(Value::as_str)
                    .map(String::from),
            )
        }
        _ => return None,
    };

    if tags.is_empty() {
        return None;
    }
    Some(TagCommand {
        action,
        tags,
        component_filter,
        category_filter,
    })
}

/// Case/underscore-insensitive field lookup
fn field<'a>(map: &'a serde_json::Map<String, Value>, name: &str) -> Option<&'a Value> {
    let wanted = alias_key(name);
    map.iter()
        .find(|(key, _)| alias_key(key) == wanted)
        .map(|(_, value)| value)
}

fn split_tags(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn collect_tags(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
