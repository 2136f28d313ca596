//! Node type implementations for the Loomflow logic engine
//!
//! One module per node type, plus the collaborator service interfaces the
//! LLM and capability nodes call through. [`builtin_registry`] assembles
//! the full set for hosts; registries compose, so hosts may merge their own
//! node types on top.

pub mod capability;
pub mod choice;
pub mod command;
pub mod join;
pub mod llm;
pub mod loader;
pub mod output;
pub mod services;
pub mod tags;
pub mod text;
pub mod trigger;

use std::sync::Arc;

use logic_engine::NodeRegistry;

pub use capability::CapabilityNode;
pub use choice::ChoiceNode;
pub use command::{parse_tag_commands, TagAction, TagCommand};
pub use join::JoinNode;
pub use llm::LlmChatNode;
pub use loader::PresetLoaderNode;
pub use output::TextOutputNode;
pub use services::{
    CapabilityService, ChatMessage, ChatRequest, ChatResponse, HttpLlmChatService,
    LlmChatService, CAPABILITY_SERVICE, LLM_CHAT_SERVICE,
};
pub use tags::{normalize_tag_key, ComposedTags, TagEntry, TagLedger, TagsNode};
pub use text::TextPromptNode;
pub use trigger::TriggerNode;

/// A registry with every built-in node type registered
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(TriggerNode));
    registry.register(Arc::new(TextPromptNode));
    registry.register(Arc::new(PresetLoaderNode));
    registry.register(Arc::new(LlmChatNode));
    registry.register(Arc::new(ChoiceNode));
    registry.register(Arc::new(CapabilityNode));
    registry.register(Arc::new(JoinNode));
    registry.register(Arc::new(TagsNode));
    registry.register(Arc::new(TextOutputNode));
    registry
}
