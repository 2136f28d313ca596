//! Typed extension map for injecting collaborator services
//!
//! Hosts hand the engine runtime objects (the LLM-call service, the
//! capability-invocation service, API clients) through an [`Extensions`]
//! map threaded into every [`crate::registry::NodeContext`]. Unlike node
//! `data`, these values are not serializable; they are arbitrary
//! `Send + Sync` types stored behind `Any`.

use std::any::Any;
use std::collections::HashMap;

/// Typed map of non-serializable runtime dependencies
pub struct Extensions {
    inner: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Insert a typed value under the given key, replacing any prior value
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.inner.insert(key.to_string(), Box::new(value));
    }

    /// Get a reference to a typed value by key
    ///
    /// Returns `None` if the key is absent or holds a different type.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.inner.get(key).and_then(|v| v.downcast_ref())
    }

    /// Whether a key exists
    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }
}

impl Default for Extensions {
    fn default() -> Self {
        Self::new()
    }
}
