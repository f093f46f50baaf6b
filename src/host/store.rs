// src/host/store.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

use serde_json::Value;

/// Scope of a stored value, from narrowest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTier {
    Local,
    Flow,
    Global,
}

impl fmt::Display for StoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTier::Local => f.write_str("local"),
            StoreTier::Flow => f.write_str("flow"),
            StoreTier::Global => f.write_str("global"),
        }
    }
}

/// Key/value storage exposed to scripts as `context`, `context.flow` and
/// `context.global`. Values are opaque to the engine.
pub trait ContextStore: Send + Sync {
    fn get(&self, tier: StoreTier, key: &str) -> Option<Value>;

    /// Store `value` under `key`; storing `null` removes the key.
    fn set(&self, tier: StoreTier, key: &str, value: Value);

    /// Keys of a tier in sorted order.
    fn keys(&self, tier: StoreTier) -> Vec<String>;
}

/// In-memory store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tiers: Mutex<HashMap<StoreTier, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextStore for MemoryStore {
    fn get(&self, tier: StoreTier, key: &str) -> Option<Value> {
        let tiers = self.tiers.lock().unwrap_or_else(|e| e.into_inner());
        tiers.get(&tier).and_then(|m| m.get(key)).cloned()
    }

    fn set(&self, tier: StoreTier, key: &str, value: Value) {
        let mut tiers = self.tiers.lock().unwrap_or_else(|e| e.into_inner());
        let map = tiers.entry(tier).or_default();
        if value.is_null() {
            map.remove(key);
        } else {
            map.insert(key.to_string(), value);
        }
    }

    fn keys(&self, tier: StoreTier) -> Vec<String> {
        let tiers = self.tiers.lock().unwrap_or_else(|e| e.into_inner());
        tiers
            .get(&tier)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}
