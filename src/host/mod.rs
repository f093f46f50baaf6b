// src/host/mod.rs

//! Collaborators the engine consumes but does not own.
//!
//! - [`status`]: where status-indicator updates go.
//! - [`store`]: the three-tier key/value store exposed to scripts.
//! - [`env`]: read-only environment lookup exposed to scripts.
//!
//! Each is a small trait with a default in-process implementation, so the
//! enclosing application can plug in its own.

use std::fmt;
use std::sync::Arc;

pub mod env;
pub mod status;
pub mod store;

pub use env::{EnvLookup, ProcessEnv, StaticEnv};
pub use status::{StatusReporter, TracingStatus};
pub use store::{ContextStore, MemoryStore, StoreTier};

/// The collaborator set handed to an engine.
#[derive(Clone)]
pub struct HostServices {
    pub status: Arc<dyn StatusReporter>,
    pub store: Arc<dyn ContextStore>,
    pub env: Arc<dyn EnvLookup>,
}

impl HostServices {
    /// In-process defaults: status to the log, an in-memory store and the
    /// real process environment.
    pub fn local(node_name: &str) -> Self {
        Self {
            status: Arc::new(TracingStatus::new(node_name)),
            store: Arc::new(MemoryStore::new()),
            env: Arc::new(ProcessEnv),
        }
    }

    pub fn with_status(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = status;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_env(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = env;
        self
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}
