#![allow(dead_code)]

use std::sync::Arc;

use execlane::config::{NodeConfig, RawNodeConfig};
use execlane::engine::ExecEngine;
use execlane::host::{HostServices, MemoryStore, StaticEnv};
use execlane::types::InputMode;

use crate::recorders::{RecordingSink, RecordingStatus};

/// Builder for `NodeConfig` to simplify test setup.
pub struct NodeConfigBuilder {
    raw: RawNodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(command: &str) -> Self {
        let mut raw = RawNodeConfig::default();
        raw.name = "test-node".to_string();
        raw.command = command.to_string();
        raw.arguments_source = "payload".to_string();
        raw.result_field = "payload".to_string();
        Self { raw }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.raw.name = name.to_string();
        self
    }

    pub fn args(mut self, args: &str) -> Self {
        self.raw.args = args.to_string();
        self
    }

    pub fn arguments_source(mut self, path: &str) -> Self {
        self.raw.arguments_source = path.to_string();
        self
    }

    pub fn env_source(mut self, path: &str) -> Self {
        self.raw.env_source = Some(path.to_string());
        self
    }

    pub fn cwd(mut self, expr: &str) -> Self {
        self.raw.cwd = Some(expr.to_string());
        self
    }

    pub fn input(mut self, mode: InputMode) -> Self {
        self.raw.input = mode;
        self
    }

    pub fn result_field(mut self, path: &str) -> Self {
        self.raw.result_field = path.to_string();
        self
    }

    pub fn send_start_control(mut self, on: bool) -> Self {
        self.raw.send_start_control = on;
        self
    }

    pub fn error_threshold(mut self, code: i32) -> Self {
        self.raw.thresholds.error = code;
        self
    }

    pub fn warning_threshold(mut self, code: i32) -> Self {
        self.raw.thresholds.warning = Some(code);
        self
    }

    pub fn pre_script(mut self, src: &str) -> Self {
        self.raw.scripts.pre = Some(src.to_string());
        self
    }

    pub fn post_script(mut self, src: &str) -> Self {
        self.raw.scripts.post = Some(src.to_string());
        self
    }

    pub fn script_timeout_ms(mut self, ms: u64) -> Self {
        self.raw.scripts.timeout_ms = ms;
        self
    }

    pub fn shutdown_grace_ms(mut self, ms: u64) -> Self {
        self.raw.shutdown.grace_ms = ms;
        self
    }

    pub fn raw(self) -> RawNodeConfig {
        self.raw
    }

    pub fn build(self) -> NodeConfig {
        NodeConfig::try_from(self.raw).expect("Failed to build valid config from builder")
    }
}

/// An engine wired to recording collaborators.
pub struct TestEngine {
    pub engine: ExecEngine,
    pub sink: Arc<RecordingSink>,
    pub status: Arc<RecordingStatus>,
    pub store: Arc<MemoryStore>,
}

impl TestEngine {
    pub fn new(config: NodeConfig) -> Self {
        Self::with_env(config, StaticEnv::new())
    }

    pub fn with_env(config: NodeConfig, env: StaticEnv) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let status = Arc::new(RecordingStatus::new());
        let store = Arc::new(MemoryStore::new());
        let host = HostServices::local(&config.name)
            .with_status(status.clone())
            .with_store(store.clone())
            .with_env(Arc::new(env));
        let engine = ExecEngine::new(config, sink.clone(), host);
        Self {
            engine,
            sink,
            status,
            store,
        }
    }
}
