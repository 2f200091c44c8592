//! In-memory daemon and renderer fakes for exercising the event loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bollard::models::{ContainerInspectResponse, ContainerSummary, SystemInfo};
use bollard::system::Version as SystemVersion;
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;

use crate::config::TemplateConfig;
use crate::error::GenError;
use crate::render::Renderer;
use crate::runtime::{DaemonClient, DaemonConnector, Endpoint, EventStream};
use crate::types::{ContainerEvent, RuntimeContainer};

/// A notification-side daemon call, recorded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCall {
    Kill { id: String, signal: i64 },
    Restart { id: String, grace_secs: i64 },
}

#[derive(Default)]
struct FakeState {
    summaries: Vec<ContainerSummary>,
    inspects: HashMap<String, ContainerInspectResponse>,
    failing_inspects: Vec<String>,
    fail_list: bool,
    fail_info: bool,
    calls: Vec<DaemonCall>,
    streams: Vec<mpsc::Receiver<Result<ContainerEvent>>>,
    subscriptions: usize,
    info_requests: usize,
}

/// Scripted [`DaemonClient`] backed by shared state, so clones handed to
/// the generator stay observable from the test.
#[derive(Clone, Default)]
pub struct FakeDaemon {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, id: &str, inspect: ContainerInspectResponse) {
        let mut state = self.state.lock().unwrap();
        state.summaries.push(ContainerSummary {
            id: Some(id.to_string()),
            ..Default::default()
        });
        state.inspects.insert(id.to_string(), inspect);
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn fail_info(&self) {
        self.state.lock().unwrap().fail_info = true;
    }

    pub fn fail_inspect(&self, id: &str) {
        self.state.lock().unwrap().failing_inspects.push(id.to_string());
    }

    /// Queues a scripted event stream; each `subscribe` call consumes one.
    /// With the queue empty, `subscribe` hands out an already-closed stream.
    pub fn push_stream(&self) -> mpsc::Sender<Result<ContainerEvent>> {
        let (tx, rx) = mpsc::channel(100);
        self.state.lock().unwrap().streams.push(rx);
        tx
    }

    pub fn calls(&self) -> Vec<DaemonCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn subscriptions(&self) -> usize {
        self.state.lock().unwrap().subscriptions
    }

    pub fn info_requests(&self) -> usize {
        self.state.lock().unwrap().info_requests
    }
}

#[async_trait]
impl DaemonClient for FakeDaemon {
    async fn list_containers(
        &self,
        _all: bool,
        _filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(anyhow!("list failed"));
        }
        Ok(state.summaries.clone())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse> {
        let state = self.state.lock().unwrap();
        if state.failing_inspects.iter().any(|failing| failing == id) {
            return Err(anyhow!("inspect failed"));
        }
        state
            .inspects
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("no such container: {}", id))
    }

    async fn info(&self) -> Result<SystemInfo> {
        let mut state = self.state.lock().unwrap();
        state.info_requests += 1;
        if state.fail_info {
            return Err(anyhow!("info failed"));
        }
        Ok(SystemInfo::default())
    }

    async fn version(&self) -> Result<SystemVersion> {
        Ok(SystemVersion::default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn kill_container(&self, id: &str, signal: i64) -> Result<()> {
        self.state.lock().unwrap().calls.push(DaemonCall::Kill {
            id: id.to_string(),
            signal,
        });
        Ok(())
    }

    async fn restart_container(&self, id: &str, grace_secs: i64) -> Result<()> {
        self.state.lock().unwrap().calls.push(DaemonCall::Restart {
            id: id.to_string(),
            grace_secs,
        });
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        let mut state = self.state.lock().unwrap();
        state.subscriptions += 1;
        let rx = if state.streams.is_empty() {
            let (_tx, rx) = mpsc::channel(1);
            rx
        } else {
            state.streams.remove(0)
        };
        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }
}

/// [`DaemonConnector`] that hands out clones of one [`FakeDaemon`].
pub struct FakeConnector {
    daemon: FakeDaemon,
}

impl FakeConnector {
    pub fn new(daemon: FakeDaemon) -> Self {
        Self { daemon }
    }
}

#[async_trait]
impl DaemonConnector for FakeConnector {
    fn resolve(&self, endpoint: &str) -> Result<Endpoint, GenError> {
        if endpoint == "bad" {
            return Err(GenError::BadEndpoint(endpoint.to_string()));
        }
        Ok(Endpoint::Unix(endpoint.to_string()))
    }

    async fn connect(&self, _endpoint: &Endpoint) -> Result<Arc<dyn DaemonClient>, GenError> {
        Ok(Arc::new(self.daemon.clone()))
    }
}

/// [`Renderer`] with a fixed answer and a shared render counter.
#[derive(Clone)]
pub struct FakeRenderer {
    changed: bool,
    renders: Arc<Mutex<usize>>,
}

impl FakeRenderer {
    pub fn returning(changed: bool) -> Self {
        Self {
            changed,
            renders: Arc::default(),
        }
    }

    pub fn renders(&self) -> usize {
        *self.renders.lock().unwrap()
    }
}

impl Renderer for FakeRenderer {
    fn render(&self, _config: &TemplateConfig, _containers: &[RuntimeContainer]) -> bool {
        *self.renders.lock().unwrap() += 1;
        self.changed
    }
}
