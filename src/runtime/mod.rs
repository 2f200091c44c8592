//! Capability traits for talking to container daemons.
//!
//! The engine depends on these traits rather than a concrete client type so
//! the event loop can be exercised against an in-memory fake with scripted
//! snapshots and event streams.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bollard::models::{ContainerInspectResponse, ContainerSummary, SystemInfo};
use bollard::system::Version as SystemVersion;
use futures_util::stream::BoxStream;

use crate::error::GenError;
use crate::types::ContainerEvent;

pub mod docker;
pub use docker::{resolve_endpoint, DockerConnector, Endpoint, TlsConfig};

/// A live subscription to a daemon's event feed.
///
/// Dropping the stream ends the subscription.
pub type EventStream = BoxStream<'static, Result<ContainerEvent>>;

/// Control-plane operations the engine needs from a container daemon.
#[async_trait]
pub trait DaemonClient: Send + Sync {
    async fn list_containers(
        &self,
        all: bool,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerSummary>>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse>;

    async fn info(&self) -> Result<SystemInfo>;

    async fn version(&self) -> Result<SystemVersion>;

    async fn ping(&self) -> Result<()>;

    async fn kill_container(&self, id: &str, signal: i64) -> Result<()>;

    async fn restart_container(&self, id: &str, grace_secs: i64) -> Result<()>;

    /// Opens a container-event subscription.
    fn subscribe(&self) -> EventStream;
}

/// Resolves endpoint strings and constructs clients for them.
#[async_trait]
pub trait DaemonConnector: Send + Sync {
    /// Canonicalizes an endpoint string.
    fn resolve(&self, endpoint: &str) -> Result<Endpoint, GenError>;

    /// Builds a client for a resolved endpoint.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn DaemonClient>, GenError>;
}
