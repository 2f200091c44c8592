//! Bollard-backed daemon client and endpoint resolution.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, KillContainerOptions, ListContainersOptions, RestartContainerOptions,
};
use bollard::models::{ContainerInspectResponse, ContainerSummary, SystemInfo};
use bollard::system::{EventsOptions, Version as SystemVersion};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;

use super::{DaemonClient, DaemonConnector, EventStream};
use crate::error::GenError;
use crate::types::ContainerEvent;

const DEFAULT_SOCKET: &str = "/var/run/docker.sock";
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// A resolved daemon location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Local socket path.
    Unix(String),
    /// `host:port`, scheme stripped.
    Tcp(String),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path),
            Endpoint::Tcp(hostport) => write!(f, "tcp://{}", hostport),
        }
    }
}

/// Canonicalizes an endpoint string.
///
/// Accepts `unix://`, `tcp://`, `http://`, `https://` and bare `host:port`
/// forms.  An empty string falls back to `$DOCKER_HOST`, then the local
/// socket.
pub fn resolve_endpoint(endpoint: &str) -> Result<Endpoint, GenError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return match std::env::var("DOCKER_HOST") {
            Ok(host) if !host.trim().is_empty() => resolve_nonempty(host.trim()),
            _ => Ok(Endpoint::Unix(DEFAULT_SOCKET.to_string())),
        };
    }
    resolve_nonempty(endpoint)
}

fn resolve_nonempty(endpoint: &str) -> Result<Endpoint, GenError> {
    if let Some(path) = endpoint.strip_prefix("unix://") {
        if path.is_empty() {
            return Err(GenError::BadEndpoint(endpoint.to_string()));
        }
        return Ok(Endpoint::Unix(path.to_string()));
    }

    let hostport = endpoint
        .strip_prefix("tcp://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .or_else(|| endpoint.strip_prefix("https://"));
    let hostport = match hostport {
        Some(rest) => rest.trim_end_matches('/'),
        // bare host:port shorthand
        None if !endpoint.contains("://") && endpoint.contains(':') => endpoint,
        None => return Err(GenError::BadEndpoint(endpoint.to_string())),
    };
    if hostport.is_empty() {
        return Err(GenError::BadEndpoint(endpoint.to_string()));
    }
    Ok(Endpoint::Tcp(hostport.to_string()))
}

/// TLS material for tcp endpoints.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub verify: bool,
    pub cert: String,
    pub ca_cert: String,
    pub key: String,
}

impl TlsConfig {
    fn enabled(&self) -> bool {
        self.verify || !self.cert.is_empty()
    }
}

/// Constructs bollard clients for resolved endpoints.
pub struct DockerConnector {
    tls: TlsConfig,
}

impl DockerConnector {
    pub fn new(tls: TlsConfig) -> Self {
        Self { tls }
    }
}

#[async_trait]
impl DaemonConnector for DockerConnector {
    fn resolve(&self, endpoint: &str) -> Result<Endpoint, GenError> {
        resolve_endpoint(endpoint)
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn DaemonClient>, GenError> {
        let docker = match endpoint {
            Endpoint::Unix(path) => Docker::connect_with_unix(
                &format!("unix://{}", path),
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            ),
            Endpoint::Tcp(hostport) if self.tls.enabled() => Docker::connect_with_ssl(
                &format!("https://{}", hostport),
                Path::new(&self.tls.key),
                Path::new(&self.tls.cert),
                Path::new(&self.tls.ca_cert),
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            ),
            Endpoint::Tcp(hostport) => Docker::connect_with_http(
                &format!("http://{}", hostport),
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            ),
        }
        .map_err(|e| GenError::ClientInit(e.into()))?;

        Ok(Arc::new(DockerDaemon { docker }))
    }
}

/// [`DaemonClient`] backed by a bollard [`Docker`] handle.
pub struct DockerDaemon {
    docker: Docker,
}

#[async_trait]
impl DaemonClient for DockerDaemon {
    async fn list_containers(
        &self,
        all: bool,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerSummary>> {
        let opts = ListContainersOptions::<String> {
            all,
            size: false,
            filters,
            ..Default::default()
        };
        Ok(self.docker.list_containers(Some(opts)).await?)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse> {
        Ok(self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?)
    }

    async fn info(&self) -> Result<SystemInfo> {
        Ok(self.docker.info().await?)
    }

    async fn version(&self) -> Result<SystemVersion> {
        Ok(self.docker.version().await?)
    }

    async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn kill_container(&self, id: &str, signal: i64) -> Result<()> {
        let opts = KillContainerOptions {
            signal: signal.to_string(),
        };
        Ok(self.docker.kill_container(id, Some(opts)).await?)
    }

    async fn restart_container(&self, id: &str, grace_secs: i64) -> Result<()> {
        let opts = RestartContainerOptions {
            t: grace_secs as isize,
        };
        Ok(self.docker.restart_container(id, Some(opts)).await?)
    }

    fn subscribe(&self) -> EventStream {
        let docker = self.docker.clone();
        // Listener channel sized like the fan-out channels downstream.
        let (tx, rx) = mpsc::channel::<Result<ContainerEvent>>(100);

        tokio::spawn(async move {
            let opts = EventsOptions::<String> {
                filters: HashMap::from([("type".to_string(), vec!["container".to_string()])]),
                ..Default::default()
            };
            let mut events = docker.events(Some(opts));
            while let Some(item) = events.next().await {
                let forward = match item {
                    Ok(message) => {
                        let status = message.action.unwrap_or_default();
                        let id = message.actor.and_then(|actor| actor.id).unwrap_or_default();
                        if id.is_empty() {
                            continue;
                        }
                        Ok(ContainerEvent { status, id })
                    }
                    Err(e) => Err(anyhow::Error::from(e)),
                };
                if tx.send(forward).await.is_err() {
                    // subscriber dropped the stream
                    return;
                }
            }
        });

        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }
}
