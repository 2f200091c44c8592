//! Data structures shared across the generator.
//!
//! [`RuntimeContainer`] is the normalized view of one container handed to
//! renderers.  Values are immutable snapshots scoped to a single render
//! pass; they mirror the daemon's inspect output closely enough that
//! templates can address ports, networks and mounts directly.

use std::collections::HashMap;

use serde::Serialize;

/// A container lifecycle event reported by a daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    /// Event action, e.g. `start`, `stop`, `die`.
    pub status: String,
    /// Full container id.
    pub id: String,
}

/// An image reference split into registry, repository and tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DockerImage {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl DockerImage {
    /// Splits an image reference.
    ///
    /// The first path segment is a registry when it contains `.` or `:` or
    /// equals `localhost`; the tag defaults to `latest` when none is given.
    pub fn parse(image: &str) -> Self {
        let (registry, rest) = match image.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (String::new(), image.to_string()),
        };

        let (repository, tag) = match rest.rfind(':') {
            Some(idx) if !rest[idx + 1..].contains('/') && !rest[idx + 1..].is_empty() => {
                (rest[..idx].to_string(), rest[idx + 1..].to_string())
            }
            _ => (rest.trim_end_matches(':').to_string(), "latest".to_string()),
        };

        Self {
            registry,
            repository,
            tag,
        }
    }
}

/// Container run state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct State {
    pub running: bool,
}

/// One exposed port together with its host binding, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Address {
    pub ip: String,
    pub ip6_link_local: String,
    pub ip6_global: String,
    pub port: String,
    pub proto: String,
    pub host_port: String,
    pub host_ip: String,
}

/// Per-network endpoint details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Network {
    pub name: String,
    pub ip: String,
    pub gateway: String,
    pub endpoint_id: String,
    pub ipv6_gateway: String,
    pub global_ipv6_address: String,
    pub mac_address: String,
    pub global_ipv6_prefix_len: i64,
    pub ip_prefix_len: i64,
}

/// A volume keyed by its path inside the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub path: String,
    pub host_path: String,
    pub read_write: bool,
}

/// A mount point as reported by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Mount {
    pub name: String,
    pub source: String,
    pub destination: String,
    pub driver: String,
    pub mode: String,
    pub rw: bool,
}

/// Swarm node details, populated only when the daemon supplies them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwarmNode {
    pub id: String,
    pub name: String,
    pub address: Address,
}

/// Normalized view of one container at snapshot time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeContainer {
    pub id: String,
    pub image: DockerImage,
    pub state: State,
    pub name: String,
    pub hostname: String,
    pub gateway: String,
    pub ip: String,
    pub ip6_link_local: String,
    pub ip6_global: String,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub volumes: HashMap<String, Volume>,
    pub mounts: Vec<Mount>,
    pub addresses: Vec<Address>,
    pub networks: Vec<Network>,
    pub node: SwarmNode,
}
