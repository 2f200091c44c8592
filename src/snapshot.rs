//! Container snapshots.
//!
//! Inspects every container across all configured daemons and produces the
//! normalized list handed to renderers, in daemon-iteration order.  Also
//! owns the process-wide daemon environment record that renderers read.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use bollard::models::{ContainerInspectResponse, SystemInfo};
use bollard::system::Version as SystemVersion;
use log::error;
use serde::Serialize;

use crate::runtime::DaemonClient;
use crate::types::{Address, DockerImage, Mount, Network, RuntimeContainer, State, Volume};

static DOCKER_ENV: RwLock<Option<DaemonEnv>> = RwLock::new(None);
static SERVER_INFO: RwLock<Option<ServerInfo>> = RwLock::new(None);

/// Daemon version details, captured once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaemonEnv {
    pub version: String,
    pub api_version: String,
}

/// Daemon info, refreshed on every snapshot pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub containers: i64,
    pub images: i64,
    pub driver: String,
    pub operating_system: String,
    pub architecture: String,
    pub n_cpu: i64,
    pub mem_total: i64,
}

pub fn set_docker_env(version: &SystemVersion) {
    let env = DaemonEnv {
        version: version.version.clone().unwrap_or_default(),
        api_version: version.api_version.clone().unwrap_or_default(),
    };
    *DOCKER_ENV.write().unwrap_or_else(PoisonError::into_inner) = Some(env);
}

pub fn docker_env() -> Option<DaemonEnv> {
    DOCKER_ENV
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn set_server_info(info: &SystemInfo) {
    let info = ServerInfo {
        name: info.name.clone().unwrap_or_default(),
        containers: info.containers.unwrap_or_default(),
        images: info.images.unwrap_or_default(),
        driver: info.driver.clone().unwrap_or_default(),
        operating_system: info.operating_system.clone().unwrap_or_default(),
        architecture: info.architecture.clone().unwrap_or_default(),
        n_cpu: info.ncpu.unwrap_or_default(),
        mem_total: info.mem_total.unwrap_or_default(),
    };
    *SERVER_INFO.write().unwrap_or_else(PoisonError::into_inner) = Some(info);
}

pub fn server_info() -> Option<ServerInfo> {
    SERVER_INFO
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Collects one normalized snapshot across all clients.
///
/// `info` is refreshed best-effort from the primary daemon, which need not
/// appear in `clients` when extra swarm nodes are configured.  A failing
/// container listing aborts the pass; containers that fail inspection are
/// logged and skipped.
pub async fn get_containers(
    primary: &dyn DaemonClient,
    clients: &[Arc<dyn DaemonClient>],
    all: bool,
) -> Result<Vec<RuntimeContainer>> {
    match primary.info().await {
        Ok(info) => set_server_info(&info),
        Err(e) => error!("Error retrieving daemon info: {}", e),
    }

    let mut containers = Vec::new();
    for client in clients {
        let summaries = client.list_containers(all, HashMap::new()).await?;
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            let inspected = match client.inspect_container(&id).await {
                Ok(inspected) => inspected,
                Err(e) => {
                    error!("Error inspecting container {}: {}", id, e);
                    continue;
                }
            };
            containers.push(normalize(inspected));
        }
    }
    Ok(containers)
}

/// Parses `KEY=VALUE` strings into a map.  A string without `=` maps to
/// itself with an empty value.
pub fn split_key_value_slice(entries: &[String]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

fn normalize(container: ContainerInspectResponse) -> RuntimeContainer {
    let config = container.config.unwrap_or_default();
    let settings = container.network_settings.unwrap_or_default();

    let mut runtime = RuntimeContainer {
        id: container.id.unwrap_or_default(),
        image: DockerImage::parse(config.image.as_deref().unwrap_or_default()),
        state: State {
            running: container
                .state
                .and_then(|state| state.running)
                .unwrap_or(false),
        },
        name: container
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string(),
        hostname: config.hostname.unwrap_or_default(),
        gateway: settings.gateway.clone().unwrap_or_default(),
        ip: settings.ip_address.clone().unwrap_or_default(),
        ip6_link_local: settings.link_local_ipv6_address.clone().unwrap_or_default(),
        ip6_global: settings.global_ipv6_address.clone().unwrap_or_default(),
        env: split_key_value_slice(&config.env.unwrap_or_default()),
        labels: config.labels.unwrap_or_default(),
        ..Default::default()
    };

    if let Some(ports) = &settings.ports {
        // sorted for a stable listing; the daemon hands ports back unordered
        let mut keys: Vec<_> = ports.keys().cloned().collect();
        keys.sort();
        for key in keys {
            let (port, proto) = key.split_once('/').unwrap_or((key.as_str(), "tcp"));
            let mut address = Address {
                ip: runtime.ip.clone(),
                ip6_link_local: runtime.ip6_link_local.clone(),
                ip6_global: runtime.ip6_global.clone(),
                port: port.to_string(),
                proto: proto.to_string(),
                ..Default::default()
            };
            if let Some(Some(bindings)) = ports.get(&key) {
                if let Some(first) = bindings.first() {
                    address.host_port = first.host_port.clone().unwrap_or_default();
                    address.host_ip = first.host_ip.clone().unwrap_or_default();
                }
            }
            runtime.addresses.push(address);
        }
    }

    if let Some(networks) = &settings.networks {
        let mut names: Vec<_> = networks.keys().cloned().collect();
        names.sort();
        for name in names {
            let endpoint = &networks[&name];
            runtime.networks.push(Network {
                name: name.clone(),
                ip: endpoint.ip_address.clone().unwrap_or_default(),
                gateway: endpoint.gateway.clone().unwrap_or_default(),
                endpoint_id: endpoint.endpoint_id.clone().unwrap_or_default(),
                ipv6_gateway: endpoint.ipv6_gateway.clone().unwrap_or_default(),
                global_ipv6_address: endpoint.global_ipv6_address.clone().unwrap_or_default(),
                mac_address: endpoint.mac_address.clone().unwrap_or_default(),
                global_ipv6_prefix_len: endpoint.global_ipv6_prefix_len.unwrap_or_default(),
                ip_prefix_len: endpoint.ip_prefix_len.unwrap_or_default(),
            });
        }
    }

    for mount in container.mounts.unwrap_or_default() {
        let volume = Volume {
            path: mount.destination.clone().unwrap_or_default(),
            host_path: mount.source.clone().unwrap_or_default(),
            read_write: mount.rw.unwrap_or(false),
        };
        runtime.volumes.insert(volume.path.clone(), volume);
        runtime.mounts.push(Mount {
            name: mount.name.unwrap_or_default(),
            source: mount.source.unwrap_or_default(),
            destination: mount.destination.unwrap_or_default(),
            driver: mount.driver.unwrap_or_default(),
            mode: mount.mode.unwrap_or_default(),
            rw: mount.rw.unwrap_or(false),
        });
    }

    runtime
}
