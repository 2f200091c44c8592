//! Configuration loading.
//!
//! Settings come from defaults merged with `confgen.toml` and
//! `CONFGEN_`-prefixed environment variables.  Each `[[template]]` block
//! describes one output file and its notification wiring.

use std::collections::HashMap;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Debounce window for event-driven renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Wait {
    /// Quiescence required before a render fires, in milliseconds.
    pub min_ms: u64,
    /// Hard cap measured from the first event of a burst, in milliseconds.
    /// Defaults to four times the minimum.
    #[serde(default)]
    pub max_ms: u64,
}

impl Wait {
    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

/// One template to render plus its notification wiring.
///
/// A template either watches events, renders on an interval, or renders
/// exactly once at startup when neither is set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Template source; opaque to the engine, interpreted by renderers.
    pub source: String,
    /// Output path.
    pub dest: String,
    /// Follow live container events.
    pub watch: bool,
    /// Re-render period in seconds; 0 disables.
    pub interval: u64,
    /// Optional debounce window; absent or zero-min renders on every event.
    pub wait: Option<Wait>,
    /// Shell command run after a changed render; empty disables.
    pub notify_cmd: String,
    /// Log the notify command's output line by line.
    pub notify_output: bool,
    /// Container id to signal number; -1 restarts with a 10s grace.
    pub notify_containers: HashMap<String, i64>,
    /// Daemon-side list filters resolving a dynamic set of containers.
    pub notify_containers_filter: HashMap<String, Vec<String>>,
    /// Signal for every filter match; -1 restarts with a 10s grace.
    pub notify_containers_signal: i64,
}

/// Top-level configuration: daemon endpoints plus the template list.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Primary daemon endpoint; empty falls back to `$DOCKER_HOST`, then
    /// the local socket.
    #[serde(default)]
    pub endpoint: String,
    /// Additional daemon endpoints to snapshot and watch.
    #[serde(default)]
    pub swarm_nodes: Vec<String>,
    #[serde(default)]
    pub tls_verify: bool,
    #[serde(default)]
    pub tls_cert: String,
    #[serde(default)]
    pub tls_ca_cert: String,
    #[serde(default)]
    pub tls_key: String,
    /// Include stopped containers in snapshots.
    #[serde(default)]
    pub all: bool,
    #[serde(default, rename = "template")]
    pub templates: Vec<TemplateConfig>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("confgen.toml"))
                .merge(Env::prefixed("CONFGEN_")),
        )
    }

    fn load_from(figment: Figment) -> anyhow::Result<Self> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("failed to load configuration: {}", e))?;

        for template in &mut config.templates {
            if let Some(wait) = &mut template.wait {
                if wait.max_ms == 0 {
                    wait.max_ms = wait.min_ms * 4;
                }
                if wait.max_ms < wait.min_ms {
                    anyhow::bail!(
                        "template {}: wait max ({}ms) must not be below min ({}ms)",
                        template.dest,
                        wait.max_ms,
                        wait.min_ms
                    );
                }
            }
        }

        Ok(config)
    }

    /// Templates that follow live container events.
    pub fn watched(&self) -> Vec<TemplateConfig> {
        self.templates.iter().filter(|t| t.watch).cloned().collect()
    }

    /// Daemon endpoints to snapshot and watch; falls back to the primary
    /// endpoint when no swarm nodes are configured.
    pub fn endpoints(&self) -> Vec<String> {
        if self.swarm_nodes.is_empty() {
            vec![self.endpoint.clone()]
        } else {
            self.swarm_nodes.clone()
        }
    }
}
