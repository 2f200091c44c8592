//! The orchestration engine.
//!
//! [`Generator::generate`] runs one initial snapshot-and-render pass, then
//! keeps rendering for as long as any trigger remains viable: per-template
//! interval tickers, debounced container events fanned in from every
//! configured daemon, and SIGHUP.  SIGINT or SIGTERM drain the pipeline
//! before the call returns.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use log::{error, info};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::{Config, TemplateConfig};
use crate::debounce::debounce;
use crate::error::GenError;
use crate::render::Renderer;
use crate::runtime::{DaemonClient, DaemonConnector};
use crate::signals::{Sig, Signals};
use crate::snapshot::{self, get_containers};
use crate::types::ContainerEvent;

/// Fan-out and watcher channels hold this many undelivered events before a
/// producer blocks.
const CHANNEL_CAPACITY: usize = 100;
/// Grace handed to the daemon when restarting a notify target.
const RESTART_GRACE_SECS: i64 = 10;
/// Backoff between reconnect attempts.
const RETRY_DELAY: Duration = Duration::from_secs(10);
/// Idle span on an event subscription that triggers a liveness ping.
const PING_INTERVAL: Duration = Duration::from_secs(10);

/// Payload of the daemon-event fan-in channel.
#[derive(Debug, Clone)]
enum WatchEvent {
    /// A subscription (re)bound; force a full render pass.
    Sync,
    Container(ContainerEvent),
}

/// How a subscription's select loop ended.
enum StreamEnd {
    /// Shutdown was requested.
    Done,
    /// The stream closed or errored; back off before reconnecting.
    Lost,
    /// The liveness ping failed; rebind immediately.
    Stale,
}

fn relevant(status: &str) -> bool {
    matches!(status, "start" | "stop" | "die")
}

/// The scheduler: owns the daemon clients and drives every trigger.
pub struct Generator {
    connector: Arc<dyn DaemonConnector>,
    renderer: Arc<dyn Renderer>,
    /// Primary daemon; receives notifications and serves `info`.
    client: Arc<dyn DaemonClient>,
    /// One client per endpoint, in snapshot iteration order.
    clients: Vec<Arc<dyn DaemonClient>>,
    config: Config,
    retry: bool,
}

impl Generator {
    /// Resolves every endpoint and constructs one client per daemon.
    ///
    /// # Errors
    ///
    /// [`GenError::BadEndpoint`] when an endpoint string is unrecognized,
    /// [`GenError::ClientInit`] when a transport cannot be built.
    pub async fn new(
        connector: Arc<dyn DaemonConnector>,
        renderer: Arc<dyn Renderer>,
        config: Config,
    ) -> Result<Self, GenError> {
        let primary = connector.resolve(&config.endpoint)?;
        let client = connector.connect(&primary).await?;

        match client.version().await {
            Ok(version) => snapshot::set_docker_env(&version),
            Err(e) => error!("Error retrieving daemon version info: {}", e),
        }

        let mut clients = Vec::new();
        for endpoint in config.endpoints() {
            let resolved = connector.resolve(&endpoint)?;
            clients.push(connector.connect(&resolved).await?);
        }

        Ok(Self {
            connector,
            renderer,
            client,
            clients,
            config,
            retry: true,
        })
    }

    /// Runs the engine until shutdown.
    ///
    /// Returns after every spawned worker has exited.  With no watched and
    /// no intervaled templates this is immediately after the initial render
    /// pass.
    pub async fn generate(self) -> Result<()> {
        let this = Arc::new(self);
        this.generate_from_containers().await;

        let mut workers = Vec::new();
        workers.extend(Arc::clone(&this).generate_at_interval());
        workers.extend(Arc::clone(&this).generate_from_events());
        workers.extend(Arc::clone(&this).generate_from_signals());

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker task failed: {}", e);
            }
        }
        Ok(())
    }

    /// One full snapshot-and-render pass over every template, change-gated.
    async fn generate_from_containers(&self) {
        let containers =
            match get_containers(self.client.as_ref(), &self.clients, self.config.all).await {
                Ok(containers) => containers,
                Err(e) => {
                    error!("Error listing containers: {}", e);
                    return;
                }
            };
        for template in &self.config.templates {
            let changed = self.renderer.render(template, &containers);
            if !changed {
                info!(
                    "Contents of {} did not change. Skipping notification '{}'",
                    template.dest, template.notify_cmd
                );
                continue;
            }
            self.notify(template).await;
        }
    }

    fn generate_at_interval(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let intervaled: Vec<TemplateConfig> = self
            .config
            .templates
            .iter()
            .filter(|t| t.interval > 0)
            .cloned()
            .collect();

        let mut handles = Vec::new();
        for template in intervaled {
            info!("Generating every {} seconds", template.interval);
            let this = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                let mut signals = match Signals::new() {
                    Ok(signals) => signals,
                    Err(e) => {
                        error!("Unable to install signal handler: {}", e);
                        return;
                    }
                };
                let mut ticker =
                    tokio::time::interval(Duration::from_secs(template.interval));
                // the first tick completes immediately; the initial render
                // already happened
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let containers = match get_containers(
                                this.client.as_ref(),
                                &this.clients,
                                this.config.all,
                            )
                            .await
                            {
                                Ok(containers) => containers,
                                Err(e) => {
                                    error!("Error listing containers: {}", e);
                                    continue;
                                }
                            };
                            // interval renders notify unconditionally
                            this.renderer.render(&template, &containers);
                            this.notify(&template).await;
                        }
                        received = signals.recv() => match received {
                            Some(sig @ (Sig::Int | Sig::Term)) => {
                                info!("Received signal: {}", sig);
                                return;
                            }
                            Some(Sig::Hup) => {}
                            None => return,
                        }
                    }
                }
            }));
        }
        handles
    }

    /// Spawns the event pipeline: one consumer per watched template, one
    /// watcher per daemon endpoint, and the fan-out coordinator.
    fn generate_from_events(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let watched = self.config.watched();
        if watched.is_empty() {
            return Vec::new();
        }

        let mut handles = Vec::new();
        let mut watcher_txs = Vec::new();

        for template in watched {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            watcher_txs.push(tx);
            let mut debounced = debounce(rx, template.wait);
            let this = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                while debounced.recv().await.is_some() {
                    let containers = match get_containers(
                        this.client.as_ref(),
                        &this.clients,
                        this.config.all,
                    )
                    .await
                    {
                        Ok(containers) => containers,
                        Err(e) => {
                            error!("Error listing containers: {}", e);
                            continue;
                        }
                    };
                    let changed = this.renderer.render(&template, &containers);
                    if !changed {
                        info!(
                            "Contents of {} did not change. Skipping notification '{}'",
                            template.dest, template.notify_cmd
                        );
                        continue;
                    }
                    this.notify(&template).await;
                }
            }));
        }

        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (client_done_tx, client_done_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(false);

        for endpoint in self.config.endpoints() {
            let this = Arc::clone(&self);
            let event_tx = event_tx.clone();
            let client_done_tx = client_done_tx.clone();
            let done_rx = done_rx.clone();
            handles.push(tokio::spawn(async move {
                this.watch_daemon_events(endpoint, event_tx, client_done_tx, done_rx)
                    .await;
            }));
        }

        let this = Arc::clone(&self);
        handles.push(tokio::spawn(async move {
            this.fan_out_events(event_rx, client_done_rx, watcher_txs, done_tx)
                .await;
        }));

        handles
    }

    /// Self-healing subscription loop for one daemon endpoint.
    async fn watch_daemon_events(
        &self,
        endpoint: String,
        event_tx: mpsc::Sender<WatchEvent>,
        client_done: mpsc::Sender<()>,
        mut done: watch::Receiver<bool>,
    ) {
        loop {
            let resolved = match self.connector.resolve(&endpoint) {
                Ok(resolved) => resolved,
                Err(e) => {
                    error!("Bad endpoint: {}", e);
                    let _ = client_done.send(()).await;
                    return;
                }
            };
            let client = match self.connector.connect(&resolved).await {
                Ok(client) => client,
                Err(e) => {
                    error!("Unable to connect to daemon: {}", e);
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            let mut listener = client.subscribe();
            info!("Watching container events on {}", resolved);
            // resync every template after (re)binding a subscription
            if event_tx.send(WatchEvent::Sync).await.is_err() {
                return;
            }

            let end = loop {
                tokio::select! {
                    item = listener.next() => match item {
                        Some(Ok(event)) => {
                            if relevant(&event.status) {
                                let short = event.id.get(..12).unwrap_or(event.id.as_str());
                                info!("Received event {} for container {}", event.status, short);
                                if event_tx.send(WatchEvent::Container(event)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!("Daemon connection interrupted: {}", e);
                            break StreamEnd::Lost;
                        }
                        None => {
                            error!("Daemon event stream closed");
                            break StreamEnd::Lost;
                        }
                    },
                    _ = sleep(PING_INTERVAL) => {
                        if let Err(e) = client.ping().await {
                            error!("Unable to ping daemon: {}", e);
                            break StreamEnd::Stale;
                        }
                    }
                    _ = done.changed() => break StreamEnd::Done,
                }
            };
            drop(listener);

            match end {
                StreamEnd::Done => {
                    info!("Done signal received");
                    return;
                }
                StreamEnd::Stale => {}
                StreamEnd::Lost => {
                    if !self.retry {
                        let _ = client_done.send(()).await;
                        return;
                    }
                    sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    /// Fan-out coordinator: broadcasts container events to every watcher,
    /// handles sync events inline, and owns shutdown ordering.
    async fn fan_out_events(
        &self,
        mut events: mpsc::Receiver<WatchEvent>,
        mut client_done: mpsc::Receiver<()>,
        watchers: Vec<mpsc::Sender<ContainerEvent>>,
        done: watch::Sender<bool>,
    ) {
        let mut signals = match Signals::new() {
            Ok(signals) => signals,
            Err(e) => {
                error!("Unable to install signal handler: {}", e);
                let _ = done.send(true);
                return;
            }
        };

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(WatchEvent::Sync) => self.generate_from_containers().await,
                    Some(WatchEvent::Container(event)) => {
                        for watcher in &watchers {
                            // a failed send means shutdown is already in
                            // progress
                            let _ = watcher.send(event.clone()).await;
                        }
                    }
                    // every producer exited
                    None => break,
                },
                _ = client_done.recv() => break,
                received = signals.recv() => match received {
                    Some(sig @ (Sig::Int | Sig::Term)) => {
                        info!("Received signal: {}", sig);
                        break;
                    }
                    _ => {}
                },
            }
        }

        // stop producers first, then close the watcher channels so the
        // debouncers drain and the consumers exit
        let _ = done.send(true);
        drop(watchers);
    }

    /// SIGHUP reactor; only runs when at least one template watches.
    fn generate_from_signals(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        if self.config.watched().is_empty() {
            return Vec::new();
        }

        vec![tokio::spawn(async move {
            let mut signals = match Signals::new() {
                Ok(signals) => signals,
                Err(e) => {
                    error!("Unable to install signal handler: {}", e);
                    return;
                }
            };
            loop {
                match signals.recv().await {
                    Some(Sig::Hup) => {
                        info!("Received signal: {}", Sig::Hup);
                        self.generate_from_containers().await;
                    }
                    Some(sig @ (Sig::Int | Sig::Term)) => {
                        info!("Received signal: {}", sig);
                        return;
                    }
                    None => return,
                }
            }
        })]
    }

    async fn notify(&self, template: &TemplateConfig) {
        self.run_notify_cmd(template).await;
        self.signal_listed_containers(template).await;
        self.signal_filtered_containers(template).await;
    }

    async fn run_notify_cmd(&self, template: &TemplateConfig) {
        if template.notify_cmd.is_empty() {
            return;
        }

        info!("Running '{}'", template.notify_cmd);
        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(&template.notify_cmd)
            .output()
            .await;
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                error!(
                    "Error running notify command: {}, {}",
                    template.notify_cmd, e
                );
                return;
            }
        };
        if !output.status.success() {
            error!(
                "Error running notify command: {}, {}",
                template.notify_cmd, output.status
            );
        }
        if template.notify_output {
            let combined = [output.stdout.as_slice(), output.stderr.as_slice()].concat();
            for line in String::from_utf8_lossy(&combined).lines() {
                if !line.is_empty() {
                    info!("[{}]: {}", template.notify_cmd, line);
                }
            }
        }
    }

    /// Signals every explicitly listed container; -1 restarts instead.
    async fn signal_listed_containers(&self, template: &TemplateConfig) {
        for (container, signal) in &template.notify_containers {
            info!("Sending container '{}' signal '{}'", container, signal);
            let result = if *signal == -1 {
                self.client
                    .restart_container(container, RESTART_GRACE_SECS)
                    .await
            } else {
                self.client.kill_container(container, *signal).await
            };
            if let Err(e) = result {
                error!("Error sending signal to container: {}", e);
            }
        }
    }

    /// Signals every container matching the notify filter on the primary
    /// daemon.
    async fn signal_filtered_containers(&self, template: &TemplateConfig) {
        if template.notify_containers_filter.is_empty() {
            return;
        }

        let matches = match self
            .client
            .list_containers(false, template.notify_containers_filter.clone())
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                error!("Error getting containers: {}", e);
                return;
            }
        };
        for summary in matches {
            let Some(id) = summary.id else { continue };
            info!(
                "Sending container '{}' signal '{}'",
                id, template.notify_containers_signal
            );
            let result = if template.notify_containers_signal == -1 {
                self.client.restart_container(&id, RESTART_GRACE_SECS).await
            } else {
                self.client
                    .kill_container(&id, template.notify_containers_signal)
                    .await
            };
            if let Err(e) = result {
                error!("Error sending signal to container: {}", e);
            }
        }
    }
}
