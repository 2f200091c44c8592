//! confgen daemon entry point.

use std::sync::Arc;

use log::info;

mod config;
mod debounce;
mod error;
mod generator;
mod render;
mod runtime;
mod signals;
mod snapshot;
mod types;

#[cfg(test)]
mod testutil;

use config::Config;
use generator::Generator;
use render::JsonRenderer;
use runtime::{DockerConnector, TlsConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cfg = Config::load()?;
    info!("Starting confgen with {} template(s)", cfg.templates.len());

    let connector = DockerConnector::new(TlsConfig {
        verify: cfg.tls_verify,
        cert: cfg.tls_cert.clone(),
        ca_cert: cfg.tls_ca_cert.clone(),
        key: cfg.tls_key.clone(),
    });
    let generator = Generator::new(Arc::new(connector), Arc::new(JsonRenderer), cfg).await?;
    generator.generate().await?;

    info!("Shutdown complete.");
    Ok(())
}
