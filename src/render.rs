//! Rendering seam.
//!
//! The engine treats rendering as a pure function from a template config
//! and a snapshot to a changed-or-not answer.  [`JsonRenderer`] is the
//! built-in implementation; richer template engines plug in through the
//! [`Renderer`] trait.

use std::fs;
use std::path::Path;

use log::error;
use serde::Serialize;

use crate::config::TemplateConfig;
use crate::snapshot::{docker_env, server_info, DaemonEnv, ServerInfo};
use crate::types::RuntimeContainer;

/// Produces one output file from a snapshot.
pub trait Renderer: Send + Sync {
    /// Renders `config.dest` from the snapshot, returning whether the file
    /// content changed.
    fn render(&self, config: &TemplateConfig, containers: &[RuntimeContainer]) -> bool;
}

/// Writes the snapshot and daemon environment as pretty-printed JSON.
///
/// The destination is rewritten only when the rendered bytes differ from
/// the current file content.
pub struct JsonRenderer;

#[derive(Serialize)]
struct Document<'a> {
    containers: &'a [RuntimeContainer],
    #[serde(skip_serializing_if = "Option::is_none")]
    docker: Option<DaemonEnv>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<ServerInfo>,
}

impl Renderer for JsonRenderer {
    fn render(&self, config: &TemplateConfig, containers: &[RuntimeContainer]) -> bool {
        let document = Document {
            containers,
            docker: docker_env(),
            server: server_info(),
        };
        let rendered = match serde_json::to_vec_pretty(&document) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Error rendering {}: {}", config.dest, e);
                return false;
            }
        };

        let current = fs::read(&config.dest).unwrap_or_default();
        if current == rendered {
            return false;
        }

        if let Some(parent) = Path::new(&config.dest).parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Error creating directory for {}: {}", config.dest, e);
                return false;
            }
        }
        match fs::write(&config.dest, &rendered) {
            Ok(()) => true,
            Err(e) => {
                error!("Error writing {}: {}", config.dest, e);
                false
            }
        }
    }
}
