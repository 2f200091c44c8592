use thiserror::Error;

/// Errors raised while constructing the generator and its daemon clients.
///
/// Everything past construction recovers locally and surfaces as log lines;
/// the process keeps running as long as any trigger remains viable.
#[derive(Debug, Error)]
pub enum GenError {
    /// The endpoint string could not be understood.
    #[error("bad endpoint: {0}")]
    BadEndpoint(String),

    /// The endpoint was well-formed but the transport could not be built.
    #[error("unable to create daemon client: {0}")]
    ClientInit(#[source] anyhow::Error),
}
