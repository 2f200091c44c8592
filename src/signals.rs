//! OS signal ingress.
//!
//! Consumers interpret SIGHUP as "re-render everything" and SIGINT/SIGTERM
//! as shutdown.  Every consuming task holds its own subscription; OS
//! notification stops when the value is dropped.

use std::fmt;
use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

/// Signals the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sig {
    Hup,
    Int,
    Term,
}

impl fmt::Display for Sig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sig::Hup => "SIGHUP",
            Sig::Int => "SIGINT",
            Sig::Term => "SIGTERM",
        };
        f.write_str(name)
    }
}

/// A scoped subscription to SIGHUP, SIGINT and SIGTERM.
pub struct Signals {
    hup: Signal,
    int: Signal,
    term: Signal,
}

impl Signals {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            hup: signal(SignalKind::hangup())?,
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
        })
    }

    /// Waits for the next signal.  Returns `None` if the streams close.
    pub async fn recv(&mut self) -> Option<Sig> {
        tokio::select! {
            received = self.hup.recv() => received.map(|_| Sig::Hup),
            received = self.int.recv() => received.map(|_| Sig::Int),
            received = self.term.recv() => received.map(|_| Sig::Term),
        }
    }
}
