//! External collaborators of the shoal convergence controller.
//!
//! Every side effect the controller has on the host goes through one of the
//! traits defined here: `EngineService` (engine daemon configuration and
//! restart), `Launcher` (compose-style container launcher), `Firewall`,
//! `Election` (leadership and the leader's broadcast settings) and
//! `CertificateAuthority`. Each trait has a system implementation that shells
//! out or reads shared files, and an in-memory mock used by tests and dry runs.
//! `select_backends` wires them from the node configuration.

pub mod authority;
pub mod backend;
pub mod election;
pub mod engine;
pub mod firewall;
pub mod launcher;
pub mod mock;
pub mod prereq;
mod process;

pub use authority::{CertificateAuthority, DirectoryAuthority};
pub use backend::{select_backends, Backends};
pub use election::{Election, FileElection};
pub use engine::{EngineService, SystemdEngine};
pub use firewall::{Firewall, UfwFirewall};
pub use launcher::{ComposeLauncher, Launcher, RunningContainer};
pub use prereq::{check_host_prereqs, format_missing, MissingPrereq};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("no such container: {0}")]
    NoSuchContainer(String),
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("only the leader may publish broadcast settings")]
    NotLeader,
    #[error("malformed {what}: {detail}")]
    Malformed { what: String, detail: String },
    #[error("store error: {0}")]
    Store(#[from] shoal_store::StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
