//! Convergence controller for one node of a docker swarm cluster.
//!
//! This crate ties together schema parsing, node storage and the runtime
//! collaborators into the `Controller`: every inbound `Event` updates the
//! externally owned facts in the `ConditionTracker` and then runs one ordered
//! pass over the reaction `RULES`. The components the rules act through live
//! in their own modules (discovery adapter, engine configurator,
//! orchestrator, leadership coordinator, credential manager). It also
//! provides lifecycle stage and status derivation, node locking, and parsing
//! of swarm benchmark reports.

pub mod bench;
pub mod concurrency;
pub mod controller;
pub mod credentials;
pub mod discovery;
pub mod engine_config;
pub mod leadership;
pub mod lifecycle;
pub mod orchestrator;
pub mod rules;
pub mod status;
pub mod tracker;

pub use bench::{parse_bench_report, BenchError, BenchReport, Measurement};
pub use concurrency::{
    deliveries_in_flight, install_signal_handler, shutdown_requested, DeliveryGuard, NodeLock,
    EXIT_INTERRUPTED,
};
pub use controller::{Controller, DesiredState, Report, RuleFailure};
pub use credentials::CredentialManager;
pub use discovery::{normalize, DiscoveryAdapter, DiscoveryError};
pub use engine_config::EngineConfigurator;
pub use leadership::LeadershipCoordinator;
pub use lifecycle::{validate_transition, Stage};
pub use orchestrator::{Orchestrator, UpOutcome};
pub use rules::{Rule, RULES};
pub use status::{Status, WaitingOn};
pub use tracker::{ConditionTracker, Fact, Owner, Transition};

use serde::Serialize;
use shoal_runtime::RuntimeError;
use shoal_store::StoreError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(#[from] shoal_schema::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("daemon config error: {0}")]
    Daemon(#[from] shoal_schema::DaemonConfigError),
    #[error("incomplete {what}: missing {missing}")]
    IncompleteMaterial { what: String, missing: String },
    #[error("no discovery data has been delivered")]
    MissingDiscoveryData,
    #[error("discovery is not linked")]
    NotLinked,
    #[error("only the leader may do this")]
    NotLeader,
    #[error("waiting for the leader to broadcast {0}")]
    AwaitingBroadcast(&'static str),
    #[error("unknown fact in state: {0}")]
    UnknownFact(String),
    #[error("fact {fact} is not owned by {owner}")]
    FactOwnership { fact: &'static str, owner: Owner },
    #[error("invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How a failed action is handled by the evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// Retried on the next delivery.
    Transient,
    /// Retried too, but the node reports itself blocked until the input changes.
    Malformed,
    /// Aborts the delivery.
    Infrastructure,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Malformed => "malformed",
            ErrorClass::Infrastructure => "infrastructure",
        })
    }
}

fn store_class(e: &StoreError) -> ErrorClass {
    match e {
        StoreError::IncompleteMaterial { .. } => ErrorClass::Malformed,
        StoreError::NotPlaced(_) => ErrorClass::Transient,
        _ => ErrorClass::Infrastructure,
    }
}

impl CoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::Runtime(e) => match e {
                RuntimeError::Malformed { .. } | RuntimeError::Serialization(_) => {
                    ErrorClass::Malformed
                }
                RuntimeError::Store(se) => store_class(se),
                _ => ErrorClass::Transient,
            },
            CoreError::Store(e) => store_class(e),
            CoreError::Config(_)
            | CoreError::Discovery(_)
            | CoreError::Daemon(_)
            | CoreError::IncompleteMaterial { .. }
            | CoreError::MissingDiscoveryData
            | CoreError::NotLinked => ErrorClass::Malformed,
            CoreError::NotLeader | CoreError::AwaitingBroadcast(_) => ErrorClass::Transient,
            CoreError::UnknownFact(_)
            | CoreError::FactOwnership { .. }
            | CoreError::InvalidTransition { .. }
            | CoreError::Io(_)
            | CoreError::Serialization(_) => ErrorClass::Infrastructure,
        }
    }
}
