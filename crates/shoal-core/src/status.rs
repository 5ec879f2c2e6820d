use crate::tracker::{ConditionTracker, Fact};
use serde::{Deserialize, Serialize};
use shoal_schema::Role;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "on", content = "detail", rename_all = "kebab-case")]
pub enum WaitingOn {
    Discovery,
    Engine,
    CertificateAuthority,
    LeaderCredentials,
    /// Malformed input the operator has to fix.
    Configuration(String),
}

impl fmt::Display for WaitingOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitingOn::Discovery => write!(f, "discovery backend"),
            WaitingOn::Engine => write!(f, "container engine"),
            WaitingOn::CertificateAuthority => write!(f, "certificate authority"),
            WaitingOn::LeaderCredentials => write!(f, "client credentials from the leader"),
            WaitingOn::Configuration(detail) => write!(f, "configuration: {detail}"),
        }
    }
}

/// The externally visible node status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "waiting-on", rename_all = "kebab-case")]
pub enum Status {
    Initializing,
    Blocked(WaitingOn),
    ActiveLeader,
    ActiveFollower,
    DegradedReconfiguring,
}

impl Status {
    /// Derive the status from the facts after a pass. `blocker` is the
    /// malformed-input failure of the pass, if any.
    pub fn derive(
        tracker: &ConditionTracker,
        role: Role,
        degraded: bool,
        blocker: Option<&str>,
    ) -> Status {
        if let Some(detail) = blocker {
            return Status::Blocked(WaitingOn::Configuration(detail.to_owned()));
        }
        if tracker.is_set(Fact::ClusterAvailable) {
            return match role {
                Role::Leader if !tracker.is_set(Fact::ClientPlaced) && !tracker.is_set(Fact::CaAvailable) => {
                    Status::Blocked(WaitingOn::CertificateAuthority)
                }
                Role::Leader => Status::ActiveLeader,
                Role::Follower if !tracker.is_set(Fact::ClientPlaced) => {
                    Status::Blocked(WaitingOn::LeaderCredentials)
                }
                Role::Follower => Status::ActiveFollower,
            };
        }
        if degraded {
            return Status::DegradedReconfiguring;
        }
        if !tracker.is_set(Fact::DiscoveryConnected) {
            Status::Blocked(WaitingOn::Discovery)
        } else if !tracker.is_set(Fact::EngineAvailable) {
            Status::Blocked(WaitingOn::Engine)
        } else {
            Status::Initializing
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Status::ActiveLeader | Status::ActiveFollower)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Initializing => write!(f, "initializing"),
            Status::Blocked(on) => write!(f, "blocked: waiting on {on}"),
            Status::ActiveLeader => write!(f, "active (leader)"),
            Status::ActiveFollower => write!(f, "active (follower)"),
            Status::DegradedReconfiguring => write!(f, "degraded: reconfiguring"),
        }
    }
}
