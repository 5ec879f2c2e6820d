//! The reaction rule table.
//!
//! Each rule is a guard over facts (plus an optional role) and an action
//! owned by one component. Rules are listed in evaluation order: teardown
//! first, then discovery, credentials, engine, orchestration and
//! distribution, so one event can cascade through every stage in a single
//! pass. The manager announcement follows whatever the orchestration rules
//! did to the manager container in the same pass.
//!
//! Rules that depend on the node's role are skipped, and keep their latches,
//! for a pass in which the role could not be looked up.

use crate::tracker::{ConditionTracker, Fact, Owner};
use shoal_schema::Role;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    UnlinkDiscovery,
    TeardownCluster,
    ResetEngine,
    WithdrawManager,
    LinkDiscovery,
    IssueServerMaterial,
    ConfigureEngine,
    SecureEngine,
    RelabelEngine,
    RestartEngine,
    LaunchCluster,
    SecureCluster,
    PromoteManager,
    DemoteManager,
    AnnounceManager,
    MintClientMaterial,
    ReceiveClientMaterial,
    PackageBundle,
}

impl Action {
    /// Whether the action's effect differs between leader and follower.
    pub fn uses_role(self) -> bool {
        matches!(
            self,
            Action::ConfigureEngine
                | Action::SecureEngine
                | Action::RelabelEngine
                | Action::LaunchCluster
                | Action::SecureCluster
                | Action::PromoteManager
                | Action::DemoteManager
                | Action::AnnounceManager
                | Action::MintClientMaterial
                | Action::ReceiveClientMaterial
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Guard {
    pub required: &'static [Fact],
    pub absent: &'static [Fact],
    pub role: Option<Role>,
}

impl Guard {
    pub fn holds(&self, tracker: &ConditionTracker, role: Role) -> bool {
        (self.role.is_none() || self.role == Some(role))
            && tracker.all_set(self.required)
            && tracker.none_set(self.absent)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub owner: Owner,
    pub guard: Guard,
    pub action: Action,
}

impl Rule {
    pub fn role_dependent(&self) -> bool {
        self.guard.role.is_some() || self.action.uses_role()
    }
}

const fn rule(
    name: &'static str,
    owner: Owner,
    required: &'static [Fact],
    absent: &'static [Fact],
    role: Option<Role>,
    action: Action,
) -> Rule {
    Rule {
        name,
        owner,
        guard: Guard {
            required,
            absent,
            role,
        },
        action,
    }
}

use crate::tracker::Fact::{
    BundlePlaced, CaAvailable, ClientMinted, ClientPlaced, ClusterAvailable, ClusterSecured,
    DiscoveryAvailable, DiscoveryConnected, EngineAvailable, EngineConfigured, EngineLeaderLabel,
    EngineSecured, ManagerAnnounced, ManagerRunning, RestartRequested, ServerPlaced,
};

pub const RULES: &[Rule] = &[
    rule(
        "unlink-discovery",
        Owner::Discovery,
        &[DiscoveryAvailable],
        &[DiscoveryConnected],
        None,
        Action::UnlinkDiscovery,
    ),
    rule(
        "teardown-cluster",
        Owner::Orchestrator,
        &[ClusterAvailable],
        &[DiscoveryAvailable],
        None,
        Action::TeardownCluster,
    ),
    rule(
        "reset-engine",
        Owner::Engine,
        &[EngineConfigured],
        &[DiscoveryAvailable],
        None,
        Action::ResetEngine,
    ),
    rule(
        "link-discovery",
        Owner::Discovery,
        &[DiscoveryConnected],
        &[DiscoveryAvailable],
        None,
        Action::LinkDiscovery,
    ),
    rule(
        "issue-server-material",
        Owner::Credentials,
        &[CaAvailable],
        &[ServerPlaced],
        None,
        Action::IssueServerMaterial,
    ),
    rule(
        "configure-engine",
        Owner::Engine,
        &[DiscoveryAvailable, EngineAvailable],
        &[EngineConfigured],
        None,
        Action::ConfigureEngine,
    ),
    rule(
        "secure-engine",
        Owner::Engine,
        &[EngineConfigured, ServerPlaced],
        &[EngineSecured],
        None,
        Action::SecureEngine,
    ),
    rule(
        "label-engine-leader",
        Owner::Engine,
        &[EngineConfigured, EngineAvailable],
        &[EngineLeaderLabel],
        Some(Role::Leader),
        Action::RelabelEngine,
    ),
    rule(
        "label-engine-follower",
        Owner::Engine,
        &[EngineConfigured, EngineLeaderLabel, EngineAvailable],
        &[],
        Some(Role::Follower),
        Action::RelabelEngine,
    ),
    rule(
        "restart-engine",
        Owner::Engine,
        &[RestartRequested, EngineAvailable],
        &[],
        None,
        Action::RestartEngine,
    ),
    rule(
        "launch-cluster",
        Owner::Orchestrator,
        &[DiscoveryAvailable, EngineConfigured, EngineAvailable],
        &[ClusterAvailable, RestartRequested],
        None,
        Action::LaunchCluster,
    ),
    rule(
        "secure-cluster",
        Owner::Orchestrator,
        &[ClusterAvailable, EngineSecured, EngineAvailable],
        &[ClusterSecured, RestartRequested],
        None,
        Action::SecureCluster,
    ),
    rule(
        "promote-manager",
        Owner::Orchestrator,
        &[ClusterAvailable, EngineAvailable],
        &[ManagerRunning, RestartRequested],
        Some(Role::Leader),
        Action::PromoteManager,
    ),
    rule(
        "demote-manager",
        Owner::Orchestrator,
        &[ClusterAvailable, ManagerRunning, EngineAvailable],
        &[RestartRequested],
        Some(Role::Follower),
        Action::DemoteManager,
    ),
    rule(
        "withdraw-manager",
        Owner::Leadership,
        &[ManagerAnnounced],
        &[ManagerRunning],
        None,
        Action::WithdrawManager,
    ),
    rule(
        "announce-manager",
        Owner::Leadership,
        &[ClusterAvailable, ManagerRunning],
        &[ManagerAnnounced],
        Some(Role::Leader),
        Action::AnnounceManager,
    ),
    rule(
        "mint-client-material",
        Owner::Credentials,
        &[ClusterAvailable, CaAvailable],
        &[ClientMinted],
        Some(Role::Leader),
        Action::MintClientMaterial,
    ),
    rule(
        "receive-client-material",
        Owner::Credentials,
        &[ClusterAvailable],
        &[ClientPlaced],
        Some(Role::Follower),
        Action::ReceiveClientMaterial,
    ),
    rule(
        "package-bundle",
        Owner::Credentials,
        &[ClientPlaced],
        &[BundlePlaced],
        None,
        Action::PackageBundle,
    ),
];

/// Rules whose guard holds and that have not fired since it last became true.
///
/// Latches make firing edge-triggered: a latched rule stays quiet until its
/// guard goes false again. Guards are re-checked one rule at a time during a
/// pass, so this is only a snapshot of the current facts.
pub fn ready<'a>(
    tracker: &'a ConditionTracker,
    role: Role,
    latches: &'a BTreeSet<String>,
) -> impl Iterator<Item = &'static Rule> + 'a {
    RULES
        .iter()
        .filter(move |r| r.guard.holds(tracker, role) && !latches.contains(r.name))
}
