use crate::tracker::{ConditionTracker, Fact};
use crate::CoreError;
use serde::{Deserialize, Serialize};
use shoal_schema::Role;
use std::fmt;

/// Convergence stage of one node, derived from its facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    NoDiscovery,
    DiscoveryLinked,
    EngineConfigured,
    ClusterUp,
    CredentialsMinted,
    CredentialsReceived,
    BundlePlaced,
}

impl Stage {
    pub fn derive(tracker: &ConditionTracker, role: Role) -> Stage {
        if !tracker.is_set(Fact::DiscoveryAvailable) {
            Stage::NoDiscovery
        } else if !tracker.is_set(Fact::EngineConfigured) {
            Stage::DiscoveryLinked
        } else if !tracker.is_set(Fact::ClusterAvailable) {
            Stage::EngineConfigured
        } else if tracker.is_set(Fact::BundlePlaced) {
            Stage::BundlePlaced
        } else if tracker.is_set(Fact::ClientPlaced) {
            if role.is_leader() {
                Stage::CredentialsMinted
            } else {
                Stage::CredentialsReceived
            }
        } else {
            Stage::ClusterUp
        }
    }

    fn rank(self) -> u8 {
        match self {
            Stage::NoDiscovery => 0,
            Stage::DiscoveryLinked => 1,
            Stage::EngineConfigured => 2,
            Stage::ClusterUp => 3,
            Stage::CredentialsMinted | Stage::CredentialsReceived => 4,
            Stage::BundlePlaced => 5,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NoDiscovery => "no-discovery",
            Stage::DiscoveryLinked => "discovery-linked",
            Stage::EngineConfigured => "engine-configured",
            Stage::ClusterUp => "cluster-up",
            Stage::CredentialsMinted => "credentials-minted",
            Stage::CredentialsReceived => "credentials-received",
            Stage::BundlePlaced => "bundle-placed",
        };
        f.write_str(name)
    }
}

/// One pass may cascade forward through several stages. The only backward
/// edge is the teardown to `NoDiscovery`.
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), CoreError> {
    if to == Stage::NoDiscovery || to.rank() >= from.rank() {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(Stage::NoDiscovery, Stage::DiscoveryLinked).is_ok());
        assert!(validate_transition(Stage::NoDiscovery, Stage::ClusterUp).is_ok()); // cascade
        assert!(validate_transition(Stage::ClusterUp, Stage::ClusterUp).is_ok());
        assert!(validate_transition(Stage::ClusterUp, Stage::CredentialsReceived).is_ok());
        assert!(validate_transition(Stage::CredentialsMinted, Stage::CredentialsReceived).is_ok());
        assert!(validate_transition(Stage::BundlePlaced, Stage::NoDiscovery).is_ok());
        assert!(validate_transition(Stage::ClusterUp, Stage::NoDiscovery).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Stage::ClusterUp, Stage::DiscoveryLinked).is_err());
        assert!(validate_transition(Stage::BundlePlaced, Stage::ClusterUp).is_err());
        assert!(validate_transition(Stage::EngineConfigured, Stage::DiscoveryLinked).is_err());
    }

    #[test]
    fn derive_follows_facts() {
        let mut t = ConditionTracker::new();
        assert_eq!(Stage::derive(&t, Role::Leader), Stage::NoDiscovery);
        t.assert(Fact::DiscoveryAvailable);
        assert_eq!(Stage::derive(&t, Role::Leader), Stage::DiscoveryLinked);
        t.assert(Fact::EngineConfigured);
        assert_eq!(Stage::derive(&t, Role::Leader), Stage::EngineConfigured);
        t.assert(Fact::ClusterAvailable);
        assert_eq!(Stage::derive(&t, Role::Leader), Stage::ClusterUp);
        t.assert(Fact::ClientPlaced);
        assert_eq!(Stage::derive(&t, Role::Leader), Stage::CredentialsMinted);
        assert_eq!(Stage::derive(&t, Role::Follower), Stage::CredentialsReceived);
        t.assert(Fact::BundlePlaced);
        assert_eq!(Stage::derive(&t, Role::Follower), Stage::BundlePlaced);
    }

    #[test]
    fn placed_credentials_do_not_hold_stage_after_link_loss() {
        let mut t = ConditionTracker::new();
        t.assert(Fact::ClientPlaced);
        t.assert(Fact::BundlePlaced);
        assert_eq!(Stage::derive(&t, Role::Leader), Stage::NoDiscovery);
    }
}
