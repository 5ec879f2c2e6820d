//! Condition Tracker: the set of named milestones every component reads.

use crate::CoreError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// The component allowed to assert and retract a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Owner {
    /// Inbound event deliveries (externally observed facts).
    Relation,
    Discovery,
    Engine,
    Orchestrator,
    Leadership,
    Credentials,
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Owner::Relation => "relation",
            Owner::Discovery => "discovery adapter",
            Owner::Engine => "engine configurator",
            Owner::Orchestrator => "orchestrator",
            Owner::Leadership => "leadership coordinator",
            Owner::Credentials => "credential manager",
        };
        f.write_str(name)
    }
}

macro_rules! facts {
    ($($variant:ident => $name:literal, $owner:ident;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Fact {
            $($variant,)*
        }

        impl Fact {
            pub const ALL: &'static [Fact] = &[$(Fact::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Fact::$variant => $name,)*
                }
            }

            pub fn owner(self) -> Owner {
                match self {
                    $(Fact::$variant => Owner::$owner,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Fact> {
                match name {
                    $($name => Some(Fact::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

facts! {
    DiscoveryConnected => "discovery.connected", Relation;
    EngineAvailable => "engine.available", Relation;
    CaAvailable => "ca.available", Relation;
    DiscoveryAvailable => "discovery.available", Discovery;
    EngineConfigured => "engine.configured", Engine;
    EngineSecured => "engine.secured", Engine;
    RestartRequested => "engine.restart-requested", Engine;
    EngineLeaderLabel => "engine.leader-label", Engine;
    ClusterAvailable => "cluster.available", Orchestrator;
    ClusterSecured => "cluster.secured", Orchestrator;
    ManagerRunning => "cluster.manager-running", Orchestrator;
    ManagerAnnounced => "manager.announced", Leadership;
    ServerPlaced => "tls.server.placed", Credentials;
    ClientMinted => "tls.client.minted", Credentials;
    ClientPlaced => "tls.client.placed", Credentials;
    BundlePlaced => "bundle.placed", Credentials;
}

impl Fact {
    #[inline]
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Facts one action asserts and retracts, committed under its owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub assert: Vec<Fact>,
    pub retract: Vec<Fact>,
}

impl Transition {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn asserting(facts: &[Fact]) -> Self {
        Self {
            assert: facts.to_vec(),
            retract: Vec::new(),
        }
    }

    pub fn retracting(facts: &[Fact]) -> Self {
        Self {
            assert: Vec::new(),
            retract: facts.to_vec(),
        }
    }

    #[must_use]
    pub fn and_assert(mut self, fact: Fact) -> Self {
        self.assert.push(fact);
        self
    }

    #[must_use]
    pub fn and_retract(mut self, fact: Fact) -> Self {
        self.retract.push(fact);
        self
    }
}

/// Fact set backed by a bitset. Presence is the only state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionTracker {
    bits: u32,
}

impl ConditionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a tracker from persisted fact names.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a String>) -> Result<Self, CoreError> {
        let mut tracker = Self::new();
        for name in names {
            let fact = Fact::from_name(name).ok_or_else(|| CoreError::UnknownFact(name.clone()))?;
            tracker.assert(fact);
        }
        Ok(tracker)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.set_facts().map(|f| f.name().to_owned()).collect()
    }

    pub fn set_facts(&self) -> impl Iterator<Item = Fact> + '_ {
        Fact::ALL.iter().copied().filter(|f| self.is_set(*f))
    }

    /// Returns whether the fact was newly asserted.
    pub fn assert(&mut self, fact: Fact) -> bool {
        let was = self.is_set(fact);
        self.bits |= fact.bit();
        !was
    }

    /// Returns whether the fact was previously asserted.
    pub fn retract(&mut self, fact: Fact) -> bool {
        let was = self.is_set(fact);
        self.bits &= !fact.bit();
        was
    }

    #[inline]
    pub fn is_set(&self, fact: Fact) -> bool {
        self.bits & fact.bit() != 0
    }

    pub fn all_set(&self, facts: &[Fact]) -> bool {
        facts.iter().all(|f| self.is_set(*f))
    }

    pub fn none_set(&self, facts: &[Fact]) -> bool {
        facts.iter().all(|f| !self.is_set(*f))
    }

    /// Apply a transition on behalf of `owner`. Nothing is applied when any
    /// fact in it belongs to another component.
    pub fn commit(&mut self, owner: Owner, transition: &Transition) -> Result<(), CoreError> {
        if let Some(fact) = transition
            .assert
            .iter()
            .chain(&transition.retract)
            .find(|f| f.owner() != owner)
        {
            return Err(CoreError::FactOwnership {
                fact: fact.name(),
                owner,
            });
        }
        for fact in &transition.retract {
            if self.retract(*fact) {
                tracing::debug!("{owner} retracted {fact}");
            }
        }
        for fact in &transition.assert {
            if self.assert(*fact) {
                tracing::debug!("{owner} asserted {fact}");
            }
        }
        Ok(())
    }
}
