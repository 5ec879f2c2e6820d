use crate::discovery::DiscoveryInfo;
use serde::{Deserialize, Serialize};

/// One inbound event delivery. Each delivery updates the externally owned
/// facts and then triggers exactly one ordered evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    /// The discovery relation joined or its data changed.
    DiscoveryJoined { discovery: DiscoveryInfo },
    /// The discovery relation was torn down.
    DiscoveryDeparted,
    EngineReady,
    EngineStopped,
    /// The external certificate authority can issue material.
    CaReady,
    LeadershipChanged,
    /// The leader's broadcast settings changed.
    BroadcastChanged,
    /// Plain re-delivery with no new external facts.
    Update,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::DiscoveryJoined { .. } => "discovery-joined",
            Event::DiscoveryDeparted => "discovery-departed",
            Event::EngineReady => "engine-ready",
            Event::EngineStopped => "engine-stopped",
            Event::CaReady => "ca-ready",
            Event::LeadershipChanged => "leadership-changed",
            Event::BroadcastChanged => "broadcast-changed",
            Event::Update => "update",
        }
    }
}
