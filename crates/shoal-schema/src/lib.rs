//! Configuration and value types for the shoal cluster convergence controller.
//!
//! This crate defines the schema layer: the TOML node configuration
//! (`NodeConfig`), discovery inputs and the canonical `ConnectionString`,
//! the engine's `DaemonConfig` option list, the `LaunchDescription` rendered
//! for the compose launcher, `TlsMaterial`, and the inbound `Event` stream.

pub mod config;
pub mod daemon;
pub mod discovery;
pub mod event;
pub mod launch;
pub mod tls;
pub mod types;

pub use config::{
    parse_config_file, parse_config_str, AuthoritySection, BackendKind, ConfigError,
    EngineSection, FirewallSection, LeadershipSection, NodeConfig, NodeSection, SwarmSection,
};
pub use daemon::{DaemonConfig, DaemonConfigError, DaemonOption};
pub use discovery::{
    ConnectionInfo, ConnectionString, DiscoveryInfo, DiscoveryScheme, Peer, SslCertificates,
};
pub use event::Event;
pub use launch::{
    ContainerRole, LaunchDescription, PortBinding, RestartPolicy, ServiceSpec, DIGEST_LABEL,
};
pub use tls::{MaterialRole, TlsMaterial};
pub use types::{ConfigDigest, NodeName, Role};
