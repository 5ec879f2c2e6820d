use crate::types::NodeName;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported config_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{field} must not contain whitespace or a port: '{value}'")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{0} must not be 0")]
    ZeroPort(&'static str),
    #[error("engine.cluster_port and swarm.manager_port must differ (both {0})")]
    PortConflict(u16),
}

/// Which implementation backs an external collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    System,
    Mock,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub config_version: u32,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    pub node: NodeSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub swarm: SwarmSection,
    #[serde(default)]
    pub leadership: LeadershipSection,
    #[serde(default)]
    pub authority: AuthoritySection,
    #[serde(default)]
    pub firewall: FirewallSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    pub name: NodeName,
    pub private_address: String,
    pub public_address: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_cluster_port")]
    pub cluster_port: u16,
    #[serde(default = "default_socket")]
    pub socket: String,
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_engine_config_file")]
    pub config_file: PathBuf,
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            cluster_port: default_cluster_port(),
            socket: default_socket(),
            service: default_service(),
            config_file: default_engine_config_file(),
            backend: BackendKind::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SwarmSection {
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_manager_port")]
    pub manager_port: u16,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_compose_command")]
    pub compose_command: String,
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for SwarmSection {
    fn default() -> Self {
        Self {
            image: default_image(),
            manager_port: default_manager_port(),
            project: default_project(),
            compose_command: default_compose_command(),
            backend: BackendKind::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LeadershipSection {
    /// Shared leader-settings document. Defaults to `<state_dir>/leader-settings.json`.
    #[serde(default)]
    pub settings_file: Option<PathBuf>,
    #[serde(default)]
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthoritySection {
    /// Directory the external CA drops issued material into.
    /// Defaults to `<state_dir>/ca-inbox`.
    #[serde(default)]
    pub inbox: Option<PathBuf>,
    #[serde(default)]
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FirewallSection {
    #[serde(default)]
    pub backend: BackendKind,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/shoal")
}

fn default_cluster_port() -> u16 {
    2376
}

fn default_socket() -> String {
    "unix:///var/run/docker.sock".to_owned()
}

fn default_service() -> String {
    "docker".to_owned()
}

fn default_engine_config_file() -> PathBuf {
    PathBuf::from("/etc/default/docker")
}

fn default_image() -> String {
    "swarm:1.2.9".to_owned()
}

fn default_manager_port() -> u16 {
    2377
}

fn default_project() -> String {
    "swarm".to_owned()
}

fn default_compose_command() -> String {
    "docker-compose".to_owned()
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.config_version));
        }
        if self.node.name.trim().is_empty() {
            return Err(ConfigError::EmptyField("node.name"));
        }
        check_address("node.private_address", &self.node.private_address)?;
        check_address("node.public_address", &self.node.public_address)?;
        if self.engine.socket.trim().is_empty() {
            return Err(ConfigError::EmptyField("engine.socket"));
        }
        if self.engine.service.trim().is_empty() {
            return Err(ConfigError::EmptyField("engine.service"));
        }
        if self.swarm.image.trim().is_empty() {
            return Err(ConfigError::EmptyField("swarm.image"));
        }
        if self.swarm.project.trim().is_empty() {
            return Err(ConfigError::EmptyField("swarm.project"));
        }
        if self.engine.cluster_port == 0 {
            return Err(ConfigError::ZeroPort("engine.cluster_port"));
        }
        if self.swarm.manager_port == 0 {
            return Err(ConfigError::ZeroPort("swarm.manager_port"));
        }
        if self.engine.cluster_port == self.swarm.manager_port {
            return Err(ConfigError::PortConflict(self.engine.cluster_port));
        }
        Ok(())
    }

    pub fn settings_file(&self) -> PathBuf {
        self.leadership
            .settings_file
            .clone()
            .unwrap_or_else(|| self.state_dir.join("leader-settings.json"))
    }

    pub fn authority_inbox(&self) -> PathBuf {
        self.authority
            .inbox
            .clone()
            .unwrap_or_else(|| self.state_dir.join("ca-inbox"))
    }

    /// `address:port` the engine listens on and advertises to the cluster.
    pub fn cluster_endpoint(&self) -> String {
        format!("{}:{}", self.node.private_address, self.engine.cluster_port)
    }

    /// Externally reachable `address:port` of the manager role.
    pub fn manager_endpoint(&self) -> String {
        format!("{}:{}", self.node.public_address, self.swarm.manager_port)
    }
}

fn check_address(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyField(field));
    }
    // IPv6 literals carry colons; only reject a trailing `:port` on names and v4.
    let looks_like_port = value.parse::<std::net::Ipv6Addr>().is_err() && value.contains(':');
    if value.chars().any(char::is_whitespace) || looks_like_port {
        return Err(ConfigError::InvalidAddress {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}

pub fn parse_config_str(input: &str) -> Result<NodeConfig, ConfigError> {
    let config: NodeConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<NodeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
