use crate::types::ConfigDigest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Container label carrying the digest of the service configuration a
/// container was started from.
pub const DIGEST_LABEL: &str = "io.shoal.config-digest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRole {
    Manager,
    Agent,
}

impl ContainerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerRole::Manager => "manager",
            ContainerRole::Agent => "agent",
        }
    }
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    Always,
    UnlessStopped,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// One container role as the compose launcher should run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub role: ContainerRole,
    pub image: String,
    pub restart: RestartPolicy,
    pub command: Vec<String>,
    #[serde(default)]
    pub ports: Vec<PortBinding>,
    /// `host:container[:ro]` bind mounts.
    #[serde(default)]
    pub volumes: Vec<String>,
}

impl ServiceSpec {
    /// Blake3 over the canonical JSON of this spec. Two specs with the same
    /// digest start identical containers.
    pub fn digest(&self) -> Result<ConfigDigest, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(ConfigDigest::new(
            blake3::hash(json.as_bytes()).to_hex().to_string(),
        ))
    }
}

/// The set of container roles this node should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDescription {
    project: String,
    services: BTreeMap<ContainerRole, ServiceSpec>,
}

#[derive(Serialize)]
struct ComposeFile<'a> {
    version: &'static str,
    services: BTreeMap<&'static str, ComposeService<'a>>,
}

#[derive(Serialize)]
struct ComposeService<'a> {
    image: &'a str,
    restart: RestartPolicy,
    command: &'a [String],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    labels: BTreeMap<&'static str, String>,
}

impl LaunchDescription {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            services: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_service(mut self, spec: ServiceSpec) -> Self {
        self.services.insert(spec.role, spec);
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn roles(&self) -> Vec<ContainerRole> {
        self.services.keys().copied().collect()
    }

    pub fn includes(&self, role: ContainerRole) -> bool {
        self.services.contains_key(&role)
    }

    pub fn service(&self, role: ContainerRole) -> Option<&ServiceSpec> {
        self.services.get(&role)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.values()
    }

    /// Render the declarative description file handed to the launcher.
    /// JSON is a subset of YAML, so compose reads this file as-is.
    pub fn render_compose(&self) -> Result<String, serde_json::Error> {
        let mut services = BTreeMap::new();
        for spec in self.services.values() {
            let mut labels = BTreeMap::new();
            labels.insert(DIGEST_LABEL, spec.digest()?.into_inner());
            services.insert(
                spec.role.as_str(),
                ComposeService {
                    image: &spec.image,
                    restart: spec.restart,
                    command: &spec.command,
                    ports: spec.ports.iter().map(ToString::to_string).collect(),
                    volumes: spec.volumes.clone(),
                    labels,
                },
            );
        }
        let file = ComposeFile {
            version: "2",
            services,
        };
        let mut out = serde_json::to_string_pretty(&file)?;
        out.push('\n');
        Ok(out)
    }
}
