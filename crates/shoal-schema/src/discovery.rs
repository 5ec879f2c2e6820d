use serde::{Deserialize, Serialize};
use std::fmt;

/// One member of a membership-service discovery backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub address: String,
    pub port: u16,
}

impl Peer {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Raw connection data from exactly one discovery backend.
///
/// The two variants are mutually exclusive by construction: a node is only
/// ever wired to one discovery relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConnectionInfo {
    /// A key/value service broadcasting its own URL (possibly a comma
    /// separated list of URLs).
    Url { url: String },
    /// A membership service returning its peers.
    Members { peers: Vec<Peer> },
}

/// Client material the discovery backend hands out for secured links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslCertificates {
    #[serde(default)]
    pub client_cert: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub client_ca: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryInfo {
    pub connection: ConnectionInfo,
    #[serde(default)]
    pub ssl: Option<SslCertificates>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryScheme {
    Etcd,
    Consul,
}

impl DiscoveryScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscoveryScheme::Etcd => "etcd",
            DiscoveryScheme::Consul => "consul",
        }
    }
}

impl fmt::Display for DiscoveryScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical discovery-backend address, e.g. `consul://h:p,h:p`.
///
/// Immutable once built; a new one is only computed when the discovery
/// relation is torn down and re-established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionString {
    scheme: DiscoveryScheme,
    endpoints: Vec<String>,
    secure: bool,
}

impl ConnectionString {
    pub fn new(scheme: DiscoveryScheme, endpoints: Vec<String>, secure: bool) -> Self {
        Self {
            scheme,
            endpoints,
            secure,
        }
    }

    pub fn scheme(&self) -> DiscoveryScheme {
        self.scheme
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Whether the original backend URL denoted an encrypted transport.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Discovery path swarm containers join and manage under.
    pub fn swarm_path(&self) -> String {
        format!("{self}/swarm")
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.endpoints.join(","))
    }
}
