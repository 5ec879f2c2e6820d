//! Discovery Adapter: turns backend-specific connection data into one
//! canonical [`ConnectionString`].

use crate::CoreError;
use shoal_schema::{ConnectionInfo, ConnectionString, DiscoveryInfo, DiscoveryScheme, Peer};
use shoal_store::TlsStore;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("membership service reported no peers")]
    EmptyMembership,
    #[error("discovery URL is empty")]
    EmptyUrl,
    #[error("unsupported discovery URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),
    #[error("malformed discovery URL '{0}'")]
    MalformedUrl(String),
    #[error("discovery URLs mix secure and plain transports: {0}")]
    MixedTransport(String),
    #[error("malformed peer '{0}'")]
    MalformedPeer(String),
    #[error("secured discovery link without client material")]
    MissingSslMaterial,
}

/// Normalize connection data into a connection string. Pure and stable under
/// repeated calls with identical input.
pub fn normalize(info: &ConnectionInfo) -> Result<ConnectionString, DiscoveryError> {
    match info {
        ConnectionInfo::Url { url } => normalize_urls(url),
        ConnectionInfo::Members { peers } => normalize_members(peers),
    }
}

fn normalize_urls(urls: &str) -> Result<ConnectionString, DiscoveryError> {
    if urls.trim().is_empty() {
        return Err(DiscoveryError::EmptyUrl);
    }
    let mut endpoints = Vec::new();
    let mut secure = None;
    for url in urls.split(',').map(str::trim) {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| DiscoveryError::MalformedUrl(url.to_owned()))?;
        let this_secure = match scheme {
            "http" => false,
            "https" => true,
            other => return Err(DiscoveryError::UnsupportedScheme(other.to_owned())),
        };
        if *secure.get_or_insert(this_secure) != this_secure {
            return Err(DiscoveryError::MixedTransport(urls.to_owned()));
        }
        let endpoint = rest.trim_end_matches('/');
        if endpoint.is_empty() || endpoint.contains('/') || endpoint.contains(char::is_whitespace)
        {
            return Err(DiscoveryError::MalformedUrl(url.to_owned()));
        }
        endpoints.push(endpoint.to_owned());
    }
    Ok(ConnectionString::new(
        DiscoveryScheme::Etcd,
        endpoints,
        secure.unwrap_or(false),
    ))
}

fn normalize_members(peers: &[Peer]) -> Result<ConnectionString, DiscoveryError> {
    if peers.is_empty() {
        return Err(DiscoveryError::EmptyMembership);
    }
    let mut endpoints = Vec::with_capacity(peers.len());
    for peer in peers {
        if peer.address.trim().is_empty()
            || peer.address.contains(char::is_whitespace)
            || peer.port == 0
        {
            return Err(DiscoveryError::MalformedPeer(peer.to_string()));
        }
        endpoints.push(peer.to_string());
    }
    Ok(ConnectionString::new(
        DiscoveryScheme::Consul,
        endpoints,
        false,
    ))
}

pub struct DiscoveryAdapter<'a> {
    tls: &'a TlsStore,
}

impl<'a> DiscoveryAdapter<'a> {
    pub fn new(tls: &'a TlsStore) -> Self {
        Self { tls }
    }

    /// Normalize the delivered discovery data. A secured link only succeeds
    /// once the backend's client material is staged on this node.
    pub fn link(&self, discovery: &DiscoveryInfo) -> Result<ConnectionString, CoreError> {
        let connection = normalize(&discovery.connection)?;
        if connection.is_secure() {
            let ssl = discovery
                .ssl
                .as_ref()
                .ok_or(DiscoveryError::MissingSslMaterial)?;
            let changed = self.tls.stage_discovery(ssl)?;
            debug!("discovery client material staged (changed: {changed})");
        }
        info!("discovery linked: {connection}");
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_schema::SslCertificates;
    use shoal_store::{NodeLayout, StoreError};

    fn url(u: &str) -> ConnectionInfo {
        ConnectionInfo::Url { url: u.to_owned() }
    }

    #[test]
    fn http_rewrites_to_etcd() {
        let cs = normalize(&url("http://10.0.0.9:2379")).unwrap();
        assert_eq!(cs.to_string(), "etcd://10.0.0.9:2379");
        assert!(!cs.is_secure());
    }

    #[test]
    fn https_rewrites_to_etcd_with_tls_flag() {
        let cs = normalize(&url("https://10.0.0.9:2379")).unwrap();
        assert_eq!(cs.to_string(), "etcd://10.0.0.9:2379");
        assert!(cs.is_secure());
    }

    #[test]
    fn url_lists_keep_every_endpoint() {
        let cs = normalize(&url("http://a:2379/, http://b:2379")).unwrap();
        assert_eq!(cs.to_string(), "etcd://a:2379,b:2379");
    }

    #[test]
    fn normalize_is_stable() {
        let info = url("https://10.0.0.9:2379");
        assert_eq!(normalize(&info).unwrap(), normalize(&info).unwrap());
    }

    #[test]
    fn bad_urls_are_rejected() {
        assert_eq!(
            normalize(&url("ftp://a:1")),
            Err(DiscoveryError::UnsupportedScheme("ftp".to_owned()))
        );
        assert!(matches!(
            normalize(&url("a:2379")),
            Err(DiscoveryError::MalformedUrl(_))
        ));
        assert!(matches!(
            normalize(&url("http://a:1,https://b:1")),
            Err(DiscoveryError::MixedTransport(_))
        ));
        assert!(matches!(
            normalize(&url("http://a:1/v2/keys")),
            Err(DiscoveryError::MalformedUrl(_))
        ));
        assert_eq!(normalize(&url("  ")), Err(DiscoveryError::EmptyUrl));
    }

    #[test]
    fn members_join_in_input_order() {
        let peers = vec![
            Peer::new("10.0.0.3", 8500),
            Peer::new("10.0.0.1", 8500),
            Peer::new("10.0.0.2", 8501),
        ];
        let cs = normalize(&ConnectionInfo::Members { peers }).unwrap();
        assert_eq!(
            cs.to_string(),
            "consul://10.0.0.3:8500,10.0.0.1:8500,10.0.0.2:8501"
        );
        assert_eq!(cs.endpoints().len(), 3);
    }

    #[test]
    fn empty_membership_is_fatal() {
        assert_eq!(
            normalize(&ConnectionInfo::Members { peers: Vec::new() }),
            Err(DiscoveryError::EmptyMembership)
        );
    }

    #[test]
    fn zero_port_peer_is_malformed() {
        let peers = vec![Peer::new("10.0.0.1", 0)];
        assert!(matches!(
            normalize(&ConnectionInfo::Members { peers }),
            Err(DiscoveryError::MalformedPeer(_))
        ));
    }

    #[test]
    fn secure_link_stages_client_material() {
        let dir = tempfile::tempdir().unwrap();
        let layout = NodeLayout::new(dir.path());
        layout.initialize().unwrap();
        let tls = TlsStore::new(layout.clone());
        let adapter = DiscoveryAdapter::new(&tls);

        let mut info = DiscoveryInfo {
            connection: url("https://10.0.0.9:2379"),
            ssl: None,
        };
        assert!(matches!(
            adapter.link(&info),
            Err(CoreError::Discovery(DiscoveryError::MissingSslMaterial))
        ));

        info.ssl = Some(SslCertificates {
            client_cert: Some("CERT".to_owned()),
            client_key: Some("KEY".to_owned()),
            client_ca: None,
        });
        assert!(matches!(
            adapter.link(&info),
            Err(CoreError::Store(StoreError::IncompleteMaterial { .. }))
        ));
        assert!(!tls.discovery_staged());

        info.ssl = Some(SslCertificates {
            client_cert: Some("CERT".to_owned()),
            client_key: Some("KEY".to_owned()),
            client_ca: Some("CA".to_owned()),
        });
        let cs = adapter.link(&info).unwrap();
        assert!(cs.is_secure());
        assert!(tls.discovery_staged());
        assert_eq!(std::fs::read_to_string(layout.discovery_key()).unwrap(), "KEY");
    }

    #[test]
    fn plain_link_ignores_ssl_data() {
        let dir = tempfile::tempdir().unwrap();
        let layout = NodeLayout::new(dir.path());
        layout.initialize().unwrap();
        let tls = TlsStore::new(layout);
        let adapter = DiscoveryAdapter::new(&tls);
        let info = DiscoveryInfo {
            connection: url("http://10.0.0.9:2379"),
            ssl: Some(SslCertificates::default()),
        };
        assert!(adapter.link(&info).is_ok());
        assert!(!tls.discovery_staged());
    }
}
