use crate::layout::NodeLayout;
use crate::{write_if_changed, StoreError};
use shoal_schema::{SslCertificates, TlsMaterial};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const CERT_MODE: u32 = 0o644;
const KEY_MODE: u32 = 0o600;

struct MaterialPaths {
    what: &'static str,
    cert: PathBuf,
    key: PathBuf,
    ca: PathBuf,
}

/// Places TLS material at the fixed paths the engine configuration and the
/// launch description reference.
pub struct TlsStore {
    layout: NodeLayout,
}

impl TlsStore {
    pub fn new(layout: NodeLayout) -> Self {
        Self { layout }
    }

    fn server_paths(&self) -> MaterialPaths {
        MaterialPaths {
            what: "server material",
            cert: self.layout.server_cert(),
            key: self.layout.server_key(),
            ca: self.layout.server_ca(),
        }
    }

    fn client_paths(&self) -> MaterialPaths {
        MaterialPaths {
            what: "client material",
            cert: self.layout.client_cert(),
            key: self.layout.client_key(),
            ca: self.layout.client_ca(),
        }
    }

    fn discovery_paths(&self) -> MaterialPaths {
        MaterialPaths {
            what: "discovery client material",
            cert: self.layout.discovery_cert(),
            key: self.layout.discovery_key(),
            ca: self.layout.discovery_ca(),
        }
    }

    fn place(paths: &MaterialPaths, material: &TlsMaterial) -> Result<bool, StoreError> {
        let missing = material.missing_parts();
        if !missing.is_empty() {
            return Err(StoreError::IncompleteMaterial {
                what: paths.what.to_owned(),
                missing: missing.join(", "),
            });
        }
        let mut changed = write_if_changed(&paths.cert, material.certificate.as_bytes(), CERT_MODE)?;
        changed |= write_if_changed(&paths.key, material.private_key.as_bytes(), KEY_MODE)?;
        changed |= write_if_changed(
            &paths.ca,
            material.certificate_authority.as_bytes(),
            CERT_MODE,
        )?;
        debug!("{} placed (changed: {changed})", paths.what);
        Ok(changed)
    }

    fn load(paths: &MaterialPaths) -> Result<TlsMaterial, StoreError> {
        if !Self::placed(paths) {
            return Err(StoreError::NotPlaced(paths.what.to_owned()));
        }
        Ok(TlsMaterial {
            certificate: fs::read_to_string(&paths.cert)?,
            private_key: fs::read_to_string(&paths.key)?,
            certificate_authority: fs::read_to_string(&paths.ca)?,
        })
    }

    fn placed(paths: &MaterialPaths) -> bool {
        paths.cert.is_file() && paths.key.is_file() && paths.ca.is_file()
    }

    /// Persist this node's server material. Returns whether any file changed.
    pub fn place_server(&self, material: &TlsMaterial) -> Result<bool, StoreError> {
        Self::place(&self.server_paths(), material)
    }

    pub fn server_placed(&self) -> bool {
        Self::placed(&self.server_paths())
    }

    pub fn load_server(&self) -> Result<TlsMaterial, StoreError> {
        Self::load(&self.server_paths())
    }

    /// Persist the shared client material. Returns whether any file changed.
    pub fn place_client(&self, material: &TlsMaterial) -> Result<bool, StoreError> {
        Self::place(&self.client_paths(), material)
    }

    pub fn client_placed(&self) -> bool {
        Self::placed(&self.client_paths())
    }

    pub fn load_client(&self) -> Result<TlsMaterial, StoreError> {
        Self::load(&self.client_paths())
    }

    /// Stage the discovery backend's client material. All three parts are
    /// required for a secured link.
    pub fn stage_discovery(&self, ssl: &SslCertificates) -> Result<bool, StoreError> {
        let material = TlsMaterial {
            certificate: ssl.client_cert.clone().unwrap_or_default(),
            private_key: ssl.client_key.clone().unwrap_or_default(),
            certificate_authority: ssl.client_ca.clone().unwrap_or_default(),
        };
        Self::place(&self.discovery_paths(), &material)
    }

    pub fn discovery_staged(&self) -> bool {
        Self::placed(&self.discovery_paths())
    }
}
