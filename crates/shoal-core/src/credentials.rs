//! Credential Manager: server/client TLS material and the client bundle.

use crate::CoreError;
use shoal_runtime::CertificateAuthority;
use shoal_schema::{MaterialRole, NodeConfig, Role, TlsMaterial};
use shoal_store::{BundleFile, BundleStore, ClientBundle, NodeLayout, TlsStore};
use tracing::info;

/// Common name the shared client certificate is issued for.
pub const CLIENT_COMMON_NAME: &str = "swarm-client";

pub struct CredentialManager<'a> {
    config: &'a NodeConfig,
    authority: &'a dyn CertificateAuthority,
    tls: TlsStore,
    bundles: BundleStore,
}

fn ensure_complete(what: &str, material: &TlsMaterial) -> Result<(), CoreError> {
    let missing = material.missing_parts();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CoreError::IncompleteMaterial {
            what: what.to_owned(),
            missing: missing.join(", "),
        })
    }
}

impl<'a> CredentialManager<'a> {
    pub fn new(
        config: &'a NodeConfig,
        layout: &NodeLayout,
        authority: &'a dyn CertificateAuthority,
    ) -> Self {
        Self {
            config,
            authority,
            tls: TlsStore::new(layout.clone()),
            bundles: BundleStore::new(layout.clone()),
        }
    }

    /// Have the authority issue this node's server material and place it
    /// where the engine configuration points.
    pub fn issue_server_material(&self) -> Result<TlsMaterial, CoreError> {
        let sans = vec![
            self.config.node.private_address.clone(),
            self.config.node.public_address.clone(),
        ];
        let material = self
            .authority
            .issue(MaterialRole::Server, &self.config.node.name, &sans)?;
        ensure_complete("server material", &material)?;
        self.tls.place_server(&material)?;
        info!("server material placed for {}", self.config.node.name);
        Ok(material)
    }

    /// Mint the cluster's shared client material. Leader only.
    pub fn mint_client_material(&self, role: Role) -> Result<TlsMaterial, CoreError> {
        if !role.is_leader() {
            return Err(CoreError::NotLeader);
        }
        let material = self
            .authority
            .issue(MaterialRole::Client, CLIENT_COMMON_NAME, &[])?;
        ensure_complete("client material", &material)?;
        self.tls.place_client(&material)?;
        info!("client material minted");
        Ok(material)
    }

    /// Keep a read-only copy of client material minted elsewhere.
    pub fn place_client_material(&self, material: &TlsMaterial) -> Result<bool, CoreError> {
        ensure_complete("client material", material)?;
        Ok(self.tls.place_client(material)?)
    }

    pub fn load_client_material(&self) -> Result<TlsMaterial, CoreError> {
        Ok(self.tls.load_client()?)
    }

    /// Write the client bundle and its archive. Content is derived only from
    /// the material and the manager endpoint, so a repeat call with the same
    /// inputs writes nothing.
    pub fn package_client_bundle(
        &self,
        material: &TlsMaterial,
        public_address: &str,
    ) -> Result<ClientBundle, CoreError> {
        ensure_complete("client material", material)?;
        let files = vec![
            BundleFile {
                name: "cert.pem",
                contents: material.certificate.clone().into_bytes(),
                mode: 0o644,
            },
            BundleFile {
                name: "key.pem",
                contents: material.private_key.clone().into_bytes(),
                mode: 0o600,
            },
            BundleFile {
                name: "ca.pem",
                contents: material.certificate_authority.clone().into_bytes(),
                mode: 0o644,
            },
            BundleFile {
                name: "enable.sh",
                contents: enable_script(public_address, self.config.swarm.manager_port)
                    .into_bytes(),
                mode: 0o755,
            },
        ];
        let bundle = self.bundles.package(&files)?;
        if bundle.written {
            info!("client bundle written to {}", bundle.archive.display());
        }
        Ok(bundle)
    }
}

fn enable_script(public_address: &str, manager_port: u16) -> String {
    let host = if public_address.contains(':') {
        format!("[{public_address}]")
    } else {
        public_address.to_owned()
    };
    format!(
        "#!/bin/sh\n\
         # Source from inside the unpacked bundle directory.\n\
         export DOCKER_HOST=tcp://{host}:{manager_port}\n\
         export DOCKER_CERT_PATH=\"$(pwd)\"\n\
         export DOCKER_TLS_VERIFY=1\n"
    )
}
