use crate::StoreError;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Directory layout of a node's state directory.
///
/// Everything under the root is exclusively owned by this node's controller.
/// Subdirectories are created lazily on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct NodeLayout {
    root: PathBuf,
}

impl NodeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// Server material used by the local engine.
    #[inline]
    pub fn tls_dir(&self) -> PathBuf {
        self.root.join("tls")
    }

    #[inline]
    pub fn server_cert(&self) -> PathBuf {
        self.tls_dir().join("server.crt")
    }

    #[inline]
    pub fn server_key(&self) -> PathBuf {
        self.tls_dir().join("server.key")
    }

    #[inline]
    pub fn server_ca(&self) -> PathBuf {
        self.tls_dir().join("ca.crt")
    }

    /// Shared client material, minted by the leader or copied from its broadcast.
    #[inline]
    pub fn client_dir(&self) -> PathBuf {
        self.tls_dir().join("client")
    }

    #[inline]
    pub fn client_cert(&self) -> PathBuf {
        self.client_dir().join("client.crt")
    }

    #[inline]
    pub fn client_key(&self) -> PathBuf {
        self.client_dir().join("client.key")
    }

    #[inline]
    pub fn client_ca(&self) -> PathBuf {
        self.client_dir().join("ca.crt")
    }

    /// Client material for the discovery backend itself (secured links only).
    #[inline]
    pub fn discovery_tls_dir(&self) -> PathBuf {
        self.root.join("discovery")
    }

    #[inline]
    pub fn discovery_cert(&self) -> PathBuf {
        self.discovery_tls_dir().join("client.crt")
    }

    #[inline]
    pub fn discovery_key(&self) -> PathBuf {
        self.discovery_tls_dir().join("client.key")
    }

    #[inline]
    pub fn discovery_ca(&self) -> PathBuf {
        self.discovery_tls_dir().join("ca.crt")
    }

    #[inline]
    pub fn compose_file(&self) -> PathBuf {
        self.root.join("compose").join("docker-compose.yml")
    }

    #[inline]
    pub fn bundle_root(&self) -> PathBuf {
        self.root.join("bundle")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        for dir in [self.tls_dir(), self.client_dir(), self.discovery_tls_dir()] {
            fs::create_dir_all(&dir)?;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
        }
        if let Some(compose_dir) = self.compose_file().parent() {
            fs::create_dir_all(compose_dir)?;
        }
        fs::create_dir_all(self.bundle_root())?;
        Ok(())
    }
}
