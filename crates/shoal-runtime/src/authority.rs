use crate::RuntimeError;
use shoal_schema::{MaterialRole, TlsMaterial};
use std::path::{Path, PathBuf};
use tracing::debug;

/// External certificate authority. Issuance may block for as long as the
/// authority itself takes; no extra timeout is layered on top.
pub trait CertificateAuthority: Send + Sync {
    fn name(&self) -> &str;

    /// Issue material for `role`. Fails with [`RuntimeError::NotReady`] until
    /// the authority can serve the request.
    fn issue(
        &self,
        role: MaterialRole,
        common_name: &str,
        sans: &[String],
    ) -> Result<TlsMaterial, RuntimeError>;

    fn ca_certificate(&self) -> Result<String, RuntimeError>;
}

/// Authority that hands out material through an inbox directory: the CA
/// tooling drops `ca.crt`, `<role>.crt` and `<role>.key` there.
pub struct DirectoryAuthority {
    inbox: PathBuf,
}

impl DirectoryAuthority {
    pub fn new(inbox: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
        }
    }

    fn read_part(&self, file: &str) -> Result<String, RuntimeError> {
        let path = self.inbox.join(file);
        read_if_present(&path)?
            .ok_or_else(|| RuntimeError::NotReady(format!("{} not issued yet", path.display())))
    }
}

fn read_if_present(path: &Path) -> Result<Option<String>, RuntimeError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl CertificateAuthority for DirectoryAuthority {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn issue(
        &self,
        role: MaterialRole,
        common_name: &str,
        sans: &[String],
    ) -> Result<TlsMaterial, RuntimeError> {
        debug!(
            "collecting {role} material for {common_name} ({} SANs) from {}",
            sans.len(),
            self.inbox.display()
        );
        Ok(TlsMaterial {
            certificate: self.read_part(&format!("{role}.crt"))?,
            private_key: self.read_part(&format!("{role}.key"))?,
            certificate_authority: self.ca_certificate()?,
        })
    }

    fn ca_certificate(&self) -> Result<String, RuntimeError> {
        self.read_part("ca.crt")
    }
}
