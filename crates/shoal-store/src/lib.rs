//! Node-local storage for shoal.
//!
//! This crate owns everything the controller writes to disk: the
//! `NodeLayout` directory structure, the checksummed `NodeState` document that
//! carries facts between event deliveries, placement of server, client and
//! discovery TLS material (`TlsStore`), and the deterministic client bundle
//! archive (`BundleStore`). All writes are atomic (temp file + rename +
//! directory fsync) and skipped when the on-disk bytes already match.

pub mod bundle;
pub mod layout;
pub mod state;
pub mod tls;

pub use bundle::{pack_dir, BundleFile, BundleStore, ClientBundle, BUNDLE_NAME};
pub use layout::NodeLayout;
pub use state::{NodeState, StateStore, STATE_FORMAT_VERSION};
pub use tls::TlsStore;

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = fs::File::open(dir)?;
    f.sync_all()
}

/// Atomically replace `path` with `data`, creating parent directories.
pub(crate) fn write_atomic(path: &Path, data: &[u8], mode: u32) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Io(std::io::Error::other("path has no parent directory")))?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(mode))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

/// Write `data` to `path` unless the file already holds exactly these bytes.
/// Returns whether a write happened.
pub fn write_if_changed(path: &Path, data: &[u8], mode: u32) -> Result<bool, StoreError> {
    if let Ok(existing) = fs::read(path) {
        if existing == data {
            return Ok(false);
        }
    }
    write_atomic(path, data, mode)?;
    Ok(true)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for '{path}': expected {expected}, got {actual}")]
    IntegrityFailure {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("state format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("incomplete {what}: missing {missing}")]
    IncompleteMaterial { what: String, missing: String },
    #[error("{0} not placed yet")]
    NotPlaced(String),
}
