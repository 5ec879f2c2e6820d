use crate::layout::NodeLayout;
use crate::{write_if_changed, StoreError};
use flate2::{Compression, GzBuilder};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory name of the client bundle, and the top-level entry of its archive.
pub const BUNDLE_NAME: &str = "swarm_credentials";

/// One file of the client bundle.
#[derive(Debug, Clone)]
pub struct BundleFile {
    pub name: &'static str,
    pub contents: Vec<u8>,
    pub mode: u32,
}

/// A packaged client bundle on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientBundle {
    pub directory: PathBuf,
    pub archive: PathBuf,
    /// blake3 of the archive bytes.
    pub digest: String,
    /// Whether this packaging pass wrote anything.
    pub written: bool,
}

pub struct BundleStore {
    layout: NodeLayout,
}

impl BundleStore {
    pub fn new(layout: NodeLayout) -> Self {
        Self { layout }
    }

    pub fn directory(&self) -> PathBuf {
        self.layout.bundle_root().join(BUNDLE_NAME)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.layout.bundle_root().join(format!("{BUNDLE_NAME}.tar.gz"))
    }

    /// Write the bundle files and archive the bundle directory.
    ///
    /// Files and archive are only rewritten when their bytes differ, so
    /// packaging identical content twice performs no writes the second time.
    pub fn package(&self, files: &[BundleFile]) -> Result<ClientBundle, StoreError> {
        let directory = self.directory();
        fs::create_dir_all(&directory)?;

        let mut written = false;
        for file in files {
            written |= write_if_changed(&directory.join(file.name), &file.contents, file.mode)?;
        }

        let data = compress(&pack_dir(&directory, BUNDLE_NAME)?)?;
        let archive = self.archive_path();
        written |= write_if_changed(&archive, &data, 0o600)?;
        let digest = blake3::hash(&data).to_hex().to_string();
        debug!("client bundle {} (written: {written})", &digest[..12]);

        Ok(ClientBundle {
            directory,
            archive,
            digest,
            written,
        })
    }

    /// The bundle already on disk, if its archive exists.
    pub fn existing(&self) -> Result<Option<ClientBundle>, StoreError> {
        let archive = self.archive_path();
        if !archive.is_file() {
            return Ok(None);
        }
        let data = fs::read(&archive)?;
        Ok(Some(ClientBundle {
            directory: self.directory(),
            archive,
            digest: blake3::hash(&data).to_hex().to_string(),
            written: false,
        }))
    }
}

/// Create a deterministic tar archive of a directory, every entry placed
/// under `prefix/`.
///
/// Entries are sorted by relative path, timestamps are 0 and ownership is
/// 0:0; permissions are preserved. Only regular files and directories are
/// archived.
pub fn pack_dir(source_dir: &Path, prefix: &str) -> Result<Vec<u8>, StoreError> {
    let mut entries = collect_entries(source_dir, source_dir)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut ar = tar::Builder::new(Vec::new());
    ar.follow_symlinks(false);
    append_dir(&mut ar, prefix, source_dir)?;

    for (rel_path, full_path) in &entries {
        let archive_path = format!("{prefix}/{rel_path}");
        let ft = full_path.symlink_metadata()?.file_type();
        if ft.is_file() {
            append_file(&mut ar, &archive_path, full_path)?;
        } else if ft.is_dir() {
            append_dir(&mut ar, &archive_path, full_path)?;
        } else {
            warn!("skipping unsupported bundle entry: {rel_path}");
        }
    }

    Ok(ar.into_inner()?)
}

/// Gzip `data` with a zeroed header timestamp and no file name, so equal
/// input always compresses to equal bytes.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn collect_entries(root: &Path, current: &Path) -> Result<Vec<(String, PathBuf)>, StoreError> {
    let mut result = Vec::new();
    if !current.exists() {
        return Ok(result);
    }
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let full = entry.path();
        let rel = full
            .strip_prefix(root)
            .map_err(|e| StoreError::Io(std::io::Error::other(format!("path strip: {e}"))))?
            .to_string_lossy()
            .to_string();
        // Temp files from an interrupted atomic write are not bundle content.
        if rel.starts_with(".tmp") {
            continue;
        }
        if full.symlink_metadata()?.is_dir() {
            result.push((rel, full.clone()));
            result.extend(collect_entries(root, &full)?);
        } else {
            result.push((rel, full));
        }
    }
    Ok(result)
}

fn make_header(full_path: &Path, entry_type: tar::EntryType) -> Result<tar::Header, StoreError> {
    let meta = full_path.symlink_metadata()?;
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(meta.permissions().mode() & 0o7777);
    Ok(header)
}

fn append_file(
    ar: &mut tar::Builder<Vec<u8>>,
    archive_path: &str,
    full_path: &Path,
) -> Result<(), StoreError> {
    let data = fs::read(full_path)?;
    let mut header = make_header(full_path, tar::EntryType::Regular)?;
    header.set_size(data.len() as u64);
    header.set_cksum();
    ar.append_data(&mut header, archive_path, data.as_slice())?;
    Ok(())
}

fn append_dir(
    ar: &mut tar::Builder<Vec<u8>>,
    archive_path: &str,
    full_path: &Path,
) -> Result<(), StoreError> {
    let mut header = make_header(full_path, tar::EntryType::Directory)?;
    header.set_size(0);
    header.set_cksum();
    let path = if archive_path.ends_with('/') {
        archive_path.to_owned()
    } else {
        format!("{archive_path}/")
    };
    ar.append_data(&mut header, &path, &[] as &[u8])?;
    Ok(())
}
