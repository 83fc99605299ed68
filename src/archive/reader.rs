use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read as _};
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

use super::manifest::{ArchiveManifest, MANIFEST_NAME, ManifestCheck};
use crate::error::{GurneyError, Result, ResultExt as _};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
}

/// Read access to an archive blob held in memory.
pub struct ArchiveReader {
    zip: ZipArchive<Cursor<Vec<u8>>>,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("entries", &self.zip.len())
            .finish()
    }
}

impl ArchiveReader {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let zip = ZipArchive::new(Cursor::new(bytes)).context("Invalid zip archive")?;
        Ok(Self { zip })
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    /// Entries in archive order.
    pub fn entries(&mut self) -> Result<Vec<EntryInfo>> {
        (0..self.zip.len())
            .map(|i| {
                let entry = self.zip.by_index_raw(i)?;
                Ok(EntryInfo {
                    name: entry.name().to_owned(),
                    size: entry.size(),
                })
            })
            .collect()
    }

    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self
            .zip
            .by_name(name)
            .with_context(|| format!("Archive entry '{name}'"))?;
        let mut buf = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
        entry.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// The archive's manifest, when it has one.
    pub fn manifest(&mut self) -> Result<Option<ArchiveManifest>> {
        if self.zip.index_for_name(MANIFEST_NAME).is_none() {
            return Ok(None);
        }
        let bytes = self.read(MANIFEST_NAME)?;
        let manifest = serde_json::from_slice(&bytes)
            .map_err(|e| GurneyError::Archive(format!("Unreadable manifest: {e}")))?;
        Ok(Some(manifest))
    }

    /// Checks every entry against the manifest; an archive without a
    /// manifest checks out empty.
    pub fn verify(&mut self) -> Result<ManifestCheck> {
        let Some(manifest) = self.manifest()? else {
            return Ok(ManifestCheck::default());
        };
        let mut check = ManifestCheck::default();
        for entry in &manifest.entries {
            if self.zip.index_for_name(&entry.path).is_none() {
                check.missing.push(entry.path.clone());
                continue;
            }
            let bytes = self.read(&entry.path)?;
            if entry.matches(&bytes) {
                check.verified += 1;
            } else {
                check.mismatched.push(entry.path.clone());
            }
        }
        Ok(check)
    }

    /// Writes every file entry under `dest`, returning the written paths in
    /// archive order.
    ///
    /// # Errors
    ///
    /// [`GurneyError::Archive`] for an entry that would land outside `dest`
    /// (absolute paths, `..` components). Nothing after it is written.
    pub fn extract_to(&mut self, dest: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let mut written = Vec::new();
        for i in 0..self.zip.len() {
            let mut entry = self.zip.by_index(i)?;
            let relative = safe_relative_path(entry.name())?;
            let out = dest.join(&relative);
            if entry.is_dir() {
                fs::create_dir_all(&out)?;
                continue;
            }
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            fs::write(&out, &buf).with_context(|| format!("Failed to write {}", out.display()))?;
            written.push(out);
        }
        tracing::debug!(dest = %dest.display(), files = written.len(), "Archive extracted");
        Ok(written)
    }

    /// Sizes by entry name, for quick lookups.
    pub fn sizes(&mut self) -> Result<HashMap<String, u64>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|e| (e.name, e.size))
            .collect())
    }
}

/// Relative path for an entry name, refusing anything that could escape the
/// extraction directory.
pub fn safe_relative_path(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(GurneyError::Archive(format!(
                    "Refusing to extract unsafe entry '{name}'"
                )));
            }
        }
    }
    if clean.as_os_str().is_empty() || name.contains('\\') {
        return Err(GurneyError::Archive(format!(
            "Refusing to extract unsafe entry '{name}'"
        )));
    }
    Ok(clean)
}
