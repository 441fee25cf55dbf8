//! Chain reader: newest-first signature lookup across every vault of a key

use crate::archive::{open_archive, ArchiveReader};
use crate::chain::{list_chain, GenerationToken};
use crate::error::Result;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// A signature found in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    /// Relative path the signature belongs to
    pub name: String,
    /// Generation of the archive that supplied it
    pub generation: GenerationToken,
    /// Archive that supplied it
    pub archive: PathBuf,
    payload: Vec<u8>,
}

impl SignatureEntry {
    /// Declared (and actual) payload length
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Readable stream over the payload, positioned at its start
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.payload)
    }
}

impl AsRef<[u8]> for SignatureEntry {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

/// Metadata about one archive held by a reader
#[derive(Debug, Clone, Copy)]
pub struct ArchiveInfo<'a> {
    pub path: &'a Path,
    pub generation: &'a GenerationToken,
    pub members: &'a [String],
}

#[derive(Debug)]
struct OpenVault {
    generation: GenerationToken,
    archive: ArchiveReader,
}

impl OpenVault {
    fn lookup(&self, name: &str) -> Result<Option<SignatureEntry>> {
        let payload = self.archive.read_member(name)?;
        Ok(payload.map(|payload| SignatureEntry {
            name: name.to_string(),
            generation: self.generation.clone(),
            archive: self.archive.path().to_path_buf(),
            payload,
        }))
    }
}

/// Read-only view over the vault chain of one key
///
/// The chain is listed and every archive opened once, in [`ChainReader::open`].
/// Archives sealed afterwards are not seen by this reader. All handles are
/// released when the reader is dropped.
#[derive(Debug)]
pub struct ChainReader {
    key: String,
    vaults: Vec<OpenVault>,
}

impl ChainReader {
    /// Open every vault of `key` found in `base_dir`, newest first
    ///
    /// No matching vault is not an error: the reader is simply empty.
    pub fn open(base_dir: &Path, key: &str) -> Result<Self> {
        let links = list_chain(base_dir, key)?;

        let mut vaults = Vec::with_capacity(links.len());
        for link in links {
            let archive = open_archive(&link.path)?;
            vaults.push(OpenVault {
                generation: link.generation,
                archive,
            });
        }

        tracing::info!(
            key,
            dir = %base_dir.display(),
            archives = vaults.len(),
            "opened vault chain"
        );

        Ok(Self {
            key: key.to_string(),
            vaults,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of archives in the chain
    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }

    /// Archives in scan order (newest first)
    pub fn archives(&self) -> impl Iterator<Item = ArchiveInfo<'_>> {
        self.vaults.iter().map(|v| ArchiveInfo {
            path: v.archive.path(),
            generation: &v.generation,
            members: v.archive.members(),
        })
    }

    /// Signature of `path` from the newest archive that has one
    ///
    /// `Ok(None)` once every archive has been tried without a match. Errors
    /// are only returned for unreadable or corrupt archives.
    pub fn extract(&self, path: &str) -> Result<Option<SignatureEntry>> {
        for vault in &self.vaults {
            if let Some(entry) = vault.lookup(path)? {
                tracing::debug!(entry = path, generation = %entry.generation, "signature found");
                return Ok(Some(entry));
            }
        }
        tracing::debug!(entry = path, archives = self.vaults.len(), "no signature in chain");
        Ok(None)
    }

    /// Whether any archive of the chain has a signature for `path`
    pub fn contains(&self, path: &str) -> bool {
        self.vaults.iter().any(|v| v.archive.contains(path))
    }

    /// Release every archive handle now
    pub fn close(self) {
        drop(self);
    }
}
