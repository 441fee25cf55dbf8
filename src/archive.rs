//! Gzip-compressed tar container I/O
//!
//! One vault archive is a `.tgz` file whose members are signature payloads
//! named after the relative path of the file they describe. Each member's
//! declared size is the exact payload length, so extracting it yields bytes
//! the delta engine can consume directly.
//!
//! Archives are written into an anonymous temporary file next to their final
//! location and only renamed into place by [`ArchiveWriter::finish`], so a
//! half-written archive never shows up in a directory listing.

use crate::error::{IoContext, Result, VaultError};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

/// Default gzip level for new archives
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

const MEMBER_MODE: u32 = 0o644;

/// Summary of an archive once it has been sealed
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SealedVault {
    /// Final location of the archive
    pub path: PathBuf,
    /// Number of signature entries written
    pub entries: usize,
    /// Sum of all payload lengths (uncompressed)
    pub payload_bytes: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub sealed_at: DateTime<Utc>,
}

/// Check that `name` is usable as a member name
///
/// Names are relative, `/` separated and free of `.`/`..` components, so the
/// same name always identifies the same file across the chain.
pub fn validate_member_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::invalid_argument("member name must not be empty"));
    }
    if name.starts_with('/') || name.contains('\\') {
        return Err(VaultError::invalid_argument(format!(
            "member name must be a relative '/' separated path: {name}"
        )));
    }
    if name
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(VaultError::invalid_argument(format!(
            "member name contains an empty, '.' or '..' component: {name}"
        )));
    }
    Ok(())
}

/// Write side of a single archive
pub struct ArchiveWriter {
    path: PathBuf,
    builder: tar::Builder<GzEncoder<NamedTempFile>>,
    names: HashSet<String>,
    payload_bytes: u64,
}

/// Start a new archive that will be sealed at `path`
///
/// The parent directory is created if needed. An existing file at `path` is
/// left untouched until [`ArchiveWriter::finish`] replaces it.
pub fn create_archive(path: &Path, compression_level: u32) -> Result<ArchiveWriter> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).on_file(&dir)?;

    let temp = NamedTempFile::new_in(&dir).on_file(&dir)?;
    let encoder = GzEncoder::new(temp, Compression::new(compression_level.min(9)));

    Ok(ArchiveWriter {
        path: path.to_path_buf(),
        builder: tar::Builder::new(encoder),
        names: HashSet::new(),
        payload_bytes: 0,
    })
}

impl ArchiveWriter {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of members appended so far
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Append one member with an exact declared size
    pub fn append(&mut self, name: &str, payload: &[u8]) -> Result<()> {
        validate_member_name(name)?;
        if self.names.contains(name) {
            return Err(VaultError::DuplicateEntry(name.to_string()));
        }

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(payload.len() as u64);
        header.set_mode(MEMBER_MODE);
        header.set_mtime(Utc::now().timestamp().max(0) as u64);

        self.builder
            .append_data(&mut header, name, payload)
            .on_file(&self.path)?;

        self.names.insert(name.to_string());
        self.payload_bytes += payload.len() as u64;
        Ok(())
    }

    /// Write the tar trailer, flush the gzip stream, fsync and move the
    /// archive to its final path
    pub fn finish(self) -> Result<SealedVault> {
        let ArchiveWriter {
            path,
            builder,
            names,
            payload_bytes,
        } = self;

        let encoder = builder.into_inner().on_file(&path)?;
        let temp = encoder.finish().on_file(&path)?;
        temp.as_file().sync_all().on_file(&path)?;
        temp.persist(&path)
            .map_err(|e| VaultError::file(&path, e.error))?;

        Ok(SealedVault {
            path,
            entries: names.len(),
            payload_bytes,
            sealed_at: Utc::now(),
        })
    }
}

/// Read side of a single sealed archive
///
/// Holds the file handle open for its whole lifetime. Member names are indexed
/// once at open time, which also validates the gzip and tar framing. Every
/// lookup rewinds and scans the one handle, so lookups take the lock for the
/// whole scan.
#[derive(Debug)]
pub struct ArchiveReader {
    path: PathBuf,
    file: Mutex<File>,
    members: Vec<String>,
    index: HashSet<String>,
}

/// Open a sealed archive for reading
pub fn open_archive(path: &Path) -> Result<ArchiveReader> {
    let mut file = File::open(path).on_file(path)?;

    let mut members = Vec::new();
    {
        let mut archive = rewound(&mut file, path)?;
        for entry in archive.entries().on_file(path)? {
            let entry = entry.on_file(path)?;
            if entry.header().entry_type() != tar::EntryType::Regular {
                continue;
            }
            members.push(member_name(&entry, path)?);
        }
    }

    Ok(ArchiveReader {
        path: path.to_path_buf(),
        file: Mutex::new(file),
        index: members.iter().cloned().collect(),
        members,
    })
}

impl ArchiveReader {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Member names in on-disk order
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Read one member's payload, or `None` if this archive does not have it
    pub fn read_member(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if !self.contains(name) {
            return Ok(None);
        }

        let mut file = self.lock();
        let mut archive = rewound(&mut file, &self.path)?;
        for entry in archive.entries().on_file(&self.path)? {
            let mut entry = entry.on_file(&self.path)?;
            if entry.header().entry_type() != tar::EntryType::Regular
                || member_name(&entry, &self.path)? != name
            {
                continue;
            }

            let declared = entry.size();
            let mut payload = Vec::with_capacity(declared as usize);
            entry.read_to_end(&mut payload).on_file(&self.path)?;
            if payload.len() as u64 != declared {
                return Err(VaultError::corrupt(
                    &self.path,
                    format!(
                        "member {name} declares {declared} bytes but {} were readable",
                        payload.len()
                    ),
                ));
            }
            return Ok(Some(payload));
        }

        Err(VaultError::corrupt(
            &self.path,
            format!("member {name} disappeared since the archive was opened"),
        ))
    }

    // A panic mid-scan leaves nothing behind that the next rewind does not reset
    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn rewound<'a>(
    file: &'a mut File,
    path: &Path,
) -> Result<tar::Archive<GzDecoder<BufReader<&'a mut File>>>> {
    file.rewind().on_file(path)?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

fn member_name<R: Read>(entry: &tar::Entry<'_, R>, archive: &Path) -> Result<String> {
    let name = entry.path().on_file(archive)?;
    Ok(name.to_string_lossy().into_owned())
}
