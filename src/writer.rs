//! Vault writer: one archive per backup run

use crate::archive::{
    create_archive, validate_member_name, ArchiveWriter, SealedVault, DEFAULT_COMPRESSION_LEVEL,
};
use crate::error::{IoContext, Result, VaultError};
use crate::signature::{RsyncEngine, SignatureEngine};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// What to sign for one `add` call
///
/// Exactly one of a relative path or an open stream must be set. A stream
/// carries the member name it is stored under.
#[derive(Default)]
pub struct EntrySource<'a> {
    path: Option<String>,
    stream: Option<(String, Box<dyn Read + 'a>)>,
}

impl<'a> EntrySource<'a> {
    /// Sign the file at `base_path/relative`
    pub fn path(relative: impl Into<String>) -> Self {
        Self {
            path: Some(relative.into()),
            stream: None,
        }
    }

    /// Sign an already open stream, storing it as `name`
    pub fn stream(name: impl Into<String>, reader: impl Read + 'a) -> Self {
        Self {
            path: None,
            stream: Some((name.into(), Box::new(reader))),
        }
    }

    pub fn with_path(mut self, relative: impl Into<String>) -> Self {
        self.path = Some(relative.into());
        self
    }

    pub fn with_stream(mut self, name: impl Into<String>, reader: impl Read + 'a) -> Self {
        self.stream = Some((name.into(), Box::new(reader)));
        self
    }
}

/// Appends signatures into one new vault archive
///
/// Entries become visible to readers only once [`VaultWriter::close`] has
/// sealed the archive. Dropping the writer instead abandons the run and leaves
/// nothing behind.
pub struct VaultWriter {
    base_path: PathBuf,
    archive: ArchiveWriter,
    engine: Box<dyn SignatureEngine>,
}

impl VaultWriter {
    /// Prepare the archive at `path`, resolving sources against `base_path`
    pub fn open(path: &Path, base_path: &Path) -> Result<Self> {
        Self::with_engine(path, base_path, Box::new(RsyncEngine::default()))
    }

    pub fn with_engine(
        path: &Path,
        base_path: &Path,
        engine: Box<dyn SignatureEngine>,
    ) -> Result<Self> {
        Self::with_options(path, base_path, engine, DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn with_options(
        path: &Path,
        base_path: &Path,
        engine: Box<dyn SignatureEngine>,
        compression_level: u32,
    ) -> Result<Self> {
        let archive = create_archive(path, compression_level)?;
        tracing::debug!(
            vault = %path.display(),
            base = %base_path.display(),
            "opened vault writer"
        );
        Ok(Self {
            base_path: base_path.to_path_buf(),
            archive,
            engine,
        })
    }

    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of entries added so far
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Compute and store the signature for one source
    pub fn add(&mut self, source: EntrySource<'_>) -> Result<()> {
        match (source.path, source.stream) {
            (Some(relative), None) => self.add_path(&relative),
            (None, Some((name, mut reader))) => self.add_stream(&name, &mut reader),
            (Some(_), Some(_)) => Err(VaultError::invalid_argument(
                "add takes either a path or a stream, not both",
            )),
            (None, None) => Err(VaultError::invalid_argument(
                "add needs a path or a stream",
            )),
        }
    }

    /// Sign `base_path/relative` and store it under `relative`
    pub fn add_path(&mut self, relative: &str) -> Result<()> {
        self.check_name(relative)?;

        let full_path = self.base_path.join(relative);
        let mut file = match File::open(&full_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VaultError::NotFound(full_path));
            }
            Err(e) => return Err(VaultError::file(&full_path, e)),
        };
        if file.metadata().on_file(&full_path)?.is_dir() {
            return Err(VaultError::invalid_argument(format!(
                "{} is a directory",
                full_path.display()
            )));
        }

        self.store(relative, &full_path, &mut file)
    }

    /// Sign an open stream and store it under `name`
    pub fn add_stream(&mut self, name: &str, reader: &mut dyn Read) -> Result<()> {
        self.check_name(name)?;
        self.store(name, Path::new(name), reader)
    }

    /// Seal the archive and make it part of the chain
    pub fn close(self) -> Result<SealedVault> {
        let sealed = self.archive.finish()?;
        tracing::info!(
            vault = %sealed.path.display(),
            entries = sealed.entries,
            bytes = sealed.payload_bytes,
            "sealed signature vault"
        );
        Ok(sealed)
    }

    fn check_name(&self, name: &str) -> Result<()> {
        validate_member_name(name)?;
        if self.archive.contains(name) {
            return Err(VaultError::DuplicateEntry(name.to_string()));
        }
        Ok(())
    }

    /// Read failures are reported against `source`
    fn store(&mut self, name: &str, source: &Path, reader: &mut dyn Read) -> Result<()> {
        let payload = self.engine.signature(reader).map_err(|e| match e {
            VaultError::Io(io) => VaultError::file(source, io),
            other => other,
        })?;
        self.archive.append(name, &payload)?;
        tracing::debug!(entry = name, bytes = payload.len(), "added signature");
        Ok(())
    }
}

impl fmt::Debug for VaultWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultWriter")
            .field("path", &self.archive.path())
            .field("base_path", &self.base_path)
            .field("entries", &self.archive.len())
            .finish()
    }
}
