//! Single entry point choosing between the writer and the chain reader

use crate::error::{Result, VaultError};
use crate::reader::ChainReader;
use crate::writer::VaultWriter;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How a vault is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Look up signatures across the chain of a key
    Read,
    /// Create one new archive
    Write,
}

impl FromStr for Mode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(Mode::Read),
            "w" => Ok(Mode::Write),
            other => Err(VaultError::invalid_argument(format!(
                "mode must be 'r' or 'w', got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => f.write_str("r"),
            Mode::Write => f.write_str("w"),
        }
    }
}

/// An opened vault, in whichever role was asked for
#[derive(Debug)]
pub enum Vault {
    Reader(ChainReader),
    Writer(VaultWriter),
}

impl Vault {
    pub fn mode(&self) -> Mode {
        match self {
            Vault::Reader(_) => Mode::Read,
            Vault::Writer(_) => Mode::Write,
        }
    }

    pub fn into_reader(self) -> Option<ChainReader> {
        match self {
            Vault::Reader(reader) => Some(reader),
            Vault::Writer(_) => None,
        }
    }

    pub fn into_writer(self) -> Option<VaultWriter> {
        match self {
            Vault::Writer(writer) => Some(writer),
            Vault::Reader(_) => None,
        }
    }
}

/// Namespace for the facade constructor
pub struct SigVault;

impl SigVault {
    /// Open a vault for reading or writing
    ///
    /// - `"w"`: `path` is the archive to create and `base_path` (required) is
    ///   the directory relative sources are resolved against.
    /// - `"r"`: with `base_path`, it is the vault directory and `path` the
    ///   backup-set key. Without it, `path` is `<vault dir>/<key>`.
    pub fn open(path: impl AsRef<Path>, mode: &str, base_path: Option<&Path>) -> Result<Vault> {
        let path = path.as_ref();
        match mode.parse::<Mode>()? {
            Mode::Write => {
                let base_path = base_path.ok_or_else(|| {
                    VaultError::invalid_argument("write mode needs a base path")
                })?;
                VaultWriter::open(path, base_path).map(Vault::Writer)
            }
            Mode::Read => {
                let (dir, key) = match base_path {
                    Some(dir) => (dir, path_to_key(path)?),
                    None => split_key(path)?,
                };
                ChainReader::open(dir, &key).map(Vault::Reader)
            }
        }
    }
}

/// Free-function form of [`SigVault::open`]
pub fn open_vault(path: impl AsRef<Path>, mode: &str, base_path: Option<&Path>) -> Result<Vault> {
    SigVault::open(path, mode, base_path)
}

fn path_to_key(path: &Path) -> Result<String> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        VaultError::invalid_argument(format!("key is not valid UTF-8: {}", path.display()))
    })
}

fn split_key(path: &Path) -> Result<(&Path, String)> {
    let key = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            VaultError::invalid_argument(format!(
                "cannot take a backup-set key from {}",
                path.display()
            ))
        })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, key.to_string()))
}
