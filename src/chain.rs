//! Vault chain assembly
//!
//! A chain is every archive named `<key>.sigvault.<token>.tgz` in one
//! directory, ordered newest first. Tokens are chosen so that a descending
//! lexicographic sort of the file names is a descending sort by recency:
//! - zero-padded sequence numbers (`00000001`)
//! - UTC timestamps (`20261019T142501.000123Z`)

use crate::error::{IoContext, Result, VaultError};
use crate::reader::ChainReader;
use crate::signature::RsyncEngine;
use crate::writer::VaultWriter;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobMatcher};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Infix between the key and the generation token
pub const VAULT_MARKER: &str = "sigvault";

/// Extension of every vault archive
pub const ARCHIVE_EXT: &str = "tgz";

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Generation marker embedded in a vault file name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationToken(String);

impl GenerationToken {
    /// Wrap an arbitrary token, rejecting anything that would break the name
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(VaultError::invalid_argument("generation token must not be empty"));
        }
        if token.contains(['/', '\\']) {
            return Err(VaultError::invalid_argument(format!(
                "generation token must not contain path separators: {token}"
            )));
        }
        Ok(Self(token))
    }

    /// Zero-padded sequence number
    pub fn sequence(n: u32) -> Self {
        Self(format!("{n:08}"))
    }

    /// Token for a given instant, microsecond precision
    pub fn at(dt: DateTime<Utc>) -> Self {
        Self(dt.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that a backup-set key can be embedded in a file name
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(VaultError::invalid_argument("backup-set key must not be empty"));
    }
    if key.contains(['/', '\\']) || key == "." || key == ".." {
        return Err(VaultError::invalid_argument(format!(
            "backup-set key must be a plain file name component: {key}"
        )));
    }
    Ok(())
}

/// Derive the backup-set key for a directory: its last path component
pub fn backup_key(dir: &Path) -> Result<String> {
    dir.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .last()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            VaultError::invalid_argument(format!(
                "cannot derive a backup-set key from {}",
                dir.display()
            ))
        })
}

/// `<key>.sigvault.<token>.tgz`
pub fn vault_file_name(key: &str, token: &GenerationToken) -> String {
    format!("{key}.{VAULT_MARKER}.{token}.{ARCHIVE_EXT}")
}

/// Extract the generation token if `file_name` is a vault of `key`
pub fn parse_vault_file_name(key: &str, file_name: &str) -> Option<GenerationToken> {
    let prefix = format!("{key}.{VAULT_MARKER}.");
    let suffix = format!(".{ARCHIVE_EXT}");
    let token = file_name.strip_prefix(&prefix)?.strip_suffix(&suffix)?;
    GenerationToken::new(token).ok()
}

fn vault_matcher(key: &str) -> Result<GlobMatcher> {
    let pattern = format!(
        "{}.{VAULT_MARKER}.*.{ARCHIVE_EXT}",
        globset::escape(key)
    );
    let glob = Glob::new(&pattern)
        .map_err(|e| VaultError::invalid_argument(format!("bad vault pattern {pattern}: {e}")))?;
    Ok(glob.compile_matcher())
}

/// One archive of a chain as found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub path: PathBuf,
    pub generation: GenerationToken,
}

/// List the vaults of `key` in `dir`, newest first
///
/// A missing directory is an empty chain.
pub fn list_chain(dir: &Path, key: &str) -> Result<Vec<ChainLink>> {
    validate_key(key)?;
    let matcher = vault_matcher(key)?;

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(VaultError::file(dir, e)),
    };

    let mut links = Vec::new();
    for entry in entries {
        let entry = entry.on_file(dir)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !matcher.is_match(name) {
            continue;
        }
        let Some(generation) = parse_vault_file_name(key, name) else {
            tracing::warn!(file = name, "skipping vault with unusable generation token");
            continue;
        };
        if !entry.file_type().on_file(&entry.path())?.is_file() {
            continue;
        }
        links.push(ChainLink {
            path: entry.path(),
            generation,
        });
    }

    // Descending by full file name, suffix included
    links.sort_by(|a, b| b.path.file_name().cmp(&a.path.file_name()));
    Ok(links)
}

/// A directory holding the vault chains of any number of keys
#[derive(Debug, Clone)]
pub struct VaultDir {
    root: PathBuf,
    engine: RsyncEngine,
    compression_level: u32,
}

impl VaultDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            engine: RsyncEngine::default(),
            compression_level: crate::archive::DEFAULT_COMPRESSION_LEVEL,
        }
    }

    pub fn with_engine(mut self, engine: RsyncEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self, key: &str, token: &GenerationToken) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(vault_file_name(key, token)))
    }

    /// Start the vault for a new run of `key`, named after the current time
    pub fn writer(&self, key: &str, base_path: &Path) -> Result<VaultWriter> {
        self.writer_for(key, &GenerationToken::now(), base_path)
    }

    pub fn writer_for(
        &self,
        key: &str,
        token: &GenerationToken,
        base_path: &Path,
    ) -> Result<VaultWriter> {
        let path = self.archive_path(key, token)?;
        VaultWriter::with_options(&path, base_path, Box::new(self.engine), self.compression_level)
    }

    pub fn reader(&self, key: &str) -> Result<ChainReader> {
        ChainReader::open(&self.root, key)
    }

    pub fn list(&self, key: &str) -> Result<Vec<ChainLink>> {
        list_chain(&self.root, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_vault_file_name_round_trip() {
        let token = GenerationToken::sequence(3);
        let name = vault_file_name("proj", &token);
        assert_eq!(name, "proj.sigvault.00000003.tgz");
        assert_eq!(parse_vault_file_name("proj", &name), Some(token));
        assert_eq!(parse_vault_file_name("other", &name), None);
        assert_eq!(parse_vault_file_name("proj", "proj.state.00000003.json"), None);
    }

    #[test]
    fn test_timestamp_tokens_sort_by_time() {
        let earlier = GenerationToken::at(Utc.with_ymd_and_hms(2013, 7, 3, 22, 20, 58).unwrap());
        let later = GenerationToken::at(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());

        assert_eq!(earlier.as_str(), "20130703T222058.000000Z");
        assert!(later > earlier);
        assert!(vault_file_name("proj", &later) > vault_file_name("proj", &earlier));
    }

    #[test]
    fn test_token_validation() {
        assert!(GenerationToken::new("").is_err());
        assert!(GenerationToken::new("a/b").is_err());
        assert!(GenerationToken::new("0001").is_ok());
    }

    #[test]
    fn test_backup_key() {
        assert_eq!(backup_key(Path::new("/work/writing")).unwrap(), "writing");
        assert_eq!(backup_key(Path::new("/work/writing/")).unwrap(), "writing");
        assert!(backup_key(Path::new("/")).is_err());
    }

    #[test]
    fn test_list_chain_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        for name in [
            "proj.sigvault.0002.tgz",
            "proj.sigvault.0001.tgz",
            "proj.sigvault.0003.tgz",
            "other.sigvault.0004.tgz",
            "proj.state.0005.json",
            "proj.full.0001.tgz",
        ] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let links = list_chain(temp_dir.path(), "proj").unwrap();
        let tokens: Vec<&str> = links.iter().map(|l| l.generation.as_str()).collect();
        assert_eq!(tokens, vec!["0003", "0002", "0001"]);
        assert_eq!(links[0].path, temp_dir.path().join("proj.sigvault.0003.tgz"));
    }

    #[test]
    fn test_list_chain_sorts_by_file_name_when_tokens_share_a_prefix() {
        let temp_dir = TempDir::new().unwrap();
        for name in [
            "proj.sigvault.20130703T222058.000001.tgz",
            "proj.sigvault.20130703T222058.tgz",
            "proj.sigvault.20130703T222057.tgz",
        ] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        // ".tgz" sorts after ".000001.tgz", so the shorter token comes first
        let links = list_chain(temp_dir.path(), "proj").unwrap();
        let names: Vec<String> = links
            .iter()
            .map(|l| l.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "proj.sigvault.20130703T222058.tgz",
                "proj.sigvault.20130703T222058.000001.tgz",
                "proj.sigvault.20130703T222057.tgz",
            ]
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_list_chain_sorts_colon_timestamps_by_file_name() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("proj.sigvault.2013-07-03T22:20:58.000001.tgz"), b"")
            .unwrap();
        fs::write(temp_dir.path().join("proj.sigvault.2013-07-03T22:20:58.tgz"), b"").unwrap();

        let links = list_chain(temp_dir.path(), "proj").unwrap();
        let tokens: Vec<&str> = links.iter().map(|l| l.generation.as_str()).collect();
        assert_eq!(tokens, vec!["2013-07-03T22:20:58", "2013-07-03T22:20:58.000001"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_list_chain_escapes_key() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("p*.sigvault.0001.tgz"), b"").unwrap();
        fs::write(temp_dir.path().join("proj.sigvault.0001.tgz"), b"").unwrap();

        let links = list_chain(temp_dir.path(), "p*").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].path, temp_dir.path().join("p*.sigvault.0001.tgz"));
    }

    #[test]
    fn test_list_chain_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let links = list_chain(&temp_dir.path().join("nope"), "proj").unwrap();
        assert!(links.is_empty());
    }

    #[test]
    fn test_list_chain_ignores_directories() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("proj.sigvault.0009.tgz")).unwrap();
        fs::write(temp_dir.path().join("proj.sigvault.0001.tgz"), b"").unwrap();

        let links = list_chain(temp_dir.path(), "proj").unwrap();
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_invalid_key() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            list_chain(temp_dir.path(), "a/b"),
            Err(VaultError::InvalidArgument(_))
        ));
        assert!(list_chain(temp_dir.path(), "").is_err());
    }
}
