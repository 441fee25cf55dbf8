//! Configuration file support
//!
//! Location: `<config dir>/sigvault/config.toml` as reported by `directories`
//! (`~/.config/sigvault/config.toml` on Linux). Every field is optional.
//!
//! ```toml
//! vault_dir = "/var/cache/backups/vaults"
//!
//! [signature]
//! block_size = 2048
//! strong_hash_size = 8
//!
//! [archive]
//! compression_level = 6
//! ```

use crate::archive::DEFAULT_COMPRESSION_LEVEL;
use crate::chain::VaultDir;
use crate::signature::{RsyncEngine, DEFAULT_BLOCK_SIZE, DEFAULT_STRONG_HASH_SIZE};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SignatureSettings {
    pub block_size: u32,
    pub strong_hash_size: u32,
}

impl Default for SignatureSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            strong_hash_size: DEFAULT_STRONG_HASH_SIZE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ArchiveSettings {
    /// gzip level, 0-9
    pub compression_level: u32,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct VaultConfig {
    /// Where vault archives live; defaults to the user cache directory
    pub vault_dir: Option<PathBuf>,
    pub signature: SignatureSettings,
    pub archive: ArchiveSettings,
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "sigvault").context("Could not determine home directory")
}

impl VaultConfig {
    /// Path of the user config file
    pub fn config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
    }

    /// Load the user config, falling back to defaults if it is missing or broken
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("using default vault config: {e:#}");
                return Self::default();
            }
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("using default vault config: {e:#}");
                Self::default()
            }
        }
    }

    /// Like [`VaultConfig::load`], writing the defaults out if no file exists yet
    pub fn load_or_create() -> Self {
        let config = Self::load();
        if let Ok(path) = Self::config_path() {
            if !path.exists() {
                if let Err(e) = config.save_to(&path) {
                    tracing::warn!("could not write default vault config: {e:#}");
                }
            }
        }
        config
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: VaultConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Configured vault directory, or `<cache dir>/vaults`
    pub fn vault_root(&self) -> Result<PathBuf> {
        match &self.vault_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.cache_dir().join("vaults")),
        }
    }

    pub fn engine(&self) -> Result<RsyncEngine> {
        RsyncEngine::new(self.signature.block_size, self.signature.strong_hash_size)
            .context("Invalid [signature] settings")
    }

    /// A [`VaultDir`] wired with every configured setting
    pub fn vault_dir(&self) -> Result<VaultDir> {
        Ok(VaultDir::new(self.vault_root()?)
            .with_engine(self.engine()?)
            .with_compression_level(self.archive.compression_level.min(9)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.signature.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.archive.compression_level, DEFAULT_COMPRESSION_LEVEL);
        assert!(config.vault_dir.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "vault_dir = \"/srv/vaults\"\n\n[signature]\nblock_size = 512\n").unwrap();

        let config = VaultConfig::load_from(&path).unwrap();
        assert_eq!(config.vault_dir, Some(PathBuf::from("/srv/vaults")));
        assert_eq!(config.signature.block_size, 512);
        assert_eq!(config.signature.strong_hash_size, DEFAULT_STRONG_HASH_SIZE);
        assert_eq!(config.archive, ArchiveSettings::default());
        assert_eq!(config.vault_root().unwrap(), PathBuf::from("/srv/vaults"));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(CONFIG_FILE);

        let mut config = VaultConfig::default();
        config.vault_dir = Some(temp_dir.path().join("vaults"));
        config.archive.compression_level = 9;
        config.save_to(&path).unwrap();

        assert_eq!(VaultConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "signature = 3").unwrap();

        assert!(VaultConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_engine_validation() {
        let mut config = VaultConfig::default();
        config.signature.strong_hash_size = 64;
        assert!(config.engine().is_err());
    }

    #[test]
    fn test_vault_dir_uses_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config = VaultConfig {
            vault_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let dir = config.vault_dir().unwrap();
        assert_eq!(dir.root(), temp_dir.path());
    }
}
