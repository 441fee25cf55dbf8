//! Signature vault library crate
//!
//! Stores rolling-checksum signatures for incremental backups in append-only
//! `.tgz` archives, one per backup run, and looks them up newest first across
//! every run of a backup set.

pub mod archive;
pub mod chain;
pub mod config;
pub mod error;
pub mod reader;
pub mod retention;
pub mod signature;
pub mod vault;
pub mod writer;

pub use chain::{backup_key, GenerationToken, VaultDir};
pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use reader::{ChainReader, SignatureEntry};
pub use signature::{RsyncEngine, SignatureEngine};
pub use vault::{open_vault, Mode, SigVault, Vault};
pub use writer::{EntrySource, VaultWriter};
