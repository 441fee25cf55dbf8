//! Retention of superseded vault archives
//!
//! An archive is superseded when every entry it holds is shadowed by a newer
//! archive of the same chain. Removing such archives never changes what
//! [`ChainReader::extract`](crate::reader::ChainReader::extract) returns.
//! The newest archive is always kept.

use crate::archive::open_archive;
use crate::chain::list_chain;
use crate::error::{IoContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of a retention pass, newest first in both lists
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Archives still needed by at least one lookup
    pub kept: Vec<PathBuf>,
    /// Archives whose entries are all shadowed
    pub removed: Vec<PathBuf>,
}

impl PruneReport {
    pub fn summary(&self) -> String {
        format!(
            "{} vaults kept, {} superseded",
            self.kept.len(),
            self.removed.len()
        )
    }
}

/// Work out which archives of `key` are superseded, without touching them
pub fn plan_prune(base_dir: &Path, key: &str) -> Result<PruneReport> {
    let mut report = PruneReport::default();
    let mut shadowed: HashSet<String> = HashSet::new();

    for (index, link) in list_chain(base_dir, key)?.into_iter().enumerate() {
        let archive = open_archive(&link.path)?;
        let superseded = index > 0 && archive.members().iter().all(|m| shadowed.contains(m));

        if superseded {
            report.removed.push(link.path);
        } else {
            shadowed.extend(archive.members().iter().cloned());
            report.kept.push(link.path);
        }
    }

    Ok(report)
}

/// Delete every superseded archive of `key`
///
/// Readers opened before the prune keep working on platforms where open files
/// survive unlinking; readers opened after it see the same signatures.
pub fn prune_superseded(base_dir: &Path, key: &str) -> Result<PruneReport> {
    let report = plan_prune(base_dir, key)?;
    for path in &report.removed {
        fs::remove_file(path).on_file(path)?;
        tracing::info!(vault = %path.display(), "removed superseded vault");
    }
    tracing::info!(key, "{}", report.summary());
    Ok(report)
}
