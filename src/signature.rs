//! Rolling-checksum signature computation
//!
//! The vault never interprets signature payloads. It only needs something that
//! turns a readable stream into an opaque block of bytes, which is what
//! [`SignatureEngine`] describes. [`RsyncEngine`] is the default and produces
//! librsync-compatible signatures through `fast_rsync`.

use crate::error::{Result, VaultError};
use fast_rsync::{Signature, SignatureOptions};
use std::io::Read;

/// Default block size used by rdiff
pub const DEFAULT_BLOCK_SIZE: u32 = 2048;

/// Default strong hash length in bytes (MD4 truncated)
pub const DEFAULT_STRONG_HASH_SIZE: u32 = 8;

const MAX_STRONG_HASH_SIZE: u32 = 16;

/// Computes the signature payload stored for each vault entry
pub trait SignatureEngine {
    /// Read `source` to the end and return its signature bytes
    fn signature(&self, source: &mut dyn Read) -> Result<Vec<u8>>;
}

/// `fast_rsync` backed signature engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsyncEngine {
    block_size: u32,
    strong_hash_size: u32,
}

impl RsyncEngine {
    /// Create an engine with explicit block and strong hash sizes
    ///
    /// `fast_rsync` panics on out-of-range options, so they are checked here.
    pub fn new(block_size: u32, strong_hash_size: u32) -> Result<Self> {
        if block_size == 0 {
            return Err(VaultError::invalid_argument("block size must be greater than zero"));
        }
        if strong_hash_size == 0 || strong_hash_size > MAX_STRONG_HASH_SIZE {
            return Err(VaultError::invalid_argument(format!(
                "strong hash size must be between 1 and {}, got {}",
                MAX_STRONG_HASH_SIZE, strong_hash_size
            )));
        }

        Ok(Self {
            block_size,
            strong_hash_size,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn strong_hash_size(&self) -> u32 {
        self.strong_hash_size
    }

    /// Compute a signature for an in-memory buffer
    pub fn calculate(&self, data: &[u8]) -> Signature {
        let options = SignatureOptions {
            block_size: self.block_size,
            crypto_hash_size: self.strong_hash_size,
        };
        Signature::calculate(data, options)
    }

    /// Parse a stored payload back into a signature usable by `fast_rsync::diff`
    pub fn decode(payload: &[u8]) -> Result<Signature> {
        Signature::deserialize(payload.to_vec())
            .map_err(|e| VaultError::signature(format!("invalid signature payload: {e:?}")))
    }
}

impl Default for RsyncEngine {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            strong_hash_size: DEFAULT_STRONG_HASH_SIZE,
        }
    }
}

impl SignatureEngine for RsyncEngine {
    fn signature(&self, source: &mut dyn Read) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        Ok(self.calculate(&data).into_serialized())
    }
}
