//! DEK (Data Encryption Key) handling for the envelope provider.
//!
//! # Security invariants
//!
//! - The plaintext DEK is **never** written to disk, logged, or included in traces.
//! - Wrapped DEKs appear in logs only as a short [`fingerprint`].
//! - Key buffers are overwritten with zeroes when dropped.

pub mod cache;

pub use cache::DekCache;

use common::CrypterError;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_LEN;

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which plaintext key material lives in RAM.
#[derive(Clone)]
pub struct DekBytes(Box<[u8; KEY_LEN]>);

impl DekBytes {
    /// Copy `key` into a new buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CrypterError::InvalidKeySize`] if `key` is not [`KEY_LEN`] bytes.
    pub fn from_slice(key: &[u8], name: &'static str) -> Result<Self, CrypterError> {
        if key.len() != KEY_LEN {
            return Err(CrypterError::InvalidKeySize {
                name,
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(key);
        Ok(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Zeroize for DekBytes {
    fn zeroize(&mut self) {
        self.0.as_mut_slice().zeroize();
    }
}

impl Drop for DekBytes {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for DekBytes {}

impl std::fmt::Debug for DekBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("DekBytes([REDACTED])")
    }
}

/// Short, log-safe identifier for a wrapped DEK: the first 8 bytes of its
/// SHA-256 digest in hex.
pub fn fingerprint(wrapped_dek: &[u8]) -> String {
    Sha256::digest(wrapped_dek)
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}
