//! AES-256-GCM seal and open primitives.
//!
//! **Nonce discipline:** GCM nonce reuse under one key is catastrophic. It
//! breaks both confidentiality and authentication. Every caller of [`seal`]
//! must supply a nonce that has never been used with the same key, either a
//! fresh CSPRNG draw or a strictly increasing counter.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use common::{CrypterError, KeyPath, NONCE_LEN};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Build an AES-256-GCM cipher from raw key bytes.
///
/// `name` identifies the key in the error, e.g. `"DEK"` or `"previous DEK"`.
///
/// # Errors
///
/// Returns [`CrypterError::InvalidKeySize`] if `key` is not [`KEY_LEN`] bytes.
/// Keys are never truncated or padded.
pub fn build_cipher(key: &[u8], name: &'static str) -> Result<Aes256Gcm, CrypterError> {
    let invalid = || CrypterError::InvalidKeySize {
        name,
        expected: KEY_LEN,
        actual: key.len(),
    };
    if key.len() != KEY_LEN {
        return Err(invalid());
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| invalid())
}

/// Encrypt `plaintext`, returning ciphertext with the tag appended.
///
/// # Errors
///
/// Returns [`CrypterError::Encryption`] on an internal AEAD error (unreachable
/// for inputs below the GCM message size limit).
pub fn seal(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CrypterError> {
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CrypterError::Encryption("aead seal failed".into()))
}

/// Authenticate and decrypt `ciphertext`.
///
/// # Errors
///
/// Returns [`CrypterError::DecryptionFailure`] tagged with `path` if
/// authentication fails (wrong key or tampered data).
pub fn open(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    path: KeyPath,
) -> Result<Vec<u8>, CrypterError> {
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CrypterError::DecryptionFailure(path))
}
