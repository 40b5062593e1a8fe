//! Cryptographically secure random bytes from the operating system.

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use common::{CrypterError, NONCE_LEN};

/// Generate `n` random bytes.
///
/// # Errors
///
/// Returns [`CrypterError::Io`] if the OS entropy source cannot fill the
/// whole buffer.
pub fn generate_bytes(n: usize) -> Result<Vec<u8>, CrypterError> {
    let mut buf = vec![0u8; n];
    fill(&mut buf)?;
    Ok(buf)
}

/// Generate a fresh random GCM nonce.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], CrypterError> {
    let mut nonce = [0u8; NONCE_LEN];
    fill(&mut nonce)?;
    Ok(nonce)
}

fn fill(buf: &mut [u8]) -> Result<(), CrypterError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CrypterError::Io {
            context: "failed to read from the OS entropy source",
            source: std::io::Error::other(e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length() {
        assert_eq!(generate_bytes(0).unwrap().len(), 0);
        assert_eq!(generate_bytes(32).unwrap().len(), 32);
        assert_eq!(generate_bytes(1000).unwrap().len(), 1000);
    }

    #[test]
    fn successive_draws_differ() {
        assert_ne!(generate_bytes(32).unwrap(), generate_bytes(32).unwrap());
        assert_ne!(generate_nonce().unwrap(), generate_nonce().unwrap());
    }
}
