//! Local AES-256-GCM provider with previous-key fallback for rotation.
//!
//! New data is always sealed with the current key. Old ciphertext stays
//! readable through the previous key until it is rewritten, so a key can be
//! rotated without downtime or a bulk re-encryption pass.

use aes_gcm::Aes256Gcm;
use async_trait::async_trait;
use common::{CrypterError, KeyPath, NonceFrame};

use crate::crypto;
use crate::provider::Crypter;
use crate::random;

/// [`Crypter`] holding its key(s) in process memory.
///
/// Output format: `nonce[12] ‖ ciphertext_and_tag`, with a fresh random
/// nonce per call.
pub struct AesGcmCrypter {
    current: Aes256Gcm,
    previous: Option<Aes256Gcm>,
}

impl AesGcmCrypter {
    /// Create a crypter from a 32-byte `key` and an optional 32-byte
    /// `previous_key` that is only ever used for decryption.
    ///
    /// # Errors
    ///
    /// Returns [`CrypterError::InvalidKeySize`] if either key is not 32 bytes.
    pub fn new(key: &[u8], previous_key: Option<&[u8]>) -> Result<Self, CrypterError> {
        let current = crypto::build_cipher(key, "DEK")?;
        let previous = previous_key
            .map(|k| crypto::build_cipher(k, "previous DEK"))
            .transpose()?;
        Ok(Self { current, previous })
    }

    /// Returns `true` if a previous key is configured.
    pub fn has_previous_key(&self) -> bool {
        self.previous.is_some()
    }
}

impl std::fmt::Debug for AesGcmCrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCrypter")
            .field("previous_key", &self.has_previous_key())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Crypter for AesGcmCrypter {
    async fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CrypterError> {
        let nonce = random::generate_nonce()?;
        let ciphertext = crypto::seal(&self.current, &nonce, plaintext)?;
        Ok(NonceFrame::encode(&nonce, &ciphertext))
    }

    /// Tries the previous key first, then the current key.
    async fn decrypt_bytes(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CrypterError> {
        let frame = NonceFrame::parse(ciphertext)?;

        let path = match &self.previous {
            Some(previous) => {
                let attempt = crypto::open(
                    previous,
                    frame.nonce,
                    frame.ciphertext,
                    KeyPath::CurrentAndPreviousKey,
                );
                if let Ok(plaintext) = attempt {
                    return Ok(plaintext);
                }
                KeyPath::CurrentAndPreviousKey
            }
            None => KeyPath::CurrentKey,
        };

        crypto::open(&self.current, frame.nonce, frame.ciphertext, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KEY_LEN, TAG_LEN};
    use common::{ErrorKind, NONCE_LEN};

    const KEY: &[u8; 32] = b"aa6df350c6164fe8a674864fd1204fe9";
    const NEXT_KEY: &[u8; 32] = b"e4d274d893b4d35e7c54b7947f6b348b";

    /// `"Hello World"` sealed under [`KEY`].
    const HELLO_WORLD: [u8; 39] = [
        21, 233, 48, 137, 56, 251, 145, 11, 56, 123, 233, 232, 122, 17, 207, 165, 44, 60, 21, 17,
        115, 141, 218, 29, 153, 53, 177, 173, 4, 210, 243, 228, 78, 218, 146, 182, 78, 175, 33,
    ];

    fn random_key() -> Vec<u8> {
        random::generate_bytes(KEY_LEN).unwrap()
    }

    #[test]
    fn rejects_short_key() {
        let err = AesGcmCrypter::new(&random::generate_bytes(16).unwrap(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "DEK is invalid: expected 32 bytes, got 16");
    }

    #[test]
    fn rejects_short_previous_key() {
        let err = AesGcmCrypter::new(&random_key(), Some(&b"2819b0fcd8bfa185bd724fb5"[..])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "previous DEK is invalid: expected 32 bytes, got 24"
        );
    }

    #[test]
    fn accepts_both_keys() {
        let crypter = AesGcmCrypter::new(&random_key(), Some(&random_key()[..])).unwrap();
        assert!(crypter.has_previous_key());
    }

    #[tokio::test]
    async fn round_trip() {
        let crypter = AesGcmCrypter::new(&random_key(), None).unwrap();
        for plaintext in [&b""[..], &b"Hello World"[..], &[0u8; 4096][..]] {
            let sealed = crypter.encrypt_bytes(plaintext).await.unwrap();
            assert_eq!(sealed.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
            assert_eq!(crypter.decrypt_bytes(&sealed).await.unwrap(), plaintext);
        }
    }

    #[tokio::test]
    async fn fresh_nonce_per_encryption() {
        let crypter = AesGcmCrypter::new(&random_key(), None).unwrap();
        let a = crypter.encrypt_bytes(b"same").await.unwrap();
        let b = crypter.encrypt_bytes(b"same").await.unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn decrypts_known_vector() {
        let crypter = AesGcmCrypter::new(KEY, None).unwrap();
        let plaintext = crypter.decrypt_bytes(&HELLO_WORLD).await.unwrap();
        assert_eq!(plaintext, b"Hello World");
    }

    #[tokio::test]
    async fn decrypts_known_vector_with_previous_key() {
        let crypter = AesGcmCrypter::new(NEXT_KEY, Some(&KEY[..])).unwrap();
        let plaintext = crypter.decrypt_bytes(&HELLO_WORLD).await.unwrap();
        assert_eq!(plaintext, b"Hello World");
    }

    #[tokio::test]
    async fn rotation_reads_old_and_new_ciphertext() {
        let k1 = random_key();
        let k2 = random_key();
        let old = AesGcmCrypter::new(&k1, None).unwrap();
        let new_only = AesGcmCrypter::new(&k2, None).unwrap();
        let rotated = AesGcmCrypter::new(&k2, Some(&k1[..])).unwrap();

        let from_old = old.encrypt_bytes(b"written before rotation").await.unwrap();
        let from_new = new_only.encrypt_bytes(b"written after rotation").await.unwrap();
        let from_rotated = rotated.encrypt_bytes(b"written by rotated").await.unwrap();

        assert_eq!(
            rotated.decrypt_bytes(&from_old).await.unwrap(),
            b"written before rotation"
        );
        assert_eq!(
            rotated.decrypt_bytes(&from_new).await.unwrap(),
            b"written after rotation"
        );
        // New writes use the current key only.
        assert_eq!(
            new_only.decrypt_bytes(&from_rotated).await.unwrap(),
            b"written by rotated"
        );
        assert!(old.decrypt_bytes(&from_rotated).await.is_err());
    }

    #[tokio::test]
    async fn reports_current_key_only_failure() {
        let crypter = AesGcmCrypter::new(KEY, None).unwrap();
        let err = crypter.decrypt_bytes(b"invalid ciphertext").await.unwrap_err();
        assert_eq!(err.key_path(), Some(KeyPath::CurrentKey));
        assert_eq!(
            err.to_string(),
            "failed to decrypt ciphertext using current DEK"
        );
    }

    #[tokio::test]
    async fn reports_both_keys_failure() {
        let crypter = AesGcmCrypter::new(KEY, Some(&random_key()[..])).unwrap();
        let err = crypter.decrypt_bytes(b"invalid ciphertext").await.unwrap_err();
        assert_eq!(err.key_path(), Some(KeyPath::CurrentAndPreviousKey));
        assert_eq!(
            err.to_string(),
            "failed to decrypt ciphertext using current and previous DEK"
        );
    }

    #[tokio::test]
    async fn rejects_frame_shorter_than_nonce() {
        let crypter = AesGcmCrypter::new(KEY, None).unwrap();
        let err = crypter.decrypt_bytes(&[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, CrypterError::MalformedCiphertext(_)));
    }

    #[tokio::test]
    async fn every_bit_flip_is_detected() {
        let crypter = AesGcmCrypter::new(&random_key(), Some(&random_key()[..])).unwrap();
        let sealed = crypter.encrypt_bytes(b"ssn").await.unwrap();

        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                let err = crypter.decrypt_bytes(&tampered).await.unwrap_err();
                assert_eq!(
                    err.key_path(),
                    Some(KeyPath::CurrentAndPreviousKey),
                    "byte {byte} bit {bit}"
                );
            }
        }
    }
}
