//! Common error types shared across crates.

use std::fmt;

use thiserror::Error;

/// The key, or decryption tier, that was attempted when a decryption failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPath {
    /// Local provider, no previous key configured.
    CurrentKey,
    /// Local provider, previous key tried first and then the current key.
    CurrentAndPreviousKey,
    /// Envelope provider, the frame carried this provider's own DEK.
    CurrentDek,
    /// Envelope provider, the DEK came from the unwrapped-key cache.
    CachedDek,
    /// Envelope provider, the DEK was unwrapped by the key service.
    UnwrappedDek,
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyPath::CurrentKey => "current DEK",
            KeyPath::CurrentAndPreviousKey => "current and previous DEK",
            KeyPath::CurrentDek => "current envelope DEK",
            KeyPath::CachedDek => "cached envelope DEK",
            KeyPath::UnwrappedDek => "remotely unwrapped envelope DEK",
        };
        f.write_str(s)
    }
}

/// Coarse classification of a [`CrypterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad key size, missing client settings, empty identifiers.
    Configuration,
    /// Reading the input or writing the output failed.
    Io,
    /// The ciphertext is malformed or failed authentication.
    Decryption,
    /// Sealing failed or the nonce space is exhausted.
    Encryption,
    /// A call to the key service or transit engine failed or timed out.
    RemoteService,
    /// A remote response lacked an expected field or had the wrong type.
    MalformedResponse,
    /// No provider has been registered.
    NotInitialized,
}

/// Top-level error type for every provider operation.
#[derive(Debug, Error)]
pub enum CrypterError {
    /// The provider cannot be constructed from the given settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A key has the wrong length.
    #[error("{name} is invalid: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The input could not be read or the output could not be written.
    #[error("{context}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The ciphertext frame is too short or not valid for the provider.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// AEAD sealing failed or no fresh nonce is available.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authentication failed on every key that was tried.
    #[error("failed to decrypt ciphertext using {0}")]
    DecryptionFailure(KeyPath),

    /// Network, permission, or service failure calling a remote service.
    #[error("{service} request failed: {message}")]
    RemoteService {
        service: &'static str,
        message: String,
    },

    /// A remote call did not complete before its deadline.
    #[error("{service} request timed out")]
    Timeout { service: &'static str },

    /// A remote response is missing a field or the field has the wrong type.
    #[error("malformed {service} response: {message}")]
    MalformedResponse {
        service: &'static str,
        message: String,
    },

    /// Encrypt or decrypt was called before any provider was registered.
    #[error("crypter is not initialized: no provider has been registered")]
    NotInitialized,
}

impl CrypterError {
    /// Returns the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrypterError::Configuration(_) | CrypterError::InvalidKeySize { .. } => {
                ErrorKind::Configuration
            }
            CrypterError::Io { .. } => ErrorKind::Io,
            CrypterError::MalformedCiphertext(_) | CrypterError::DecryptionFailure(_) => {
                ErrorKind::Decryption
            }
            CrypterError::Encryption(_) => ErrorKind::Encryption,
            CrypterError::RemoteService { .. } | CrypterError::Timeout { .. } => {
                ErrorKind::RemoteService
            }
            CrypterError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            CrypterError::NotInitialized => ErrorKind::NotInitialized,
        }
    }

    /// Returns `true` if retrying the same call may succeed.
    ///
    /// Providers never retry on their own; this is for the caller's
    /// resilience layer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CrypterError::RemoteService { .. } | CrypterError::Timeout { .. }
        )
    }

    /// Returns the key path attempted when this is a decryption failure.
    pub fn key_path(&self) -> Option<KeyPath> {
        match self {
            CrypterError::DecryptionFailure(path) => Some(*path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            CrypterError::Configuration("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            CrypterError::InvalidKeySize {
                name: "DEK",
                expected: 32,
                actual: 16
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            CrypterError::DecryptionFailure(KeyPath::CurrentKey).kind(),
            ErrorKind::Decryption
        );
        assert_eq!(
            CrypterError::Timeout { service: "kms" }.kind(),
            ErrorKind::RemoteService
        );
        assert_eq!(CrypterError::NotInitialized.kind(), ErrorKind::NotInitialized);
    }

    #[test]
    fn only_remote_failures_are_transient() {
        assert!(CrypterError::Timeout { service: "vault" }.is_transient());
        assert!(CrypterError::RemoteService {
            service: "kms",
            message: "throttled".into()
        }
        .is_transient());
        assert!(!CrypterError::DecryptionFailure(KeyPath::CachedDek).is_transient());
        assert!(!CrypterError::Configuration("x".into()).is_transient());
    }

    #[test]
    fn display_distinguishes_key_paths() {
        let current = CrypterError::DecryptionFailure(KeyPath::CurrentKey).to_string();
        let both = CrypterError::DecryptionFailure(KeyPath::CurrentAndPreviousKey).to_string();
        assert_eq!(current, "failed to decrypt ciphertext using current DEK");
        assert_eq!(
            both,
            "failed to decrypt ciphertext using current and previous DEK"
        );
    }

    #[test]
    fn display_includes_key_size() {
        let e = CrypterError::InvalidKeySize {
            name: "previous DEK",
            expected: 32,
            actual: 24,
        };
        assert_eq!(e.to_string(), "previous DEK is invalid: expected 32 bytes, got 24");
    }
}
