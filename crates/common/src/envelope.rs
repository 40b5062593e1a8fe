//! Byte-exact ciphertext framing shared by the local providers.
//!
//! ```text
//! AES-GCM:  nonce[12] ‖ ciphertext_and_tag[rest]
//! KMS:      wrapped_dek_len[1] ‖ wrapped_dek[wrapped_dek_len] ‖ nonce[12] ‖ ciphertext_and_tag[rest]
//! ```
//!
//! Parsing borrows from the input buffer; nothing is copied until a frame is
//! encoded.

use crate::error::CrypterError;

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Largest wrapped DEK that fits the single-byte length prefix.
pub const MAX_WRAPPED_DEK_LEN: usize = u8::MAX as usize;

/// A `nonce ‖ ciphertext` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceFrame<'a> {
    pub nonce: &'a [u8; NONCE_LEN],
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: &'a [u8],
}

impl<'a> NonceFrame<'a> {
    /// Split `data` into its leading nonce and the remaining ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`CrypterError::MalformedCiphertext`] if `data` is shorter than
    /// [`NONCE_LEN`].
    pub fn parse(data: &'a [u8]) -> Result<Self, CrypterError> {
        let (nonce, ciphertext) = data.split_first_chunk::<NONCE_LEN>().ok_or_else(|| {
            CrypterError::MalformedCiphertext(format!(
                "expected at least {NONCE_LEN} nonce bytes, got {}",
                data.len()
            ))
        })?;
        Ok(Self { nonce, ciphertext })
    }

    /// Concatenate `nonce` and `ciphertext` into a new buffer.
    pub fn encode(nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce);
        out.extend_from_slice(ciphertext);
        out
    }
}

/// A `len ‖ wrapped_dek ‖ nonce ‖ ciphertext` envelope frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeFrame<'a> {
    /// The DEK as wrapped by the key service.
    pub wrapped_dek: &'a [u8],
    pub nonce: &'a [u8; NONCE_LEN],
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: &'a [u8],
}

impl<'a> EnvelopeFrame<'a> {
    /// Parse an envelope frame.
    ///
    /// # Errors
    ///
    /// Returns [`CrypterError::MalformedCiphertext`] if the frame is empty, if
    /// the length prefix runs past the end of the buffer, or if fewer than
    /// [`NONCE_LEN`] bytes follow the wrapped DEK.
    pub fn parse(data: &'a [u8]) -> Result<Self, CrypterError> {
        let (&len, rest) = data
            .split_first()
            .ok_or_else(|| CrypterError::MalformedCiphertext("empty envelope".into()))?;
        let len = usize::from(len);
        if rest.len() < len {
            return Err(CrypterError::MalformedCiphertext(format!(
                "wrapped DEK length {len} exceeds the remaining {} bytes",
                rest.len()
            )));
        }
        let (wrapped_dek, rest) = rest.split_at(len);
        let NonceFrame { nonce, ciphertext } = NonceFrame::parse(rest)?;
        Ok(Self {
            wrapped_dek,
            nonce,
            ciphertext,
        })
    }

    /// Encode an envelope frame into a new buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CrypterError::Configuration`] if `wrapped_dek` is longer than
    /// [`MAX_WRAPPED_DEK_LEN`].
    pub fn encode(
        wrapped_dek: &[u8],
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CrypterError> {
        let len = u8::try_from(wrapped_dek.len()).map_err(|_| {
            CrypterError::Configuration(format!(
                "wrapped DEK is {} bytes, the envelope allows at most {MAX_WRAPPED_DEK_LEN}",
                wrapped_dek.len()
            ))
        })?;
        let mut out = Vec::with_capacity(1 + wrapped_dek.len() + NONCE_LEN + ciphertext.len());
        out.push(len);
        out.extend_from_slice(wrapped_dek);
        out.extend_from_slice(nonce);
        out.extend_from_slice(ciphertext);
        Ok(out)
    }
}
