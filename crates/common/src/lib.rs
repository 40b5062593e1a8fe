//! Common types, wire formats, and errors shared across `crypter` crates.

pub mod envelope;
pub mod error;
pub mod protocol;

pub use envelope::{EnvelopeFrame, NonceFrame, MAX_WRAPPED_DEK_LEN, NONCE_LEN};
pub use error::{CrypterError, ErrorKind, KeyPath};
