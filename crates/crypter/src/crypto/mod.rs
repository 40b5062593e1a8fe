//! AES-256-GCM primitives.
//!
//! This module is intentionally free of AWS and HTTP dependencies.
//! It provides the low-level seal/open operations used by the local and
//! envelope providers. Framing of the output lives in [`common::envelope`].

pub mod cipher;

pub use cipher::{build_cipher, open, seal, KEY_LEN, TAG_LEN};
