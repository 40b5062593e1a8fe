//! Pluggable encryption for sensitive values before they are persisted.
//!
//! Three interchangeable backends implement [`Crypter`]:
//!
//! - [`AesGcmCrypter`]: AES-256-GCM with an in-memory key, plus an optional
//!   previous key for rotation.
//! - [`KmsCrypter`]: envelope encryption. One data key is generated by AWS KMS
//!   per provider; its wrapped form travels with every ciphertext and older
//!   data keys are unwrapped on demand and cached.
//! - [`TransitCrypter`]: passthrough to the HashiCorp Vault transit engine.
//!
//! A [`Provider`] is either used directly or installed once per process with
//! [`register`] and reached through [`encrypt`] / [`decrypt`].
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! let cfg = crypter::config::Config::from_env()?;
//! crypter::telemetry::init(&cfg.log_level)?;
//! crypter::register(crypter::Provider::from_config(&cfg).await?);
//!
//! let mut sealed = Vec::new();
//! crypter::encrypt(&mut sealed, &mut &b"123-45-6789"[..]).await?;
//! # Ok(())
//! # }
//! ```

pub mod aws;
pub mod config;
pub mod crypto;
pub mod dek;
pub mod provider;
pub mod providers;
pub mod random;
pub mod registry;
pub mod telemetry;
pub mod vault;

pub use common::{CrypterError, ErrorKind, KeyPath};
pub use provider::{Crypter, Provider};
pub use providers::{AesGcmCrypter, KmsCrypter, KmsOptions, TransitCrypter};
pub use registry::{decrypt, encrypt, global, register, Registry};
