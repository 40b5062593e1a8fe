//! Process-wide provider registration.
//!
//! Code that can take a [`Provider`] by reference should do so. The global
//! [`Registry`] exists for call sites with no way to thread one through, such
//! as column codecs invoked by a database driver.

use std::sync::OnceLock;

use common::CrypterError;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::provider::{Crypter, Provider};

/// Holds at most one [`Provider`]. The first registration wins.
pub struct Registry {
    active: OnceLock<Provider>,
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            active: OnceLock::new(),
        }
    }

    /// Install `provider` if none is registered yet.
    ///
    /// Returns `false`, dropping `provider`, if another provider got there
    /// first. Safe to race from multiple threads; exactly one caller wins.
    pub fn register(&self, provider: Provider) -> bool {
        let name = provider.name();
        match self.active.set(provider) {
            Ok(()) => {
                info!(provider = name, "registered encryption provider");
                true
            }
            Err(_rejected) => {
                warn!(
                    provider = name,
                    active = ?self.active.get().map(Provider::name),
                    "encryption provider already registered; ignoring"
                );
                false
            }
        }
    }

    /// The registered provider.
    ///
    /// # Errors
    ///
    /// Returns [`CrypterError::NotInitialized`] if nothing is registered.
    pub fn active(&self) -> Result<&Provider, CrypterError> {
        self.active.get().ok_or(CrypterError::NotInitialized)
    }

    pub async fn encrypt<W, R>(&self, output: &mut W, input: &mut R) -> Result<(), CrypterError>
    where
        W: AsyncWrite + Unpin + Send,
        R: AsyncRead + Unpin + Send,
    {
        self.active()?.encrypt(output, input).await
    }

    pub async fn decrypt<W, R>(&self, output: &mut W, input: &mut R) -> Result<(), CrypterError>
    where
        W: AsyncWrite + Unpin + Send,
        R: AsyncRead + Unpin + Send,
    {
        self.active()?.decrypt(output, input).await
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("active", &self.active.get().map(Provider::name))
            .finish()
    }
}

static GLOBAL: Registry = Registry::new();

/// The process-wide registry.
pub fn global() -> &'static Registry {
    &GLOBAL
}

/// Register the process-wide provider. See [`Registry::register`].
pub fn register(provider: Provider) -> bool {
    GLOBAL.register(provider)
}

/// Encrypt `input` into `output` with the process-wide provider.
pub async fn encrypt<W, R>(output: &mut W, input: &mut R) -> Result<(), CrypterError>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    GLOBAL.encrypt(output, input).await
}

/// Decrypt `input` into `output` with the process-wide provider.
pub async fn decrypt<W, R>(output: &mut W, input: &mut R) -> Result<(), CrypterError>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    GLOBAL.decrypt(output, input).await
}
