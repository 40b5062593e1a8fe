//! The three encryption backends.

pub mod aes;
pub mod kms;
pub mod transit;

pub use aes::AesGcmCrypter;
pub use kms::{KmsCrypter, KmsOptions};
pub use transit::TransitCrypter;

use std::{future::Future, time::Duration};

use common::CrypterError;
use tracing::warn;

/// Deadline applied to each KMS or Vault call unless configured otherwise.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Await a remote call, failing with [`CrypterError::Timeout`] once
/// `deadline` elapses. `None` waits indefinitely.
pub(crate) async fn with_deadline<T, F>(
    service: &'static str,
    deadline: Option<Duration>,
    call: F,
) -> Result<T, CrypterError>
where
    F: Future<Output = Result<T, CrypterError>>,
{
    match deadline {
        None => call.await,
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            warn!(service, timeout_ms = saturating_millis(limit), "remote call exceeded deadline");
            CrypterError::Timeout { service }
        })?,
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
