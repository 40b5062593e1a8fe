//! The [`Crypter`] contract and the closed set of backends behind it.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use common::CrypterError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::aws::AwsKeyService;
use crate::config::{Config, ProviderKind};
use crate::providers::{AesGcmCrypter, KmsCrypter, TransitCrypter};
use crate::vault::VaultClient;

/// A backend that turns plaintext into opaque ciphertext and back.
///
/// Implementors provide the byte-slice operations; the stream operations
/// buffer the whole input, run the byte operation, and only then write the
/// result, so a failure never leaves a partial value in `output`.
#[async_trait]
pub trait Crypter: Send + Sync {
    async fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CrypterError>;

    async fn decrypt_bytes(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CrypterError>;

    /// Read all of `input`, encrypt it, and write the ciphertext to `output`.
    async fn encrypt<W, R>(&self, output: &mut W, input: &mut R) -> Result<(), CrypterError>
    where
        W: AsyncWrite + Unpin + Send,
        R: AsyncRead + Unpin + Send,
    {
        let plaintext = read_input(input).await?;
        let ciphertext = self.encrypt_bytes(&plaintext).await?;
        write_output(output, &ciphertext).await
    }

    /// Read all of `input`, decrypt it, and write the plaintext to `output`.
    async fn decrypt<W, R>(&self, output: &mut W, input: &mut R) -> Result<(), CrypterError>
    where
        W: AsyncWrite + Unpin + Send,
        R: AsyncRead + Unpin + Send,
    {
        let ciphertext = read_input(input).await?;
        let plaintext = self.decrypt_bytes(&ciphertext).await?;
        write_output(output, &plaintext).await
    }
}

async fn read_input<R>(input: &mut R) -> Result<Vec<u8>, CrypterError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = Vec::new();
    input
        .read_to_end(&mut buf)
        .await
        .map_err(|source| CrypterError::Io {
            context: "failed to read input",
            source,
        })?;
    Ok(buf)
}

async fn write_output<W>(output: &mut W, bytes: &[u8]) -> Result<(), CrypterError>
where
    W: AsyncWrite + Unpin + Send,
{
    output
        .write_all(bytes)
        .await
        .map_err(|source| CrypterError::Io {
            context: "failed to write output",
            source,
        })?;
    output.flush().await.map_err(|source| CrypterError::Io {
        context: "failed to flush output",
        source,
    })
}

/// One of the supported backends.
pub enum Provider {
    AesGcm(AesGcmCrypter),
    AwsKms(KmsCrypter),
    VaultTransit(TransitCrypter),
}

impl Provider {
    /// Short backend name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Provider::AesGcm(_) => "aes-gcm",
            Provider::AwsKms(_) => "aws-kms",
            Provider::VaultTransit(_) => "vault-transit",
        }
    }

    /// Build the backend selected by `cfg`.
    ///
    /// For `aws-kms` this loads AWS credentials from the environment and
    /// generates the provider's data key, so it needs network access.
    ///
    /// # Errors
    ///
    /// Returns an error if a setting the backend needs is missing or invalid,
    /// or if the initial KMS call fails.
    pub async fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let provider: Provider = match cfg.provider {
            ProviderKind::AesGcm => {
                let key = cfg.aes_key()?;
                let previous = cfg.aes_previous_key()?;
                AesGcmCrypter::new(&key, previous.as_deref())
                    .context("failed to build AES-GCM provider")?
                    .into()
            }
            ProviderKind::AwsKms => {
                let key_id = cfg
                    .kms_key_id
                    .as_deref()
                    .context("CRYPTER_KMS_KEY_ID is required for the aws-kms provider")?;
                let client = AwsKeyService::from_env(cfg.kms_endpoint_url.as_deref()).await;
                KmsCrypter::new(Arc::new(client), key_id, cfg.kms_options())
                    .await
                    .context("failed to build AWS KMS provider")?
                    .into()
            }
            ProviderKind::VaultTransit => {
                let addr = cfg
                    .vault_addr
                    .as_deref()
                    .context("CRYPTER_VAULT_ADDR is required for the vault-transit provider")?;
                let token = cfg
                    .vault_token
                    .as_deref()
                    .context("CRYPTER_VAULT_TOKEN is required for the vault-transit provider")?;
                let key = cfg
                    .vault_transit_key
                    .as_deref()
                    .context("CRYPTER_VAULT_TRANSIT_KEY is required for the vault-transit provider")?;

                let mut client =
                    VaultClient::new(addr, token).context("failed to build Vault client")?;
                if let Some(ns) = &cfg.vault_namespace {
                    client = client.with_namespace(ns.clone());
                }
                TransitCrypter::new(Arc::new(client), &cfg.vault_transit_mount, key)
                    .context("failed to build Vault transit provider")?
                    .with_remote_timeout(cfg.remote_timeout())
                    .into()
            }
        };

        info!(provider = provider.name(), "encryption provider ready");
        Ok(provider)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::AesGcm(c) => c.fmt(f),
            Provider::AwsKms(c) => c.fmt(f),
            Provider::VaultTransit(c) => c.fmt(f),
        }
    }
}

impl From<AesGcmCrypter> for Provider {
    fn from(c: AesGcmCrypter) -> Self {
        Provider::AesGcm(c)
    }
}

impl From<KmsCrypter> for Provider {
    fn from(c: KmsCrypter) -> Self {
        Provider::AwsKms(c)
    }
}

impl From<TransitCrypter> for Provider {
    fn from(c: TransitCrypter) -> Self {
        Provider::VaultTransit(c)
    }
}

#[async_trait]
impl Crypter for Provider {
    async fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CrypterError> {
        match self {
            Provider::AesGcm(c) => c.encrypt_bytes(plaintext).await,
            Provider::AwsKms(c) => c.encrypt_bytes(plaintext).await,
            Provider::VaultTransit(c) => c.encrypt_bytes(plaintext).await,
        }
    }

    async fn decrypt_bytes(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CrypterError> {
        match self {
            Provider::AesGcm(c) => c.decrypt_bytes(ciphertext).await,
            Provider::AwsKms(c) => c.decrypt_bytes(ciphertext).await,
            Provider::VaultTransit(c) => c.decrypt_bytes(ciphertext).await,
        }
    }
}
