//! Key-service seam for envelope encryption, and its AWS KMS implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::{
    error::{DisplayErrorContext, SdkError},
    primitives::Blob,
    types::DataKeySpec,
};
use common::CrypterError;

const SERVICE: &str = "kms";

/// A freshly generated data key: the plaintext DEK and its wrapped form.
pub struct DataKey {
    /// Raw DEK bytes. Callers copy these into a zeroizing buffer and drop them.
    pub plaintext: Vec<u8>,
    /// The DEK encrypted under the master key; safe to persist.
    pub wrapped: Vec<u8>,
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("plaintext", &"[REDACTED]")
            .field("wrapped_len", &self.wrapped.len())
            .finish()
    }
}

/// Operations the envelope provider needs from a key-management service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Generate a new AES-256 data key under the master key `key_id`.
    async fn generate_data_key(&self, key_id: &str) -> Result<DataKey, CrypterError>;

    /// Unwrap a DEK previously produced by [`KeyService::generate_data_key`].
    async fn decrypt(&self, key_id: &str, wrapped_key: &[u8]) -> Result<Vec<u8>, CrypterError>;
}

/// [`KeyService`] backed by the AWS KMS SDK client.
#[derive(Clone, Debug)]
pub struct AwsKeyService {
    client: aws_sdk_kms::Client,
}

impl AwsKeyService {
    /// Wrap an already-configured KMS client.
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }

    /// Build a KMS client from the standard AWS configuration chain
    /// (environment, profile, instance role).
    ///
    /// `endpoint_url` overrides the service endpoint, e.g. for LocalStack or a
    /// VPC endpoint.
    pub async fn from_env(endpoint_url: Option<&str>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let mut builder = aws_sdk_kms::config::Builder::from(&config);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }

        Self::new(aws_sdk_kms::Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl KeyService for AwsKeyService {
    async fn generate_data_key(&self, key_id: &str) -> Result<DataKey, CrypterError> {
        let resp = self
            .client
            .generate_data_key()
            .key_id(key_id)
            .key_spec(DataKeySpec::Aes256)
            .send()
            .await
            .map_err(|e| sdk_error("failed to generate data key", e))?;

        let plaintext = resp
            .plaintext()
            .ok_or_else(|| malformed("GenerateDataKey response contained no plaintext"))?
            .as_ref()
            .to_vec();
        let wrapped = resp
            .ciphertext_blob()
            .ok_or_else(|| malformed("GenerateDataKey response contained no ciphertext blob"))?
            .as_ref()
            .to_vec();

        Ok(DataKey { plaintext, wrapped })
    }

    async fn decrypt(&self, key_id: &str, wrapped_key: &[u8]) -> Result<Vec<u8>, CrypterError> {
        let resp = self
            .client
            .decrypt()
            .key_id(key_id)
            .ciphertext_blob(Blob::new(wrapped_key.to_vec()))
            .send()
            .await
            .map_err(|e| sdk_error("failed to decrypt previous DEK", e))?;

        resp.plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| malformed("Decrypt response contained no plaintext"))
    }
}

fn sdk_error<E, R>(action: &str, err: SdkError<E, R>) -> CrypterError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match err {
        SdkError::TimeoutError(_) => CrypterError::Timeout { service: SERVICE },
        other => CrypterError::RemoteService {
            service: SERVICE,
            message: format!("{action}: {}", DisplayErrorContext(&other)),
        },
    }
}

fn malformed(message: &str) -> CrypterError {
    CrypterError::MalformedResponse {
        service: SERVICE,
        message: message.to_owned(),
    }
}
