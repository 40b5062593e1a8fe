//! Vault transit engine provider.
//!
//! Key material never leaves Vault. The crypter posts base64 plaintext to the
//! `encrypt` endpoint and stores the returned `vault:v<N>:...` string as-is;
//! Vault picks the latest key version for new data and resolves the version
//! marker on decrypt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{
    protocol::{TransitDecryptRequest, TransitEncryptRequest},
    CrypterError,
};
use serde_json::{Map, Value};

use crate::provider::Crypter;
use crate::providers::{with_deadline, DEFAULT_REMOTE_TIMEOUT};
use crate::vault::TransitClient;

const SERVICE: &str = "vault";

/// [`Crypter`] delegating every operation to a transit key.
pub struct TransitCrypter {
    client: Arc<dyn TransitClient>,
    mount: String,
    key: String,
    remote_timeout: Option<Duration>,
}

impl TransitCrypter {
    /// Create a crypter for the transit `key` under the engine mounted at
    /// `mount`. Leading and trailing slashes are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CrypterError::Configuration`] if `mount` or `key` is empty.
    pub fn new(
        client: Arc<dyn TransitClient>,
        mount: &str,
        key: &str,
    ) -> Result<Self, CrypterError> {
        let mount = mount.trim_matches('/');
        let key = key.trim_matches('/');
        if mount.is_empty() {
            return Err(CrypterError::Configuration(
                "transit mount path must not be empty".into(),
            ));
        }
        if key.is_empty() {
            return Err(CrypterError::Configuration(
                "transit key name must not be empty".into(),
            ));
        }
        Ok(Self {
            client,
            mount: mount.to_owned(),
            key: key.to_owned(),
            remote_timeout: Some(DEFAULT_REMOTE_TIMEOUT),
        })
    }

    /// Fail calls that take longer than `timeout`.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = Some(timeout);
        self
    }

    pub fn encrypt_endpoint(&self) -> String {
        format!("{}/encrypt/{}", self.mount, self.key)
    }

    pub fn decrypt_endpoint(&self) -> String {
        format!("{}/decrypt/{}", self.mount, self.key)
    }

    async fn write(&self, path: &str, body: Value) -> Result<Map<String, Value>, CrypterError> {
        with_deadline(SERVICE, self.remote_timeout, self.client.write(path, body))
            .await?
            .ok_or_else(|| malformed(format!("{path} returned no data")))
    }
}

impl std::fmt::Debug for TransitCrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitCrypter")
            .field("mount", &self.mount)
            .field("key", &self.key)
            .field("remote_timeout", &self.remote_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Crypter for TransitCrypter {
    async fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CrypterError> {
        let body = serde_json::to_value(TransitEncryptRequest {
            plaintext: STANDARD.encode(plaintext),
        })
        .map_err(|e| CrypterError::Encryption(format!("failed to build transit request: {e}")))?;

        let data = self.write(&self.encrypt_endpoint(), body).await?;
        let ciphertext = string_field(&data, "ciphertext")?;
        Ok(ciphertext.as_bytes().to_vec())
    }

    async fn decrypt_bytes(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CrypterError> {
        let ciphertext = std::str::from_utf8(ciphertext).map_err(|_| {
            CrypterError::MalformedCiphertext("transit ciphertext is not valid UTF-8".into())
        })?;
        let body = serde_json::to_value(TransitDecryptRequest {
            ciphertext: ciphertext.to_owned(),
        })
        .map_err(|e| CrypterError::MalformedCiphertext(format!("failed to build transit request: {e}")))?;

        let data = self.write(&self.decrypt_endpoint(), body).await?;
        let encoded = string_field(&data, "plaintext")?;
        STANDARD
            .decode(encoded)
            .map_err(|e| malformed(format!("plaintext is not valid base64: {e}")))
    }
}

fn string_field<'a>(data: &'a Map<String, Value>, field: &str) -> Result<&'a str, CrypterError> {
    match data.get(field) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(malformed(format!(
            "field {field:?} is not a string: {other}"
        ))),
        None => Err(malformed(format!("field {field:?} is missing"))),
    }
}

fn malformed(message: String) -> CrypterError {
    CrypterError::MalformedResponse {
        service: SERVICE,
        message,
    }
}
