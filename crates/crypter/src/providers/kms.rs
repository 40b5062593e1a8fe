//! AWS KMS envelope-encryption provider.
//!
//! # Lifecycle
//!
//! 1. At construction, one `GenerateDataKey` call yields a plaintext DEK and
//!    its wrapped form. The plaintext DEK lives only in process memory and is
//!    fixed for the life of the provider.
//! 2. Every encryption seals locally with that DEK under a counter-derived
//!    nonce and prepends the wrapped DEK to the output.
//! 3. Decryption resolves the DEK named by the frame in a fixed order:
//!    current DEK, then [`DekCache`], then a KMS `Decrypt` call whose result
//!    is cached once it has opened a frame. Concurrent misses for one
//!    wrapped DEK share a single `Decrypt` call.
//!
//! # Nonce uniqueness
//!
//! Nonces are `[0, 0, 0, 0] ‖ counter.to_le_bytes()` with a strictly
//! increasing per-provider counter. The counter is not persisted, so each
//! provider mints its own DEK at construction and never reuses a DEK that an
//! earlier process sealed with.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use aes_gcm::Aes256Gcm;
use async_trait::async_trait;
use bytes::Bytes;
use common::{CrypterError, EnvelopeFrame, KeyPath, MAX_WRAPPED_DEK_LEN, NONCE_LEN};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::aws::KeyService;
use crate::crypto;
use crate::dek::{self, cache, DekBytes, DekCache};
use crate::provider::Crypter;
use crate::providers::{with_deadline, DEFAULT_REMOTE_TIMEOUT};

const SERVICE: &str = "kms";

/// Fixed leading bytes of every counter nonce.
const NONCE_PREFIX: [u8; 4] = [0; 4];

/// Tunables for [`KmsCrypter`].
#[derive(Debug, Clone)]
pub struct KmsOptions {
    /// Lifetime of an unwrapped previous DEK in the cache.
    pub cache_ttl: Duration,
    /// Cost budget of the cache (roughly bytes).
    pub cache_max_cost: u64,
    /// Deadline for each KMS call. `None` waits indefinitely.
    pub remote_timeout: Option<Duration>,
}

impl Default for KmsOptions {
    fn default() -> Self {
        Self {
            cache_ttl: cache::DEFAULT_TTL,
            cache_max_cost: cache::DEFAULT_MAX_COST,
            remote_timeout: Some(DEFAULT_REMOTE_TIMEOUT),
        }
    }
}

/// [`Crypter`] using envelope encryption under a KMS master key.
///
/// Output format:
/// `wrapped_dek_len[1] ‖ wrapped_dek ‖ nonce[12] ‖ ciphertext_and_tag`.
pub struct KmsCrypter {
    client: Arc<dyn KeyService>,
    key_id: String,
    wrapped_dek: Bytes,
    cipher: Aes256Gcm,
    encryptions: AtomicU64,
    cache: DekCache,
    remote_timeout: Option<Duration>,
}

impl KmsCrypter {
    /// Generate a DEK under the master key `key_id` and build a crypter
    /// around it.
    ///
    /// # Errors
    ///
    /// - [`CrypterError::Configuration`] if `key_id` is empty, or the wrapped
    ///   DEK is empty or longer than [`MAX_WRAPPED_DEK_LEN`] bytes.
    /// - [`CrypterError::InvalidKeySize`] if KMS returned a DEK that is not
    ///   32 bytes.
    /// - Any error from the `GenerateDataKey` call.
    pub async fn new(
        client: Arc<dyn KeyService>,
        key_id: impl Into<String>,
        options: KmsOptions,
    ) -> Result<Self, CrypterError> {
        let key_id = key_id.into();
        if key_id.trim().is_empty() {
            return Err(CrypterError::Configuration(
                "KMS key ID must not be empty".into(),
            ));
        }

        let mut data_key = with_deadline(
            SERVICE,
            options.remote_timeout,
            client.generate_data_key(&key_id),
        )
        .await?;
        let dek = DekBytes::from_slice(&data_key.plaintext, "KMS data key");
        data_key.plaintext.zeroize();
        let dek = dek?;

        let wrapped_len = data_key.wrapped.len();
        if wrapped_len == 0 || wrapped_len > MAX_WRAPPED_DEK_LEN {
            return Err(CrypterError::Configuration(format!(
                "wrapped DEK is {wrapped_len} bytes, must be between 1 and {MAX_WRAPPED_DEK_LEN}"
            )));
        }

        let cipher = crypto::build_cipher(dek.as_bytes(), "KMS data key")?;
        let wrapped_dek = Bytes::from(data_key.wrapped);

        info!(
            key_id = %key_id,
            dek = %dek::fingerprint(&wrapped_dek),
            wrapped_len,
            "generated data encryption key"
        );

        Ok(Self {
            client,
            key_id,
            wrapped_dek,
            cipher,
            encryptions: AtomicU64::new(0),
            cache: DekCache::new(options.cache_ttl, options.cache_max_cost),
            remote_timeout: options.remote_timeout,
        })
    }

    /// The KMS key ID, alias, or ARN this crypter wraps DEKs under.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The wrapped form of the DEK used for new encryptions.
    pub fn wrapped_dek(&self) -> &[u8] {
        &self.wrapped_dek
    }

    /// Number of encryptions performed with the current DEK.
    pub fn encryption_count(&self) -> u64 {
        self.encryptions.load(Ordering::Relaxed)
    }

    /// Unwrapped previous DEKs currently held.
    pub fn cache(&self) -> &DekCache {
        &self.cache
    }

    fn next_nonce(&self) -> Result<[u8; NONCE_LEN], CrypterError> {
        let previous = self
            .encryptions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .map_err(|_| {
                CrypterError::Encryption("nonce counter exhausted for the current DEK".into())
            })?;
        Ok(counter_nonce(previous + 1))
    }

    async fn unwrap_remote(&self, wrapped_dek: &[u8]) -> Result<DekBytes, CrypterError> {
        let fingerprint = dek::fingerprint(wrapped_dek);
        debug!(dek = %fingerprint, "DEK cache miss; unwrapping via KMS");

        let mut plaintext = with_deadline(
            SERVICE,
            self.remote_timeout,
            self.client.decrypt(&self.key_id, wrapped_dek),
        )
        .await
        .inspect_err(|e| warn!(dek = %fingerprint, error = %e, "failed to unwrap DEK"))?;

        let dek = DekBytes::from_slice(&plaintext, "unwrapped DEK").map_err(|_| {
            CrypterError::MalformedResponse {
                service: SERVICE,
                message: format!("unwrapped DEK is {} bytes", plaintext.len()),
            }
        });
        plaintext.zeroize();
        dek
    }
}

impl std::fmt::Debug for KmsCrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsCrypter")
            .field("key_id", &self.key_id)
            .field("dek", &dek::fingerprint(&self.wrapped_dek))
            .field("encryptions", &self.encryption_count())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Crypter for KmsCrypter {
    async fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CrypterError> {
        let nonce = self.next_nonce()?;
        let ciphertext = crypto::seal(&self.cipher, &nonce, plaintext)?;
        EnvelopeFrame::encode(&self.wrapped_dek, &nonce, &ciphertext)
    }

    async fn decrypt_bytes(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CrypterError> {
        let frame = EnvelopeFrame::parse(ciphertext)?;

        if frame.wrapped_dek == &self.wrapped_dek[..] {
            return crypto::open(&self.cipher, frame.nonce, frame.ciphertext, KeyPath::CurrentDek);
        }

        let (previous, fresh) = self
            .cache
            .get_or_try_insert_with(frame.wrapped_dek, self.unwrap_remote(frame.wrapped_dek))
            .await
            .map_err(shared_error)?;

        let path = if fresh {
            KeyPath::UnwrappedDek
        } else {
            debug!(dek = %dek::fingerprint(frame.wrapped_dek), "DEK cache hit");
            KeyPath::CachedDek
        };
        let cipher = crypto::build_cipher(previous.as_bytes(), "previous DEK")?;
        let opened = crypto::open(&cipher, frame.nonce, frame.ciphertext, path);

        // Only a key that has opened a frame stays cached.
        if opened.is_err() && fresh {
            self.cache.invalidate(frame.wrapped_dek).await;
        }
        opened
    }
}

/// Recover an unwrap error shared between coalesced decrypts.
fn shared_error(err: Arc<CrypterError>) -> CrypterError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| match &*shared {
        CrypterError::Timeout { service } => CrypterError::Timeout { service: *service },
        CrypterError::MalformedResponse { service, message } => CrypterError::MalformedResponse {
            service: *service,
            message: message.clone(),
        },
        CrypterError::RemoteService { service, message } => CrypterError::RemoteService {
            service: *service,
            message: message.clone(),
        },
        other => CrypterError::RemoteService {
            service: SERVICE,
            message: other.to_string(),
        },
    })
}

/// Nonce for the `counter`-th encryption under one DEK.
fn counter_nonce(counter: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..NONCE_PREFIX.len()].copy_from_slice(&NONCE_PREFIX);
    nonce[NONCE_PREFIX.len()..].copy_from_slice(&counter.to_le_bytes());
    nonce
}
