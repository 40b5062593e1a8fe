//! Configuration loading and validation for provider bootstrap.
//!
//! All values are read from `CRYPTER_*` environment variables. Loading fails
//! with a descriptive error if the selected provider is missing a setting or a
//! key is not valid base64 for a 32-byte value.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::crypto::KEY_LEN;
use crate::providers::{KmsOptions, DEFAULT_REMOTE_TIMEOUT};
use crate::telemetry;

const ENV_PREFIX: &str = "CRYPTER";

/// Which backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    AesGcm,
    AwsKms,
    VaultTransit,
}

/// Validated provider configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Backend selector. **Required.**
    pub provider: ProviderKind,

    /// Base64 32-byte key used for new encryptions (aes-gcm).
    pub aes_key: Option<String>,

    /// Base64 32-byte key still accepted for decryption (aes-gcm).
    pub aes_previous_key: Option<String>,

    /// KMS key ID, alias, or ARN (aws-kms).
    pub kms_key_id: Option<String>,

    /// Override for the KMS endpoint, e.g. a local KMS emulator.
    pub kms_endpoint_url: Option<String>,

    /// How long (seconds) an unwrapped previous DEK stays cached.
    #[serde(default = "default_dek_cache_ttl")]
    pub dek_cache_ttl_secs: u64,

    /// Cost budget of the unwrapped-DEK cache.
    #[serde(default = "default_dek_cache_max_cost")]
    pub dek_cache_max_cost: u64,

    /// Vault base URL (vault-transit).
    pub vault_addr: Option<String>,

    /// Vault token (vault-transit).
    pub vault_token: Option<String>,

    /// Vault Enterprise namespace.
    pub vault_namespace: Option<String>,

    /// Transit engine mount path.
    #[serde(default = "default_vault_transit_mount")]
    pub vault_transit_mount: String,

    /// Transit key name (vault-transit).
    pub vault_transit_key: Option<String>,

    /// Deadline (seconds) for each KMS or Vault call.
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_dek_cache_ttl() -> u64 {
    3600
}
fn default_dek_cache_max_cost() -> u64 {
    10_000_000
}
fn default_vault_transit_mount() -> String {
    "transit".into()
}
fn default_remote_timeout() -> u64 {
    DEFAULT_REMOTE_TIMEOUT.as_secs()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load(env: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(env)
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.dek_cache_ttl_secs == 0 {
            anyhow::bail!("CRYPTER_DEK_CACHE_TTL_SECS must be > 0");
        }
        if self.dek_cache_max_cost == 0 {
            anyhow::bail!("CRYPTER_DEK_CACHE_MAX_COST must be > 0");
        }
        if self.remote_timeout_secs == 0 {
            anyhow::bail!("CRYPTER_REMOTE_TIMEOUT_SECS must be > 0");
        }
        telemetry::level_filter(&self.log_level)?;

        match self.provider {
            ProviderKind::AesGcm => {
                ensure_present(&self.aes_key, "CRYPTER_AES_KEY")?;
                self.aes_key()?;
                self.aes_previous_key()?;
            }
            ProviderKind::AwsKms => {
                ensure_present(&self.kms_key_id, "CRYPTER_KMS_KEY_ID")?;
            }
            ProviderKind::VaultTransit => {
                ensure_present(&self.vault_addr, "CRYPTER_VAULT_ADDR")?;
                ensure_present(&self.vault_token, "CRYPTER_VAULT_TOKEN")?;
                ensure_present(&self.vault_transit_key, "CRYPTER_VAULT_TRANSIT_KEY")?;
                ensure_non_empty(
                    self.vault_transit_mount.trim_matches('/'),
                    "CRYPTER_VAULT_TRANSIT_MOUNT",
                )?;
            }
        }
        Ok(())
    }

    /// Decoded current AES key.
    pub fn aes_key(&self) -> Result<Vec<u8>> {
        let encoded = self
            .aes_key
            .as_deref()
            .context("CRYPTER_AES_KEY is required for the aes-gcm provider")?;
        decode_key(encoded, "CRYPTER_AES_KEY")
    }

    /// Decoded previous AES key, if one is configured.
    pub fn aes_previous_key(&self) -> Result<Option<Vec<u8>>> {
        match self.aes_previous_key.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(encoded) => decode_key(encoded, "CRYPTER_AES_PREVIOUS_KEY").map(Some),
        }
    }

    pub fn dek_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dek_cache_ttl_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn kms_options(&self) -> KmsOptions {
        KmsOptions {
            cache_ttl: self.dek_cache_ttl(),
            cache_max_cost: self.dek_cache_max_cost,
            remote_timeout: Some(self.remote_timeout()),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("aes_key", &redacted(&self.aes_key))
            .field("aes_previous_key", &redacted(&self.aes_previous_key))
            .field("kms_key_id", &self.kms_key_id)
            .field("kms_endpoint_url", &self.kms_endpoint_url)
            .field("dek_cache_ttl_secs", &self.dek_cache_ttl_secs)
            .field("dek_cache_max_cost", &self.dek_cache_max_cost)
            .field("vault_addr", &self.vault_addr)
            .field("vault_token", &redacted(&self.vault_token))
            .field("vault_namespace", &self.vault_namespace)
            .field("vault_transit_mount", &self.vault_transit_mount)
            .field("vault_transit_key", &self.vault_transit_key)
            .field("remote_timeout_secs", &self.remote_timeout_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "[REDACTED]")
}

fn decode_key(encoded: &str, name: &str) -> Result<Vec<u8>> {
    let key = STANDARD
        .decode(encoded.trim())
        .with_context(|| format!("{name} is not valid base64"))?;
    if key.len() != KEY_LEN {
        anyhow::bail!(
            "{name} must decode to {KEY_LEN} bytes, got {}",
            key.len()
        );
    }
    Ok(key)
}

fn ensure_present(value: &Option<String>, name: &str) -> Result<()> {
    ensure_non_empty(value.as_deref().unwrap_or_default(), name)
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
