//! Request and response bodies exchanged with the Vault transit engine.
//!
//! See <https://developer.hashicorp.com/vault/api-docs/secret/transit>.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Encrypt endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/{mount}/encrypt/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitEncryptRequest {
    /// Base64-encoded plaintext.
    pub plaintext: String,
}

// ---------------------------------------------------------------------------
// Decrypt endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/{mount}/decrypt/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitDecryptRequest {
    /// Versioned ciphertext as returned by the encrypt endpoint,
    /// e.g. `vault:v1:<base64>`.
    pub ciphertext: String,
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

/// Generic Vault response envelope for a logical write.
///
/// The `data` object is kept untyped so that a missing or mistyped field is
/// reported by the caller that knows which field it needed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretResponse {
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// Body Vault returns alongside any non-2xx status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultErrorResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}
