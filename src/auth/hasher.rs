/// Keyed Credential Hashing
///
/// HMAC-SHA256 keyed with the server-wide secret, hex encoded. Used for
/// password storage and for the refresh value persisted in a session record.
/// There is no per-record salt: equal inputs hash equally under one secret,
/// which the refresh lookup depends on.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, ConfigError};

type HmacSha256 = Hmac<Sha256>;

/// Length of every hash produced by [`CredentialHasher::hash`]
pub const HASH_HEX_LENGTH: usize = 64;

#[derive(Clone)]
pub struct CredentialHasher {
    keyed: HmacSha256,
}

impl CredentialHasher {
    pub fn new(secret: &str) -> Result<Self, AppError> {
        let keyed = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
            AppError::Config(ConfigError::InvalidValue(format!("hash key rejected: {}", e)))
        })?;
        Ok(Self { keyed })
    }

    /// Hash `text` under the server secret, returning 64 lowercase hex chars
    pub fn hash(&self, text: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(text.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Hash `text` and compare it with a stored hash in constant time
    pub fn verify(&self, text: &str, stored_hash: &str) -> bool {
        constant_time_eq(self.hash(text).as_bytes(), stored_hash.as_bytes())
    }
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher").finish_non_exhaustive()
    }
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
