//! ChaCha20-Poly1305 implementation of `FieldCipher`.
//!
//! Each `seal` draws a fresh 96-bit nonce from the OS RNG. The key id is
//! bound in as additional authenticated data, so a blob cannot be opened
//! under a different key label even if the key bytes match.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;

use lifeline_contracts::{
    audit::{AuditRecord, SealedBlob},
    error::{LifelineError, LifelineResult},
};
use lifeline_core::traits::FieldCipher;

/// Nonce size for ChaCha20-Poly1305 (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (256 bits).
pub const KEY_SIZE: usize = 32;

pub struct ChaChaFieldCipher {
    key_id: String,
    cipher: ChaCha20Poly1305,
}

impl ChaChaFieldCipher {
    pub fn new(key_id: impl Into<String>, key: &[u8; KEY_SIZE]) -> Self {
        Self {
            key_id: key_id.into(),
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// A cipher with a random key. Sealed data is unreadable once it is
    /// dropped, which suits tests and demos.
    pub fn generate(key_id: impl Into<String>) -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self::new(key_id, &key)
    }

    /// Parse a 64-character hex key, as stored in a secrets file.
    pub fn from_hex(key_id: impl Into<String>, hex_key: &str) -> LifelineResult<Self> {
        let bytes = hex::decode(hex_key.trim()).map_err(|e| LifelineError::Crypto {
            reason: format!("audit key is not valid hex: {}", e),
        })?;
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| LifelineError::Crypto {
            reason: format!("audit key must be {} bytes", KEY_SIZE),
        })?;
        Ok(Self::new(key_id, &key))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

impl fmt::Debug for ChaChaFieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChaChaFieldCipher")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl FieldCipher for ChaChaFieldCipher {
    fn seal(&self, plaintext: &[u8]) -> LifelineResult<SealedBlob> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: self.key_id.as_bytes(),
                },
            )
            .map_err(|_| LifelineError::Crypto {
                reason: "encryption failed".to_string(),
            })?;

        Ok(SealedBlob {
            key_id: self.key_id.clone(),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    fn open(&self, blob: &SealedBlob) -> LifelineResult<Vec<u8>> {
        if blob.key_id != self.key_id {
            return Err(LifelineError::Crypto {
                reason: format!(
                    "blob sealed with key '{}' but cipher holds '{}'",
                    blob.key_id, self.key_id
                ),
            });
        }
        let nonce = hex::decode(&blob.nonce).map_err(|e| LifelineError::Crypto {
            reason: format!("nonce is not valid hex: {}", e),
        })?;
        if nonce.len() != NONCE_SIZE {
            return Err(LifelineError::Crypto {
                reason: format!("nonce must be {} bytes", NONCE_SIZE),
            });
        }
        let ciphertext = hex::decode(&blob.ciphertext).map_err(|e| LifelineError::Crypto {
            reason: format!("ciphertext is not valid hex: {}", e),
        })?;

        self.cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: self.key_id.as_bytes(),
                },
            )
            .map_err(|_| LifelineError::Crypto {
                reason: "authentication failed; blob was modified or sealed with another key"
                    .to_string(),
            })
    }
}

/// Recover an entry's details, opening the sealed form when present.
pub fn open_details(
    cipher: &dyn FieldCipher,
    record: &AuditRecord,
) -> LifelineResult<Option<serde_json::Value>> {
    match &record.details_encrypted {
        Some(blob) => {
            let bytes = cipher.open(blob)?;
            let value = serde_json::from_slice(&bytes).map_err(|e| LifelineError::Crypto {
                reason: format!("opened details are not JSON: {}", e),
            })?;
            Ok(Some(value))
        }
        None => Ok(record.details.clone()),
    }
}
