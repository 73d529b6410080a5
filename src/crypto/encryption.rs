//! AES-256-GCM artifact encryption
//!
//! Wraps a backup payload in a self-describing encrypted envelope: the key
//! derivation parameters (fresh salt per artifact) and the nonce travel with
//! the ciphertext, so possession of the artifact plus the passphrase is
//! sufficient to decrypt. A wrong passphrase fails the GCM authentication
//! tag and surfaces as an error; it can never yield garbage plaintext.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};

use crate::error::{StockpileError, StockpileResult};

use super::key_derivation::{derive_key, KeyDerivationParams};

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Marker identifying an encrypted artifact envelope
const ENVELOPE_MAGIC: &str = "stockpile-encrypted";

/// Self-describing encrypted artifact envelope
///
/// Serialized as JSON; this is what actually lands on disk for an
/// encrypted backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Envelope marker, always `stockpile-encrypted`
    pub magic: String,
    /// Version for future algorithm upgrades
    pub version: u8,
    /// Key derivation parameters, including the per-artifact salt
    pub kdf: KeyDerivationParams,
    /// The nonce used for this encryption (base64 encoded)
    pub nonce: String,
    /// The encrypted payload with authentication tag (base64 encoded)
    pub ciphertext: String,
}

/// Encrypt a backup payload with a passphrase
///
/// Generates a fresh salt and nonce for each call and returns the serialized
/// envelope bytes to be stored as the artifact.
pub fn encrypt_with_passphrase(plaintext: &[u8], passphrase: &str) -> StockpileResult<Vec<u8>> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    if passphrase.is_empty() {
        return Err(StockpileError::Encryption(
            "Passphrase must not be empty".to_string(),
        ));
    }

    let kdf = KeyDerivationParams::new();
    let key = derive_key(passphrase, &kdf)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StockpileError::Encryption(format!("Failed to create cipher: {}", e)))?;

    // Generate random nonce
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| StockpileError::Encryption(format!("Encryption failed: {}", e)))?;

    let envelope = EncryptedEnvelope {
        magic: ENVELOPE_MAGIC.to_string(),
        version: 1,
        kdf,
        nonce: STANDARD.encode(nonce_bytes),
        ciphertext: STANDARD.encode(&ciphertext),
    };

    serde_json::to_vec(&envelope)
        .map_err(|e| StockpileError::Encryption(format!("Failed to serialize envelope: {}", e)))
}

/// Decrypt an encrypted artifact with a passphrase
pub fn decrypt_with_passphrase(bytes: &[u8], passphrase: &str) -> StockpileResult<Vec<u8>> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let envelope: EncryptedEnvelope = serde_json::from_slice(bytes).map_err(|e| {
        StockpileError::Encryption(format!("Not an encrypted artifact envelope: {}", e))
    })?;

    if envelope.magic != ENVELOPE_MAGIC {
        return Err(StockpileError::Encryption(
            "Not an encrypted artifact envelope: bad magic".to_string(),
        ));
    }

    if envelope.version != 1 {
        return Err(StockpileError::Encryption(format!(
            "Unsupported envelope version: {}",
            envelope.version
        )));
    }

    let key = derive_key(passphrase, &envelope.kdf)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StockpileError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let nonce_bytes = STANDARD
        .decode(&envelope.nonce)
        .map_err(|e| StockpileError::Encryption(format!("Invalid nonce encoding: {}", e)))?;

    if nonce_bytes.len() != NONCE_SIZE {
        return Err(StockpileError::Encryption(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        )));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = STANDARD
        .decode(&envelope.ciphertext)
        .map_err(|e| StockpileError::Encryption(format!("Invalid ciphertext encoding: {}", e)))?;

    // Decrypt; GCM authentication rejects a wrong key or tampered payload
    cipher.decrypt(nonce, ciphertext.as_ref()).map_err(|_| {
        StockpileError::Encryption("Decryption failed: wrong passphrase or corrupted data".to_string())
    })
}

/// Check whether stored bytes look like an encrypted envelope
pub fn looks_encrypted(bytes: &[u8]) -> bool {
    serde_json::from_slice::<EncryptedEnvelope>(bytes)
        .map(|e| e.magic == ENVELOPE_MAGIC)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let plaintext = b"inventory snapshot payload";

        let stored = encrypt_with_passphrase(plaintext, "passphrase").unwrap();
        let decrypted = decrypt_with_passphrase(&stored, "passphrase").unwrap();

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let stored = encrypt_with_passphrase(b"payload", "p1").unwrap();

        let result = decrypt_with_passphrase(&stored, "p2");
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            StockpileError::Encryption(_)
        ));
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let result = encrypt_with_passphrase(b"payload", "");
        assert!(result.is_err());
    }

    #[test]
    fn test_different_salt_and_nonce_per_call() {
        let stored1 = encrypt_with_passphrase(b"payload", "p").unwrap();
        let stored2 = encrypt_with_passphrase(b"payload", "p").unwrap();

        let env1: EncryptedEnvelope = serde_json::from_slice(&stored1).unwrap();
        let env2: EncryptedEnvelope = serde_json::from_slice(&stored2).unwrap();

        assert_ne!(env1.kdf.salt, env2.kdf.salt);
        assert_ne!(env1.nonce, env2.nonce);
        assert_ne!(env1.ciphertext, env2.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let stored = encrypt_with_passphrase(b"payload", "p").unwrap();
        let mut envelope: EncryptedEnvelope = serde_json::from_slice(&stored).unwrap();

        // Tamper with ciphertext
        let mut ciphertext = STANDARD.decode(&envelope.ciphertext).unwrap();
        ciphertext[0] ^= 0xFF;
        envelope.ciphertext = STANDARD.encode(&ciphertext);

        let tampered = serde_json::to_vec(&envelope).unwrap();
        assert!(decrypt_with_passphrase(&tampered, "p").is_err());
    }

    #[test]
    fn test_looks_encrypted() {
        let stored = encrypt_with_passphrase(b"payload", "p").unwrap();
        assert!(looks_encrypted(&stored));

        assert!(!looks_encrypted(b"plain csv data"));
        assert!(!looks_encrypted(br#"{"metadata": {}}"#));
    }

    #[test]
    fn test_empty_plaintext_round_trip() {
        let stored = encrypt_with_passphrase(b"", "p").unwrap();
        let decrypted = decrypt_with_passphrase(&stored, "p").unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_large_plaintext_round_trip() {
        let plaintext: Vec<u8> = (0..100_000).map(|i| (i % 256) as u8).collect();

        let stored = encrypt_with_passphrase(&plaintext, "p").unwrap();
        let decrypted = decrypt_with_passphrase(&stored, "p").unwrap();

        assert_eq!(plaintext, decrypted);
    }
}
