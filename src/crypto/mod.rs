//! Cryptographic functions for Stockpile
//!
//! Provides AES-256-GCM encryption with Argon2id key derivation for
//! optional backup artifact encryption. Encrypted artifacts are
//! self-describing envelopes carrying their KDF parameters and nonce.

pub mod encryption;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{
    decrypt_with_passphrase, encrypt_with_passphrase, looks_encrypted, EncryptedEnvelope,
};
pub use key_derivation::{derive_key, DerivedKey, KeyDerivationParams};
pub use secure_memory::SecureString;
