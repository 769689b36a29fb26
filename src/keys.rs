//! Key material and key versions.
//!
//! A [`CryptVersion`] is one generation of symmetric key material together
//! with everything needed to use it: the cipher profile, the salt length and
//! the length calculator. Versions are immutable once built. Rotating a key
//! means registering a new version, never editing an old one.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, CipherKey, CipherProfile};
use crate::error::{ConfigError, CryptOperationError};

/// Raw key bytes, already decoded.
///
/// - Not `Clone`. Cannot be duplicated without explicit conversion.
/// - Zeroised on drop.
/// - `Debug` never prints the bytes.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
}

impl KeyMaterial {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Decode a standard base64 key, as found in configuration files.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded.trim()).map(Self::from_bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial({} bytes)", self.bytes.len())
    }
}

/// Ciphertext length for a given plaintext length.
pub type LengthFn = fn(usize) -> usize;

/// One generation of key material and its cipher parameters.
pub struct CryptVersion {
    salt_length: usize,
    profile: CipherProfile,
    key: CipherKey,
    encrypted_length: LengthFn,
}

impl CryptVersion {
    /// Build a version, checking the salt and key sizes against the profile.
    pub fn new(
        salt_length: usize,
        profile: CipherProfile,
        material: KeyMaterial,
    ) -> Result<Self, ConfigError> {
        if salt_length != profile.nonce_len() {
            return Err(ConfigError::InvalidSaltLength {
                cipher: profile.id(),
                expected: profile.nonce_len(),
                actual: salt_length,
            });
        }
        let key = profile.key(material.as_bytes())?;
        Ok(Self {
            salt_length,
            profile,
            key,
            encrypted_length: match profile {
                CipherProfile::Aes256Cbc => aes_cbc_length,
                CipherProfile::Aes256Gcm => aes_gcm_length,
                CipherProfile::ChaCha20Poly1305 => chacha_length,
            },
        })
    }

    /// The standard profile: AES-256-CBC with PKCS#7 padding and a 128-bit
    /// salt.
    pub fn aes256_cbc(secret: &[u8]) -> Result<Self, ConfigError> {
        Self::new(
            crypto::BLOCK_LEN,
            CipherProfile::Aes256Cbc,
            KeyMaterial::from_bytes(secret),
        )
    }

    /// AES-256-GCM with a 96-bit salt.
    pub fn aes256_gcm(secret: &[u8]) -> Result<Self, ConfigError> {
        Self::new(
            crypto::NONCE_LEN,
            CipherProfile::Aes256Gcm,
            KeyMaterial::from_bytes(secret),
        )
    }

    pub fn salt_length(&self) -> usize {
        self.salt_length
    }

    pub fn cipher_id(&self) -> &'static str {
        self.profile.id()
    }

    pub fn profile(&self) -> CipherProfile {
        self.profile
    }

    /// Ciphertext length (without version byte and salt) for `plaintext_len`.
    pub fn encrypted_length(&self, plaintext_len: usize) -> usize {
        (self.encrypted_length)(plaintext_len)
    }

    pub(crate) fn seal(&self, salt: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptOperationError> {
        crypto::seal(&self.key, salt, plaintext)
    }

    pub(crate) fn open(&self, salt: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptOperationError> {
        crypto::open(&self.key, salt, ciphertext)
    }
}

impl fmt::Debug for CryptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptVersion")
            .field("salt_length", &self.salt_length)
            .field("cipher_id", &self.profile.id())
            .finish_non_exhaustive()
    }
}

fn aes_cbc_length(plaintext_len: usize) -> usize {
    CipherProfile::Aes256Cbc.encrypted_length(plaintext_len)
}

fn aes_gcm_length(plaintext_len: usize) -> usize {
    CipherProfile::Aes256Gcm.encrypted_length(plaintext_len)
}

fn chacha_length(plaintext_len: usize) -> usize {
    CipherProfile::ChaCha20Poly1305.encrypted_length(plaintext_len)
}
